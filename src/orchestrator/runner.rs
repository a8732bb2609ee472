//! The remediation loop.
//!
//! Every stage is awaited in sequence: all of them share one working tree,
//! so builds and file writes must never overlap.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::OrchestratorSettings;
use crate::audit::{AgentOutcome, AgentRecord, IterationRecord, RemediationRun};
use crate::collab::{BuildOptions, BuildRunner, DependencyInstaller, FileStore, VersionControl};
use crate::errors::{PatchError, RemediationError};
use crate::model::{BugAgent, ErrorRecord, FixResult, ProjectContext, resolved_errors};
use crate::oracle::ReasoningOracle;
use crate::remediate::{
    AgentPartitioner, ErrorParser, FixProposer, PackageAssessor, PatchApplicator,
};

/// Why a single candidate could not be evaluated.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Commit failed: {0:#}")]
    Commit(anyhow::Error),
}

/// An unrecoverable failure, carrying everything the run did before it.
#[derive(Debug, Error)]
#[error("Remediation aborted: {source}")]
pub struct RunAborted {
    pub run: Box<RemediationRun>,
    pub source: RemediationError,
}

/// What happened to one agent within an iteration.
struct AgentAttempt {
    outcome: AgentOutcome,
    tried: usize,
    resolved: usize,
    /// Set when a patch failed in a way the run cannot recover from.
    fatal: Option<PatchError>,
}

impl AgentAttempt {
    fn build_is_green(&self) -> bool {
        self.outcome == AgentOutcome::BuildFixed
    }
}

pub struct Orchestrator {
    oracle: Arc<dyn ReasoningOracle>,
    files: Arc<dyn FileStore>,
    builder: Arc<dyn BuildRunner>,
    vcs: Arc<dyn VersionControl>,
    assessor: PackageAssessor,
    proposer: FixProposer,
    applicator: PatchApplicator,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        files: Arc<dyn FileStore>,
        builder: Arc<dyn BuildRunner>,
        installer: Arc<dyn DependencyInstaller>,
        vcs: Arc<dyn VersionControl>,
        settings: OrchestratorSettings,
    ) -> Self {
        let assessor =
            PackageAssessor::new(oracle.clone(), installer, settings.install_retry.clone());
        let proposer = FixProposer::new(oracle.clone(), files.clone(), settings.max_fixes_per_bug);
        let applicator =
            PatchApplicator::new(oracle.clone(), files.clone(), settings.patch_retry.clone());
        Self {
            oracle,
            files,
            builder,
            vcs,
            assessor,
            proposer,
            applicator,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Applied fix descriptions. Partial success is still `Ok`.
    pub async fn fix_build_errors(
        &self,
        ctx: &ProjectContext,
    ) -> Result<Vec<String>, RemediationError> {
        self.run(ctx)
            .await
            .map(|run| run.fixes)
            .map_err(|aborted| aborted.source)
    }

    /// Drive build → assess → partition → propose → apply → verify until the
    /// build is green or the iteration budget is spent.
    ///
    /// On an unrecoverable failure the partial run travels inside the error.
    pub async fn run(&self, ctx: &ProjectContext) -> Result<RemediationRun, RunAborted> {
        let parser = self.parser(ctx);
        let partitioner = AgentPartitioner::new(&parser);
        let mut run = RemediationRun::new(&ctx.root_path, &ctx.branch);
        let mut modified = false;
        // Output of a build that already ran against the current tree.
        let mut pending_output: Option<String> = None;

        info!(
            root = %ctx.root_path.display(),
            branch = %ctx.branch,
            max_iterations = self.settings.max_iterations,
            "Starting remediation run"
        );

        for iteration in 1..=self.settings.max_iterations {
            let raw_output = match pending_output.take() {
                Some(output) => output,
                None => match self.build(ctx, modified).await {
                    Ok(()) => {
                        info!(iteration, "Build succeeded");
                        run.finish(true);
                        return Ok(run);
                    }
                    Err(output) => output,
                },
            };
            let mut record = IterationRecord::new(iteration);

            let installed = self
                .assessor
                .assess_and_install_packages(&raw_output, ctx)
                .await;
            if !installed.is_empty() {
                info!(iteration, packages = ?installed, "Installed missing packages; skipping code patches");
                run.fixes
                    .push(format!("Installed missing packages: {}", installed.join(", ")));
                record.packages_installed = installed;
                run.iterations.push(record);
                modified = true;
                continue;
            }

            let agents = partitioner.create_bug_agents(&raw_output).await;
            let pre_errors: Vec<ErrorRecord> = agents
                .iter()
                .flat_map(|a| a.errors.iter().cloned())
                .collect();
            record.initial_errors = pre_errors.len();
            info!(
                iteration,
                errors = pre_errors.len(),
                agents = agents.len(),
                "Partitioned build errors"
            );
            if agents.is_empty() {
                warn!(iteration, "Build failed but no errors were extracted");
            }

            let mut green = false;
            for mut agent in agents {
                if green {
                    record
                        .agents
                        .push(agent_record(&agent, &not_attempted()));
                    continue;
                }

                let mut attempt = self.remediate_agent(&mut agent, &pre_errors, ctx).await;
                if let Some(e) = attempt.fatal.take() {
                    record.agents.push(agent_record(&agent, &attempt));
                    run.iterations.push(record);
                    run.abort(&e.to_string());
                    return Err(RunAborted {
                        run: Box::new(run),
                        source: e.into(),
                    });
                }
                if attempt.tried > 0 {
                    modified = true;
                }
                if agent.applied_fix.is_some() {
                    run.fixes.push(describe_fix(&agent, attempt.resolved));
                }
                green = attempt.build_is_green();
                record.agents.push(agent_record(&agent, &attempt));
            }
            run.iterations.push(record);

            if green {
                info!(iteration, fixes = run.fixes.len(), "Build is green");
                run.finish(true);
                return Ok(run);
            }

            match self.build(ctx, modified).await {
                Ok(()) => {
                    info!(iteration, fixes = run.fixes.len(), "Build succeeded after fixes");
                    run.finish(true);
                    return Ok(run);
                }
                Err(output) => pending_output = Some(output),
            }
        }

        // The budget ran out right after an install; check where that left the build.
        let build_succeeded = if pending_output.is_none() && modified {
            self.build(ctx, true).await.is_ok()
        } else {
            false
        };
        info!(
            fixes = run.fixes.len(),
            build_succeeded, "Iteration budget exhausted"
        );
        run.finish(build_succeeded);
        Ok(run)
    }

    /// Try the agent's candidates in order until one is accepted.
    ///
    /// Only a candidate that leaves the build green is accepted. An exhausted
    /// patch abandons the remaining candidates; a filesystem failure is
    /// reported through `AgentAttempt::fatal`.
    async fn remediate_agent(
        &self,
        agent: &mut BugAgent,
        pre_errors: &[ErrorRecord],
        ctx: &ProjectContext,
    ) -> AgentAttempt {
        let file = agent.file_path().to_string();
        agent.potential_fixes = self.proposer.generate_potential_fixes(agent, ctx).await;
        info!(
            agent = %agent.id,
            file = %file,
            errors = agent.errors.len(),
            candidates = agent.potential_fixes.len(),
            "Proposed fixes"
        );

        let mut attempt = AgentAttempt {
            outcome: if agent.potential_fixes.is_empty() {
                AgentOutcome::NoCandidates
            } else {
                AgentOutcome::AllCandidatesFailed
            },
            tried: 0,
            resolved: 0,
            fatal: None,
        };

        let candidates = agent.potential_fixes.clone();
        for (index, candidate) in candidates.iter().enumerate() {
            let candidate_no = index + 1;
            attempt.tried += 1;

            match self
                .apply_and_evaluate_fix(agent, candidate, pre_errors, ctx)
                .await
            {
                Ok(result) if result.success => {
                    agent.applied_fix = Some(candidate.clone());
                    attempt.resolved = agent.errors.len();
                    attempt.outcome = AgentOutcome::BuildFixed;
                    info!(
                        agent = %agent.id,
                        file = %file,
                        candidate = candidate_no,
                        "Accepted fix"
                    );
                    break;
                }
                Ok(result) => {
                    debug!(
                        agent = %agent.id,
                        candidate = candidate_no,
                        resolved = result.resolved_errors.len(),
                        "Candidate left the build failing"
                    );
                }
                Err(CandidateError::Patch(e)) if e.is_unrecoverable() => {
                    error!(agent = %agent.id, file = %file, error = %e, "Unrecoverable patch failure");
                    attempt.outcome = AgentOutcome::PatchAbandoned {
                        message: e.to_string(),
                    };
                    attempt.fatal = Some(e);
                    break;
                }
                Err(CandidateError::Patch(e)) => {
                    warn!(
                        agent = %agent.id,
                        file = %file,
                        candidate = candidate_no,
                        error = %e,
                        "Patch abandoned; skipping remaining candidates"
                    );
                    attempt.outcome = AgentOutcome::PatchAbandoned {
                        message: e.to_string(),
                    };
                    break;
                }
                Err(e @ CandidateError::Commit(_)) => {
                    warn!(
                        agent = %agent.id,
                        candidate = candidate_no,
                        error = %e,
                        "Candidate rejected"
                    );
                }
            }
        }

        attempt
    }

    /// Apply one candidate, commit it, and rebuild.
    ///
    /// On a rejected build the new output is re-parsed and compared against
    /// `pre_errors` by `(filePath, lineNumber, errorType)`.
    pub async fn apply_and_evaluate_fix(
        &self,
        agent: &mut BugAgent,
        candidate: &str,
        pre_errors: &[ErrorRecord],
        ctx: &ProjectContext,
    ) -> Result<FixResult, CandidateError> {
        let file = agent.file_path().to_string();
        let is_new_file = !self.files.exists(&ctx.root_path.join(&file)).await;

        self.applicator
            .apply_code_patch(&ctx.root_path, &file, candidate, is_new_file)
            .await?;

        let branch = ctx.commit_branch(agent).to_string();
        let hash = self
            .vcs
            .commit_and_push(&branch, &commit_message(agent), &ctx.auth)
            .await
            .map_err(CandidateError::Commit)?;
        debug!(agent = %agent.id, branch = %branch, commit = %hash, "Committed candidate");
        agent.commit_hash = Some(hash);

        match self.build(ctx, true).await {
            Ok(()) => {
                agent.build_output = None;
                Ok(FixResult {
                    success: true,
                    build_output: String::new(),
                    resolved_errors: pre_errors.to_vec(),
                })
            }
            Err(output) => {
                let remaining = self.parser(ctx).parse_build_errors(&output).await;
                let resolved = resolved_errors(pre_errors, &remaining);
                agent.build_output = Some(output.clone());
                Ok(FixResult {
                    success: false,
                    build_output: output,
                    resolved_errors: resolved,
                })
            }
        }
    }

    fn parser(&self, ctx: &ProjectContext) -> ErrorParser {
        ErrorParser::new(self.oracle.clone(), &ctx.root_path)
            .with_model_hint(self.settings.model_hint.clone())
    }

    /// `Err` carries the raw build output.
    async fn build(&self, ctx: &ProjectContext, after_modifications: bool) -> Result<(), String> {
        let options = BuildOptions {
            project_dir: ctx.root_path.clone(),
            after_modifications,
            command: ctx.build.command.clone(),
        };
        self.builder.run(&options).await.map_err(|f| f.output)
    }
}

fn not_attempted() -> AgentAttempt {
    AgentAttempt {
        outcome: AgentOutcome::NotAttempted,
        tried: 0,
        resolved: 0,
        fatal: None,
    }
}

fn agent_record(agent: &BugAgent, attempt: &AgentAttempt) -> AgentRecord {
    AgentRecord {
        agent_id: agent.id.clone(),
        file_path: agent.file_path().to_string(),
        branch_name: agent.branch_name.clone(),
        errors: agent.errors.clone(),
        candidates_proposed: agent.potential_fixes.len(),
        candidates_tried: attempt.tried,
        applied_fix: agent.applied_fix.clone(),
        commit_hash: agent.commit_hash.clone(),
        resolved_errors: attempt.resolved,
        outcome: attempt.outcome.clone(),
    }
}

fn commit_message(agent: &BugAgent) -> String {
    format!(
        "fix: resolve build errors in {}\n\n{}",
        agent.file_path(),
        agent.error_summary()
    )
}

fn describe_fix(agent: &BugAgent, resolved: usize) -> String {
    let mut description = format!(
        "Fixed {} of {} error(s) in {}",
        resolved,
        agent.errors.len(),
        agent.file_path()
    );
    if let Some(hash) = &agent.commit_hash {
        let short: String = hash.chars().take(8).collect();
        description.push_str(&format!(" (commit {})", short));
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryFileStore;
    use crate::model::PullRequestRef;
    use crate::retry::RetryPolicy;
    use crate::testing::{RecordingInstaller, RecordingVcs, ScriptedBuildRunner, ScriptedOracle};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::path::Path;

    struct Harness {
        oracle: Arc<ScriptedOracle>,
        files: Arc<MemoryFileStore>,
        builder: Arc<ScriptedBuildRunner>,
        installer: Arc<RecordingInstaller>,
        vcs: Arc<RecordingVcs>,
    }

    impl Harness {
        fn new(oracle: ScriptedOracle, builder: ScriptedBuildRunner, files: MemoryFileStore) -> Self {
            Self {
                oracle: Arc::new(oracle),
                files: Arc::new(files),
                builder: Arc::new(builder),
                installer: Arc::new(RecordingInstaller::new()),
                vcs: Arc::new(RecordingVcs::new()),
            }
        }

        fn with_vcs(mut self, vcs: RecordingVcs) -> Self {
            self.vcs = Arc::new(vcs);
            self
        }

        fn orchestrator(&self, max_iterations: u32) -> Orchestrator {
            Orchestrator::new(
                self.oracle.clone(),
                self.files.clone(),
                self.builder.clone(),
                self.installer.clone(),
                self.vcs.clone(),
                settings(max_iterations),
            )
        }
    }

    fn settings(max_iterations: u32) -> OrchestratorSettings {
        OrchestratorSettings {
            max_iterations,
            patch_retry: RetryPolicy::immediate(3),
            install_retry: RetryPolicy::immediate(2),
            ..OrchestratorSettings::default()
        }
    }

    fn ctx() -> ProjectContext {
        ProjectContext::new("/repo", "feature/x")
    }

    fn no_packages() -> Value {
        json!({"needsNpmInstall": false, "packagesToInstall": []})
    }

    fn errors_json(entries: &[(&str, u32)]) -> Value {
        let errors: Vec<Value> = entries
            .iter()
            .map(|(file, line)| {
                json!({
                    "filePath": file,
                    "lineNumber": line,
                    "errorType": "TS2304",
                    "errorMessage": "Cannot find name 'x'"
                })
            })
            .collect();
        json!({ "errors": errors })
    }

    #[tokio::test]
    async fn test_green_build_needs_no_work() {
        let h = Harness::new(
            ScriptedOracle::new(),
            ScriptedBuildRunner::new().passing(),
            MemoryFileStore::new(),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();
        assert!(run.build_succeeded);
        assert!(run.fixes.is_empty());
        assert_eq!(h.oracle.json_calls(), 0);
        assert_eq!(h.builder.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_fix_that_turns_build_green() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>import { x } from './x';</fix>")
                .with_text("<file>\n1| import { x } from './x';\n2| let y = x;\n</file>"),
            ScriptedBuildRunner::new()
                .failing("src/a.ts(1,9): error TS2304: Cannot find name 'x'.")
                .passing(),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "let y = x;\n"),
        );

        let fixes = h.orchestrator(3).fix_build_errors(&ctx()).await.unwrap();

        assert_eq!(fixes.len(), 1);
        assert!(fixes[0].contains("src/a.ts"));
        assert_eq!(h.builder.calls(), 2);
        assert_eq!(h.builder.after_modifications_flags(), vec![false, true]);
        assert_eq!(
            h.files.get(Path::new("/repo/src/a.ts")).unwrap(),
            "import { x } from './x';\nlet y = x;\n"
        );
        let commits = h.vcs.commits();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].branch.starts_with("mend/fix-a-ts-"));
        assert!(commits[0].message.contains("Line 1: TS2304"));
    }

    #[tokio::test]
    async fn test_commits_to_active_branch_when_pr_exists() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>declare x</fix>")
                .with_text("<file>\n1| declare const x: number;\n</file>"),
            ScriptedBuildRunner::new().failing("error").passing(),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "x;\n"),
        );
        let ctx = ctx().with_pull_request(PullRequestRef {
            number: 12,
            url: None,
        });

        h.orchestrator(1).run(&ctx).await.unwrap();
        assert_eq!(h.vcs.commits()[0].branch, "feature/x");
    }

    #[tokio::test]
    async fn test_installed_packages_skip_code_patches() {
        let h = Harness::new(
            ScriptedOracle::new().with_json(json!({
                "needsNpmInstall": true,
                "packagesToInstall": ["lodash"]
            })),
            ScriptedBuildRunner::new()
                .failing("Cannot find module 'lodash'")
                .passing(),
            MemoryFileStore::new(),
        );

        let run = h.orchestrator(2).run(&ctx()).await.unwrap();

        assert_eq!(run.fixes, vec!["Installed missing packages: lodash"]);
        assert!(run.build_succeeded);
        assert_eq!(h.oracle.text_calls(), 0);
        assert_eq!(h.installer.installed(), vec!["lodash"]);
        assert_eq!(h.builder.after_modifications_flags(), vec![false, true]);
        assert!(h.vcs.commits().is_empty());
    }

    #[tokio::test]
    async fn test_install_on_last_iteration_is_verified() {
        let h = Harness::new(
            ScriptedOracle::new().with_json(json!({
                "needsNpmInstall": true,
                "packagesToInstall": ["lodash"]
            })),
            ScriptedBuildRunner::new()
                .failing("Cannot find module 'lodash'")
                .passing(),
            MemoryFileStore::new(),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();
        assert!(run.build_succeeded);
        assert_eq!(h.builder.calls(), 2);
    }

    #[tokio::test]
    async fn test_commit_failure_rejects_candidate_without_rebuilding() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>one</fix><fix>two</fix>")
                .with_text("<file>\n1| one\n</file>")
                .with_text("<file>\n1| two\n</file>"),
            ScriptedBuildRunner::new().failing("error").failing("error"),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "broken\n"),
        )
        .with_vcs(RecordingVcs::failing());

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();

        assert!(run.fixes.is_empty());
        assert!(!run.build_succeeded);
        assert_eq!(h.builder.calls(), 2);
        let agent = &run.iterations[0].agents[0];
        assert_eq!(agent.outcome, AgentOutcome::AllCandidatesFailed);
        assert_eq!(agent.candidates_tried, 2);
        assert!(agent.commit_hash.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_patch_abandons_agent_but_not_run() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1), ("src/b.ts", 2)]))
                .with_text("<fix>one</fix><fix>two</fix>")
                .with_text("nope")
                .with_text("nope")
                .with_text("nope")
                .with_text("I have no idea"),
            ScriptedBuildRunner::new().failing("error").failing("error"),
            MemoryFileStore::new()
                .with_file("/repo/src/a.ts", "a\n")
                .with_file("/repo/src/b.ts", "b\n"),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();

        let agents = &run.iterations[0].agents;
        assert!(matches!(agents[0].outcome, AgentOutcome::PatchAbandoned { .. }));
        assert_eq!(agents[0].candidates_tried, 1);
        assert_eq!(agents[1].outcome, AgentOutcome::NoCandidates);
        assert_eq!(h.oracle.text_calls(), 5);
        assert!(run.fixes.is_empty());
    }

    struct ReadOnlyStore(MemoryFileStore);

    #[async_trait]
    impl FileStore for ReadOnlyStore {
        async fn read(&self, path: &Path) -> anyhow::Result<String> {
            self.0.read(path).await
        }

        async fn write(&self, path: &Path, _content: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only file system: {}", path.display())
        }

        async fn exists(&self, path: &Path) -> bool {
            self.0.exists(path).await
        }

        async fn mkdirp(&self, path: &Path) -> anyhow::Result<()> {
            self.0.mkdirp(path).await
        }
    }

    #[tokio::test]
    async fn test_filesystem_failure_is_unrecoverable() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>one</fix>")
                .with_text("<file>\n1| x\n</file>")
                .with_text("<file>\n1| x\n</file>")
                .with_text("<file>\n1| x\n</file>"),
        );
        let orchestrator = Orchestrator::new(
            oracle,
            Arc::new(ReadOnlyStore(
                MemoryFileStore::new().with_file("/repo/src/a.ts", "a\n"),
            )),
            Arc::new(ScriptedBuildRunner::new().failing("error")),
            Arc::new(RecordingInstaller::new()),
            Arc::new(RecordingVcs::new()),
            settings(1),
        );

        match orchestrator.fix_build_errors(&ctx()).await {
            Err(RemediationError::Patch(e)) => assert!(e.is_unrecoverable()),
            other => panic!("expected unrecoverable patch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_aborted_run_keeps_earlier_fixes() {
        let files = MemoryFileStore::new()
            .with_file("/repo/src/a.ts", "a\n")
            .with_file("/repo/src/b.ts", "b\n");
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1), ("src/b.ts", 2)]))
                .with_json(errors_json(&[("src/b.ts", 2)]))
                .with_text("<fix>fix a</fix>")
                .with_text("<file>\n1| fixed a\n</file>")
                .with_text("<fix>fix b</fix>")
                .with_text("<file>\n1| fixed b\n</file>")
                .with_text("<file>\n1| fixed b\n</file>")
                .with_text("<file>\n1| fixed b\n</file>"),
        );
        let vcs = Arc::new(RecordingVcs::new());
        let orchestrator = Orchestrator::new(
            oracle,
            Arc::new(ReadOnlyFor {
                inner: files,
                path: "/repo/src/b.ts",
            }),
            Arc::new(ScriptedBuildRunner::new().failing("a and b").failing("b")),
            Arc::new(RecordingInstaller::new()),
            vcs.clone(),
            settings(1),
        );

        let aborted = match orchestrator.run(&ctx()).await {
            Err(aborted) => aborted,
            Ok(run) => panic!("expected an aborted run, got {run:?}"),
        };

        assert!(matches!(aborted.source, RemediationError::Patch(_)));
        let run = aborted.run;
        assert!(run.aborted.is_some());
        assert!(!run.build_succeeded);
        assert_eq!(run.iterations.len(), 1);
        let agents = &run.iterations[0].agents;
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].outcome, AgentOutcome::AllCandidatesFailed);
        assert!(agents[0].commit_hash.is_some());
        assert!(matches!(agents[1].outcome, AgentOutcome::PatchAbandoned { .. }));
        assert_eq!(vcs.commits().len(), 1);
    }

    /// Refuses writes to a single path.
    struct ReadOnlyFor {
        inner: MemoryFileStore,
        path: &'static str,
    }

    #[async_trait]
    impl FileStore for ReadOnlyFor {
        async fn read(&self, path: &Path) -> anyhow::Result<String> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
            if path == Path::new(self.path) {
                anyhow::bail!("read-only file system: {}", path.display());
            }
            self.inner.write(path, content).await
        }

        async fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path).await
        }

        async fn mkdirp(&self, path: &Path) -> anyhow::Result<()> {
            self.inner.mkdirp(path).await
        }
    }

    #[tokio::test]
    async fn test_budget_runs_out_without_green_build() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1), ("src/b.ts", 2)]))
                .with_json(errors_json(&[("src/b.ts", 2)]))
                .with_json(errors_json(&[("src/b.ts", 2)]))
                .with_text("<fix>fix a</fix>")
                .with_text("<file>\n1| fixed a\n</file>")
                .with_text("<fix>fix b</fix>")
                .with_text("<file>\n1| still b\n</file>"),
            ScriptedBuildRunner::new()
                .failing("a and b")
                .failing("b")
                .failing("b")
                .failing("b"),
            MemoryFileStore::new()
                .with_file("/repo/src/a.ts", "a\n")
                .with_file("/repo/src/b.ts", "b\n"),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();

        assert!(!run.build_succeeded);
        assert!(run.fixes.is_empty());
        let agents = &run.iterations[0].agents;
        assert_eq!(agents[0].outcome, AgentOutcome::AllCandidatesFailed);
        assert_eq!(agents[0].resolved_errors, 0);
        assert!(agents[0].applied_fix.is_none());
        assert_eq!(agents[1].outcome, AgentOutcome::AllCandidatesFailed);
        assert_eq!(run.iterations[0].initial_errors, 2);
        assert_eq!(h.builder.calls(), 4);
        assert_eq!(h.vcs.commits().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_reparse_of_failing_build_does_not_accept_candidate() {
        // No JSON left for the re-parse after candidate one, so it yields no errors.
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>one</fix><fix>two</fix>")
                .with_text("<file>\n1| one\n</file>")
                .with_text("<file>\n1| two\n</file>"),
            ScriptedBuildRunner::new()
                .failing("error")
                .failing("error")
                .passing(),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "a\n"),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();

        assert!(run.build_succeeded);
        assert_eq!(run.fixes.len(), 1);
        let agent = &run.iterations[0].agents[0];
        assert_eq!(agent.outcome, AgentOutcome::BuildFixed);
        assert_eq!(agent.applied_fix.as_deref(), Some("two"));
        assert_eq!(agent.candidates_tried, 2);
        assert_eq!(h.builder.calls(), 3);
    }

    #[tokio::test]
    async fn test_green_build_stops_remaining_agents() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1), ("src/b.ts", 2)]))
                .with_text("<fix>fix a</fix>")
                .with_text("<file>\n1| fixed\n</file>"),
            ScriptedBuildRunner::new().failing("errors").passing(),
            MemoryFileStore::new()
                .with_file("/repo/src/a.ts", "a\n")
                .with_file("/repo/src/b.ts", "b\n"),
        );

        let run = h.orchestrator(3).run(&ctx()).await.unwrap();

        assert!(run.build_succeeded);
        assert_eq!(run.fixes.len(), 1);
        assert_eq!(run.iterations.len(), 1);
        assert_eq!(run.iterations[0].agents[1].outcome, AgentOutcome::NotAttempted);
        assert_eq!(h.oracle.text_calls(), 2);
        assert_eq!(h.builder.calls(), 2);
    }

    #[tokio::test]
    async fn test_first_passing_candidate_wins() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_json(errors_json(&[("src/a.ts", 1)]))
                .with_text("<fix>one</fix><fix>two</fix><fix>three</fix>")
                .with_text("<file>\n1| one\n</file>")
                .with_text("<file>\n1| two\n</file>"),
            ScriptedBuildRunner::new()
                .failing("error")
                .failing("error")
                .passing(),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "a\n"),
        );

        let run = h.orchestrator(1).run(&ctx()).await.unwrap();

        let agent = &run.iterations[0].agents[0];
        assert_eq!(agent.applied_fix.as_deref(), Some("two"));
        assert_eq!(agent.candidates_proposed, 3);
        assert_eq!(agent.candidates_tried, 2);
        assert_eq!(h.vcs.commits().len(), 2);
        assert_eq!(h.oracle.text_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_json(no_packages())
                .with_json(errors_json(&[("src/types/user.ts", 1)]))
                .with_text("<fix>export interface User { id: string }</fix>")
                .with_text("<file>\nexport interface User { id: string }\n</file>"),
            ScriptedBuildRunner::new().failing("error").passing(),
            MemoryFileStore::new(),
        );

        h.orchestrator(1).run(&ctx()).await.unwrap();
        assert_eq!(
            h.files.get(Path::new("/repo/src/types/user.ts")).unwrap(),
            "export interface User { id: string }\n"
        );
    }

    #[tokio::test]
    async fn test_zero_iterations_does_nothing() {
        let h = Harness::new(
            ScriptedOracle::new(),
            ScriptedBuildRunner::new().failing("error"),
            MemoryFileStore::new(),
        );

        let run = h.orchestrator(0).run(&ctx()).await.unwrap();
        assert!(run.fixes.is_empty());
        assert!(!run.build_succeeded);
        assert_eq!(h.builder.calls(), 0);
    }

    #[tokio::test]
    async fn test_apply_and_evaluate_reports_resolved_errors() {
        let h = Harness::new(
            ScriptedOracle::new()
                .with_text("<file>\n1| fixed\n</file>")
                .with_json(json!({
                    "errors": [{
                        "filePath": "src/a.ts",
                        "lineNumber": 9,
                        "errorType": "TS2322",
                        "errorMessage": "a different message"
                    }]
                })),
            ScriptedBuildRunner::new().failing("src/a.ts(9,1): error TS2322"),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "broken\n"),
        );
        let pre = vec![
            ErrorRecord::new("src/a.ts", 3, "TS2304", "Cannot find name 'x'"),
            ErrorRecord::new("src/a.ts", 9, "TS2322", "Type mismatch"),
        ];
        let mut agent = crate::remediate::agents_from_errors(pre.clone()).remove(0);

        let result = h
            .orchestrator(1)
            .apply_and_evaluate_fix(&mut agent, "fix it", &pre, &ctx())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.resolved_errors, vec![pre[0].clone()]);
        assert_eq!(agent.build_output.as_deref(), Some("src/a.ts(9,1): error TS2322"));
        assert!(agent.commit_hash.is_some());
    }

    #[test]
    fn test_describe_fix_shortens_non_ascii_hash() {
        let mut agent = crate::remediate::agents_from_errors(vec![ErrorRecord::new(
            "src/a.ts",
            1,
            "TS2304",
            "Cannot find name 'x'",
        )])
        .remove(0);
        agent.commit_hash = Some("ééééééééé".to_string());

        assert_eq!(
            describe_fix(&agent, 1),
            "Fixed 1 of 1 error(s) in src/a.ts (commit éééééééé)"
        );
    }
}
