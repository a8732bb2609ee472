use anyhow::{Context, Result};
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::mend_config::MendConfig;
use crate::model::{AuthContext, BuildSettings, ProjectContext, ProjectHints, PullRequestRef};
use crate::orchestrator::OrchestratorSettings;
use crate::retry::RetryPolicy;

/// Runtime configuration for one mend invocation.
///
/// Bridges the layered `MendConfig` with what the pipeline consumes: the
/// orchestrator's tuning knobs and the read-only `ProjectContext`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub mend_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub claude_cmd: String,
    pub model: Option<String>,
    pub verbose: bool,
    mend_config: MendConfig,
}

impl Config {
    pub fn new(mend_config: MendConfig) -> Self {
        Self {
            project_dir: mend_config.project_dir.clone(),
            mend_dir: mend_config.mend_dir.clone(),
            runs_dir: mend_config.runs_dir(),
            claude_cmd: mend_config.claude_cmd(),
            model: mend_config.model(),
            verbose: mend_config.verbose,
            mend_config,
        }
    }

    pub fn mend_config(&self) -> &MendConfig {
        &self.mend_config
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.mend_config.toml.retry.policy()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_iterations: self.mend_config.max_iterations(),
            max_fixes_per_bug: self.mend_config.max_fixes_per_bug(),
            patch_retry: self.retry_policy(),
            install_retry: self.retry_policy(),
            model_hint: self.model.clone(),
        }
    }

    /// Branch from `--branch`, else the repository's checked-out branch.
    pub fn active_branch(&self) -> Result<String> {
        if let Some(branch) = &self.mend_config.cli.branch {
            return Ok(branch.clone());
        }
        current_branch(&self.project_dir)
    }

    pub fn project_context(&self) -> Result<ProjectContext> {
        let toml = &self.mend_config.toml;

        let research = match &toml.hints.research_file {
            Some(path) => {
                let path = self.project_dir.join(path);
                match std::fs::read_to_string(&path) {
                    Ok(notes) => Some(notes),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Could not read research notes");
                        None
                    }
                }
            }
            None => None,
        };

        let hints = ProjectHints {
            style: toml.hints.style.clone(),
            types: toml.hints.types.clone(),
            packages: toml.hints.packages.clone(),
            file_source_map: toml
                .hints
                .file_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            research,
        };

        let auth = AuthContext {
            username: std::env::var("GITHUB_ACTOR").ok(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        };

        let mut ctx = ProjectContext::new(self.project_dir.clone(), self.active_branch()?)
            .with_hints(hints)
            .with_auth(auth)
            .with_build(BuildSettings {
                command: self.mend_config.build_command(),
                install_command: toml.build.install_command.clone(),
            });
        if let Some(number) = self.mend_config.cli.pr {
            ctx = ctx.with_pull_request(PullRequestRef { number, url: None });
        }
        Ok(ctx)
    }
}

/// Short name of the branch HEAD points at.
pub fn current_branch(repo_dir: &Path) -> Result<String> {
    let repo = Repository::discover(repo_dir)
        .with_context(|| format!("{} is not inside a git repository", repo_dir.display()))?;
    let head = repo.head().context("Repository has no HEAD")?;
    head.shorthand()
        .map(str::to_string)
        .context("HEAD is not a valid UTF-8 branch name")
}
