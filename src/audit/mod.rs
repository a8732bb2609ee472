use crate::model::ErrorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Everything one `Orchestrator::run` did, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub project_dir: PathBuf,
    pub branch: String,
    pub iterations: Vec<IterationRecord>,
    /// Whether the last build observed by the run was green.
    pub build_succeeded: bool,
    /// Human-readable descriptions of every applied fix.
    pub fixes: Vec<String>,
    /// Why the run stopped early, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RemediationRun {
    pub fn new(project_dir: &Path, branch: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            project_dir: project_dir.to_path_buf(),
            branch: branch.to_string(),
            iterations: Vec::new(),
            build_succeeded: false,
            fixes: Vec::new(),
            aborted: None,
        }
    }

    pub fn finish(&mut self, build_succeeded: bool) {
        self.ended_at = Some(Utc::now());
        self.build_succeeded = build_succeeded;
    }

    pub fn abort(&mut self, reason: &str) {
        self.finish(false);
        self.aborted = Some(reason.to_string());
    }

    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    pub fn total_resolved(&self) -> usize {
        self.iterations
            .iter()
            .flat_map(|i| &i.agents)
            .map(|a| a.resolved_errors)
            .sum()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    /// Errors parsed from the build that opened this iteration.
    pub initial_errors: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages_installed: Vec<String>,
    pub agents: Vec<AgentRecord>,
}

impl IterationRecord {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            started_at: Utc::now(),
            initial_errors: 0,
            packages_installed: Vec::new(),
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub file_path: String,
    pub branch_name: String,
    pub errors: Vec<ErrorRecord>,
    pub candidates_proposed: usize,
    pub candidates_tried: usize,
    pub applied_fix: Option<String>,
    pub commit_hash: Option<String>,
    pub resolved_errors: usize,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentOutcome {
    /// The accepted candidate turned the build green.
    BuildFixed,
    NoCandidates,
    AllCandidatesFailed,
    /// Patch application ran out of attempts; remaining candidates skipped.
    PatchAbandoned { message: String },
    /// Never reached because an earlier agent turned the build green.
    NotAttempted,
}

pub mod logger;
pub use logger::AuditLogger;
