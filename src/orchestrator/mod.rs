pub mod runner;

pub use runner::{CandidateError, Orchestrator, RunAborted};

use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_ITERATIONS: u32 = 1;
pub const DEFAULT_MAX_FIXES_PER_BUG: usize = 3;

/// Tuning knobs for one orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Upper bound on build → fix cycles.
    pub max_iterations: u32,
    /// Candidates requested (and kept) per bug agent.
    pub max_fixes_per_bug: usize,
    /// Attempts for applying one candidate patch.
    pub patch_retry: RetryPolicy,
    /// Attempts for installing one package.
    pub install_retry: RetryPolicy,
    /// Model forwarded to error extraction.
    pub model_hint: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_fixes_per_bug: DEFAULT_MAX_FIXES_PER_BUG,
            patch_retry: RetryPolicy::default(),
            install_retry: RetryPolicy::default(),
            model_hint: None,
        }
    }
}
