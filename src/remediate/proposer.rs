//! Candidate patch generation for one bug agent.

use std::sync::Arc;

use tracing::{debug, warn};

use super::prompts::{self, FIX_TAG};
use crate::collab::FileStore;
use crate::model::{BugAgent, ProjectContext};
use crate::oracle::ReasoningOracle;
use crate::util::extract_tagged;

pub struct FixProposer {
    oracle: Arc<dyn ReasoningOracle>,
    files: Arc<dyn FileStore>,
    max_fixes: usize,
}

impl FixProposer {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        files: Arc<dyn FileStore>,
        max_fixes: usize,
    ) -> Self {
        Self {
            oracle,
            files,
            max_fixes,
        }
    }

    /// Up to `max_fixes` tag-wrapped candidates, verbatim and in oracle order.
    /// Candidates are not validated here; the build check does that.
    pub async fn generate_potential_fixes(
        &self,
        agent: &BugAgent,
        ctx: &ProjectContext,
    ) -> Vec<String> {
        let path = ctx.root_path.join(agent.file_path());
        let content = if self.files.exists(&path).await {
            match self.files.read(&path).await {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Could not read file for fix proposal");
                    None
                }
            }
        } else {
            None
        };

        let prompt = prompts::fix_prompt(agent, content.as_deref(), &ctx.hints, self.max_fixes);
        let reply = match self
            .oracle
            .complete_text(&prompt, prompts::FIX_SYSTEM_PROMPT)
            .await
        {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(agent = %agent.id, "Oracle returned no fix proposals");
                return Vec::new();
            }
            Err(e) => {
                warn!(agent = %agent.id, error = %e, "Fix proposal failed");
                return Vec::new();
            }
        };

        let mut fixes: Vec<String> = extract_tagged(&reply, FIX_TAG)
            .into_iter()
            .filter(|fix| !fix.trim().is_empty())
            .collect();
        if fixes.len() > self.max_fixes {
            debug!(
                agent = %agent.id,
                returned = fixes.len(),
                kept = self.max_fixes,
                "Dropping surplus fix proposals"
            );
            fixes.truncate(self.max_fixes);
        }
        fixes
    }
}
