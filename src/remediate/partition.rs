//! Grouping error records into per-file bug agents.

use std::path::Path;

use uuid::Uuid;

use super::parser::ErrorParser;
use crate::model::{BugAgent, ErrorRecord};
use crate::util::slugify;

/// Prefix for branches that carry automated fixes.
pub const BRANCH_PREFIX: &str = "mend/fix";

/// Group errors by file, preserving the order in which files first appear.
pub fn group_errors_by_file(errors: Vec<ErrorRecord>) -> Vec<(String, Vec<ErrorRecord>)> {
    let mut groups: Vec<(String, Vec<ErrorRecord>)> = Vec::new();
    for error in errors {
        match groups.iter_mut().find(|(path, _)| *path == error.file_path) {
            Some((_, bucket)) => bucket.push(error),
            None => groups.push((error.file_path.clone(), vec![error])),
        }
    }
    groups
}

/// Branch name derived from the file's basename plus a random suffix, so two
/// runs against the same repository never collide.
pub fn branch_name_for(file_path: &str) -> String {
    let basename = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string());
    let slug = slugify(&basename, 40);
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    if slug.is_empty() {
        format!("{}-{}", BRANCH_PREFIX, suffix)
    } else {
        format!("{}-{}-{}", BRANCH_PREFIX, slug, suffix)
    }
}

/// Turn grouped errors into fresh agents, one per file.
pub fn agents_from_errors(errors: Vec<ErrorRecord>) -> Vec<BugAgent> {
    group_errors_by_file(errors)
        .into_iter()
        .enumerate()
        .map(|(i, (file_path, errors))| BugAgent {
            id: format!("agent-{}", i + 1),
            branch_name: branch_name_for(&file_path),
            errors,
            potential_fixes: Vec::new(),
            applied_fix: None,
            build_output: None,
            commit_hash: None,
        })
        .collect()
}

pub struct AgentPartitioner<'a> {
    parser: &'a ErrorParser,
}

impl<'a> AgentPartitioner<'a> {
    pub fn new(parser: &'a ErrorParser) -> Self {
        Self { parser }
    }

    pub async fn create_bug_agents(&self, raw_output: &str) -> Vec<BugAgent> {
        let errors = self.parser.parse_build_errors(raw_output).await;
        agents_from_errors(errors)
    }
}
