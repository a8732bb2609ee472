//! Core data model threaded through the remediation pipeline.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One structured build error. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub file_path: String,
    pub line_number: u32,
    pub error_type: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_with_error: Option<String>,
}

impl ErrorRecord {
    pub fn new(
        file_path: impl Into<String>,
        line_number: u32,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            error_type: error_type.into(),
            error_message: error_message.into(),
            code_with_error: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code_with_error = Some(code.into());
        self
    }

    /// Identity used to diff errors across builds. The message is not part of it.
    pub fn key(&self) -> ErrorKey {
        ErrorKey {
            file_path: canonicalize_path(&self.file_path),
            line_number: self.line_number,
            error_type: self.error_type.clone(),
        }
    }

    /// One-line summary used in prompts and fix descriptions.
    pub fn summary_line(&self) -> String {
        format!(
            "Line {}: {} - {}",
            self.line_number, self.error_type, self.error_message
        )
    }
}

/// `(filePath, lineNumber, errorType)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorKey {
    pub file_path: String,
    pub line_number: u32,
    pub error_type: String,
}

/// Errors present in `before` whose key no longer appears in `after`.
pub fn resolved_errors(before: &[ErrorRecord], after: &[ErrorRecord]) -> Vec<ErrorRecord> {
    let still_present: std::collections::HashSet<ErrorKey> =
        after.iter().map(ErrorRecord::key).collect();
    before
        .iter()
        .filter(|e| !still_present.contains(&e.key()))
        .cloned()
        .collect()
}

/// Normalize a build-tool path so the same file always compares equal.
///
/// Backslashes become slashes, `.` segments disappear, `..` pops, and
/// leading `./` or `/` is dropped so the result is repository-relative.
pub fn canonicalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Repository-relative form of a path reported against `root`.
///
/// `None` when the path lies outside the repository: absolute paths not
/// under `root`, or relative paths whose `..` segments climb above it.
pub fn canonicalize_under_root(raw: &str, root: &Path) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    let candidate = Path::new(&unified);
    let relative = if candidate.is_absolute() {
        let rel: PathBuf = candidate
            .strip_prefix(root)
            .ok()?
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        rel.to_string_lossy().into_owned()
    } else {
        unified
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// A unit of remediation work scoped to one file's errors.
///
/// Created fresh every orchestrator iteration; never persisted across them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BugAgent {
    pub id: String,
    pub errors: Vec<ErrorRecord>,
    pub potential_fixes: Vec<String>,
    pub applied_fix: Option<String>,
    pub build_output: Option<String>,
    pub commit_hash: Option<String>,
    pub branch_name: String,
}

impl BugAgent {
    /// The file every error in this agent belongs to.
    pub fn file_path(&self) -> &str {
        self.errors
            .first()
            .map(|e| e.file_path.as_str())
            .unwrap_or_default()
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ErrorRecord::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Credentials handed to version control.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub username: Option<String>,
    pub token: Option<String>,
}

/// Free-form project knowledge forwarded to the oracle.
#[derive(Debug, Clone, Default)]
pub struct ProjectHints {
    pub style: Option<String>,
    pub types: Option<String>,
    pub packages: Option<String>,
    /// Path → short description of what the file does.
    pub file_source_map: HashMap<String, String>,
    pub research: Option<String>,
}

/// Reference to an already-open pull request for the active branch.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: Option<String>,
}

/// How to build and install dependencies for the project.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub command: String,
    pub install_command: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: "npm run build".to_string(),
            install_command: "npm install".to_string(),
        }
    }
}

/// Read-only bag threaded through every stage of one run.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub root_path: PathBuf,
    pub branch: String,
    pub auth: AuthContext,
    pub hints: ProjectHints,
    pub pull_request: Option<PullRequestRef>,
    pub build: BuildSettings,
}

impl ProjectContext {
    pub fn new(root_path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            branch: branch.into(),
            auth: AuthContext::default(),
            hints: ProjectHints::default(),
            pull_request: None,
            build: BuildSettings::default(),
        }
    }

    pub fn with_hints(mut self, hints: ProjectHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_pull_request(mut self, pr: PullRequestRef) -> Self {
        self.pull_request = Some(pr);
        self
    }

    pub fn with_build(mut self, build: BuildSettings) -> Self {
        self.build = build;
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Branch a fix for `agent` should be committed to.
    pub fn commit_branch<'a>(&'a self, agent: &'a BugAgent) -> &'a str {
        if self.pull_request.is_some() {
            &self.branch
        } else {
            &agent.branch_name
        }
    }
}

/// Outcome of one `(agent, candidate)` attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    pub success: bool,
    pub build_output: String,
    pub resolved_errors: Vec<ErrorRecord>,
}

/// A file written by the patch applicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDescriptor {
    pub path: String,
    pub code_block: String,
    pub is_new: bool,
}
