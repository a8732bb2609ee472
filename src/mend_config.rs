//! Unified configuration for mend.
//!
//! Settings are read from `.mend/mend.toml` and layered file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "web-app"
//! claude_cmd = "claude"
//! model = "sonnet"
//!
//! [build]
//! command = "npm run build"
//! install_command = "npm install"
//!
//! [remediation]
//! max_iterations = 1
//! max_fixes_per_bug = 3
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 500
//! max_delay_ms = 8000
//! jitter = true
//!
//! [git]
//! push = true
//! remote = "origin"
//! author_name = "mend"
//! author_email = "mend@localhost"
//!
//! [hints]
//! style = "Prettier, 2-space indent, named exports"
//! types = "Strict TypeScript, no implicit any"
//! packages = "React 18, Next.js 14"
//! research_file = "docs/notes.md"
//!
//! [hints.file_map]
//! "src/lib/api.ts" = "Fetch wrappers for the REST backend"
//! ```
//!
//! Environment: `MEND_CLAUDE_CMD`, `MEND_BUILD_CMD` and `MEND_MODEL` override
//! the file; `GITHUB_TOKEN` supplies push credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "mend.toml";
pub const MEND_DIR: &str = ".mend";

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
    /// Model passed to the Claude CLI
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_build_command")]
    pub command: String,
    /// Installer invocation; the package name is appended.
    #[serde(default = "default_install_command")]
    pub install_command: String,
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_install_command() -> String {
    "npm install".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            install_command: default_install_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_fixes_per_bug")]
    pub max_fixes_per_bug: usize,
}

fn default_max_iterations() -> u32 {
    crate::orchestrator::DEFAULT_MAX_ITERATIONS
}

fn default_max_fixes_per_bug() -> usize {
    crate::orchestrator::DEFAULT_MAX_FIXES_PER_BUG
}

impl Default for RemediationSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_fixes_per_bug: default_max_fixes_per_bug(),
        }
    }
}

/// Backoff for patch application and package installs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSection {
    /// Push after every commit
    #[serde(default = "default_true")]
    pub push: bool,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_author_name() -> String {
    "mend".to_string()
}

fn default_author_email() -> String {
    "mend@localhost".to_string()
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            push: true,
            remote: default_remote(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

/// Free-form project knowledge forwarded with every fix request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintsSection {
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub packages: Option<String>,
    /// Notes file, relative to the project root
    #[serde(default)]
    pub research_file: Option<PathBuf>,
    /// Path → what the file does
    #[serde(default)]
    pub file_map: BTreeMap<String, String>,
}

/// Root of `.mend/mend.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MendToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub remediation: RemediationSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub hints: HintsSection,
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl MendToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse mend.toml")
    }

    /// Load `<mend_dir>/mend.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(mend_dir: &Path) -> Result<Self> {
        let config_path = mend_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize mend.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Claude command (env → file → "claude").
    pub fn claude_cmd(&self) -> String {
        env_override("MEND_CLAUDE_CMD")
            .or_else(|| self.project.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Build command (env → file → default).
    pub fn build_command(&self) -> String {
        env_override("MEND_BUILD_CMD").unwrap_or_else(|| self.build.command.clone())
    }

    /// Model (env → file).
    pub fn model(&self) -> Option<String> {
        env_override("MEND_MODEL").or_else(|| self.project.model.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.remediation.max_iterations == 0 {
            warnings.push(
                "remediation.max_iterations is 0: the build will never be checked".to_string(),
            );
        }
        if self.remediation.max_fixes_per_bug == 0 {
            warnings.push(
                "remediation.max_fixes_per_bug is 0: no fixes will be proposed".to_string(),
            );
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0: treated as a single attempt".to_string());
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            warnings.push(format!(
                "retry.max_delay_ms ({}) is below retry.initial_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.initial_delay_ms
            ));
        }
        if self.build.command.trim().is_empty() {
            warnings.push("build.command is empty".to_string());
        }
        if self.build.install_command.trim().is_empty() {
            warnings.push("build.install_command is empty".to_string());
        }
        if self.git.remote.trim().is_empty() && self.git.push {
            warnings.push("git.push is enabled but git.remote is empty".to_string());
        }

        warnings
    }
}

/// Values given on the command line; `None` means "not specified".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub max_iterations: Option<u32>,
    pub max_fixes: Option<usize>,
    pub build_cmd: Option<String>,
    pub branch: Option<String>,
    pub no_push: bool,
    pub pr: Option<u64>,
}

/// Merged configuration: mend.toml, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct MendConfig {
    pub project_dir: PathBuf,
    pub mend_dir: PathBuf,
    pub toml: MendToml,
    pub verbose: bool,
    pub cli: CliOverrides,
}

impl MendConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let mend_dir = project_dir.join(MEND_DIR);
        let toml = MendToml::load_or_default(&mend_dir)?;

        Ok(Self {
            project_dir,
            mend_dir,
            toml,
            verbose: false,
            cli: CliOverrides::default(),
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool, cli: CliOverrides) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli = cli;
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.mend_dir.join(CONFIG_FILE)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.mend_dir.join("runs")
    }

    pub fn claude_cmd(&self) -> String {
        self.toml.claude_cmd()
    }

    pub fn model(&self) -> Option<String> {
        self.toml.model()
    }

    /// CLI → env → file.
    pub fn build_command(&self) -> String {
        self.cli
            .build_cmd
            .clone()
            .unwrap_or_else(|| self.toml.build_command())
    }

    pub fn max_iterations(&self) -> u32 {
        self.cli
            .max_iterations
            .unwrap_or(self.toml.remediation.max_iterations)
    }

    pub fn max_fixes_per_bug(&self) -> usize {
        self.cli
            .max_fixes
            .unwrap_or(self.toml.remediation.max_fixes_per_bug)
    }

    pub fn push(&self) -> bool {
        self.toml.git.push && !self.cli.no_push
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
