//! Build verification.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::BuildFailure;

/// One build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_dir: PathBuf,
    /// Whether the working tree was modified since the last build.
    pub after_modifications: bool,
    pub command: String,
}

#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// `Ok(())` on a green build; `Err` carries the raw tool output.
    async fn run(&self, options: &BuildOptions) -> Result<(), BuildFailure>;
}

/// Runs the configured build command through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct CommandBuildRunner;

pub(crate) fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn run(&self, options: &BuildOptions) -> Result<(), BuildFailure> {
        let mut cmd = shell_command(&options.command);
        cmd.current_dir(&options.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if options.after_modifications {
            cmd.env("MEND_AFTER_MODIFICATIONS", "1");
        }

        debug!(command = %options.command, after_modifications = options.after_modifications, "Running build");

        let output = cmd.output().await.map_err(|e| {
            BuildFailure::new(format!(
                "Failed to run build command '{}': {}",
                options.command, e
            ))
        })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Err(BuildFailure::new(combined))
    }
}
