//! Dependency installation.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use super::build::shell_command;

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub project_dir: PathBuf,
    /// Installer invocation; the package name is appended.
    pub install_command: String,
}

#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, package: &str, options: &InstallOptions) -> Result<()>;
}

/// Runs `<install_command> <package>` in the project directory.
#[derive(Debug, Clone, Default)]
pub struct CommandInstaller;

/// Package names come from the oracle; refuse anything that could smuggle
/// extra shell syntax into the command line.
pub fn is_safe_package_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@/._-~^".contains(c))
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    async fn install(&self, package: &str, options: &InstallOptions) -> Result<()> {
        if !is_safe_package_name(package) {
            bail!("Refusing to install suspicious package name '{}'", package);
        }

        let command = format!("{} {}", options.install_command, package);
        let output = shell_command(&command)
            .current_dir(&options.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run '{}'", command))?;

        if !output.status.success() {
            bail!(
                "'{}' failed: {}",
                command,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
