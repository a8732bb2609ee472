use super::RemediationRun;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Persists finished runs as pretty JSON under `<audit_dir>/runs/`.
pub struct AuditLogger {
    runs_dir: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            runs_dir: audit_dir.join("runs"),
        }
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Write `run` to `<timestamp>_<id8>.json` and return the file path.
    pub fn save(&self, run: &RemediationRun) -> Result<PathBuf> {
        fs::create_dir_all(&self.runs_dir).with_context(|| {
            format!("Failed to create runs directory {}", self.runs_dir.display())
        })?;

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            run.short_id()
        );
        let run_file = self.runs_dir.join(filename);

        let json = serde_json::to_string_pretty(run).context("Failed to serialize run")?;
        fs::write(&run_file, json).context("Failed to write run file")?;
        Ok(run_file)
    }

    /// Recorded runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&self.runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    pub fn load_run(&self, path: &Path) -> Result<RemediationRun> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run file {}", path.display()))
    }
}
