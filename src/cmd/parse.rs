//! Error extraction from captured output: `mend parse`.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use mend::config::Config;
use mend::mend_config::MendConfig;
use mend::oracle::ClaudeCliOracle;
use mend::remediate::ErrorParser;

/// Print the parsed error records as a JSON array on stdout.
pub async fn cmd_parse(project_dir: &Path, input: &str) -> Result<()> {
    let raw_output = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read build output from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read build output from {}", input))?
    };

    let config = Config::new(MendConfig::new(project_dir.to_path_buf())?);
    let oracle =
        Arc::new(ClaudeCliOracle::new(config.claude_cmd.clone()).with_model(config.model.clone()));
    let parser = ErrorParser::new(oracle, config.project_dir.clone()).with_model_hint(config.model);

    let errors = parser.parse_build_errors(&raw_output).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&errors).context("Failed to serialize errors")?
    );
    Ok(())
}
