//! Oracle backed by the Claude CLI (`claude --print`).

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ReasoningOracle, StructuredRequest};
use crate::errors::OracleError;
use crate::util::extract_json_object;

/// Spawns the Claude CLI once per completion, prompt on stdin, reply on stdout.
#[derive(Debug, Clone)]
pub struct ClaudeCliOracle {
    claude_cmd: String,
    default_model: Option<String>,
}

impl ClaudeCliOracle {
    pub fn new(claude_cmd: impl Into<String>) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            default_model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }

    /// Arguments for one invocation.
    pub fn args(&self, system_prompt: &str, model_hint: Option<&str>) -> Vec<String> {
        let mut args = vec!["--print".to_string()];
        if let Some(model) = model_hint.or(self.default_model.as_deref()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if !system_prompt.is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(system_prompt.to_string());
        }
        args
    }

    async fn invoke(
        &self,
        prompt: &str,
        system_prompt: &str,
        model_hint: Option<&str>,
    ) -> Result<String, OracleError> {
        let start = Instant::now();

        let mut child = Command::new(&self.claude_cmd)
            .args(self.args(system_prompt, model_hint))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OracleError::Unavailable(format!("failed to spawn '{}': {}", self.claude_cmd, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let out = child.wait_with_output().await?;
        let output = String::from_utf8_lossy(&out.stdout).into_owned();
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            prompt_chars = prompt.len(),
            reply_chars = output.len(),
            "Oracle call completed"
        );

        if !out.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "Oracle process failed"
            );
            return Err(OracleError::ProcessFailed {
                exit_code: out.status.code().unwrap_or(-1),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ReasoningOracle for ClaudeCliOracle {
    async fn complete_text(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<Option<String>, OracleError> {
        let output = self.invoke(prompt, system_prompt, None).await?;
        if output.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(output))
        }
    }

    async fn complete_json(&self, request: &StructuredRequest<'_>) -> Result<Value, OracleError> {
        let prompt = structured_prompt(request);
        let output = self
            .invoke(&prompt, request.system_prompt, request.model_hint)
            .await?;
        if output.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        parse_json_reply(&output)
    }
}

/// The CLI has no schema or temperature flags, so both travel in the prompt.
pub fn structured_prompt(request: &StructuredRequest<'_>) -> String {
    let schema = serde_json::to_string_pretty(request.schema).unwrap_or_default();
    format!(
        "{}\n\nRespond with ONLY a JSON object matching this JSON schema, no prose and no code fences:\n{}\n\n(Be as deterministic as temperature {:.1} implies.)",
        request.prompt, schema, request.temperature
    )
}

pub fn parse_json_reply(output: &str) -> Result<Value, OracleError> {
    let json = extract_json_object(output).ok_or_else(|| OracleError::Malformed {
        reason: "no JSON object in reply".to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| OracleError::Malformed {
        reason: e.to_string(),
    })
}
