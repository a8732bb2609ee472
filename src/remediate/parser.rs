//! Raw build output → structured error records.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::prompts;
use crate::model::{ErrorRecord, canonicalize_under_root};
use crate::oracle::{ReasoningOracle, StructuredRequest, complete_structured};

/// Loosely-typed shape the oracle answers with; `filePath` may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawError {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    line_number: Option<u32>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    code_with_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    errors: Vec<RawError>,
}

pub struct ErrorParser {
    oracle: Arc<dyn ReasoningOracle>,
    root: PathBuf,
    model_hint: Option<String>,
}

impl ErrorParser {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, root: impl Into<PathBuf>) -> Self {
        Self {
            oracle,
            root: root.into(),
            model_hint: None,
        }
    }

    pub fn with_model_hint(mut self, model: Option<String>) -> Self {
        self.model_hint = model;
        self
    }

    /// Never fails: any oracle problem yields an empty list, which callers
    /// read as "no errors".
    pub async fn parse_build_errors(&self, raw_output: &str) -> Vec<ErrorRecord> {
        let schema = prompts::parse_schema();
        let prompt = prompts::parse_prompt(raw_output);
        let mut request = StructuredRequest::new(&prompt, prompts::PARSE_SYSTEM_PROMPT, &schema);
        if let Some(model) = self.model_hint.as_deref() {
            request = request.with_model_hint(model);
        }

        let response: ParseResponse =
            match complete_structured(self.oracle.as_ref(), &request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Error extraction failed; treating output as error-free");
                    return Vec::new();
                }
            };

        let records: Vec<ErrorRecord> = response
            .errors
            .into_iter()
            .filter_map(|raw| self.to_record(raw))
            .collect();
        debug!(count = records.len(), "Parsed build errors");
        records
    }

    fn to_record(&self, raw: RawError) -> Option<ErrorRecord> {
        let file_path = raw.file_path.filter(|p| !p.trim().is_empty())?;
        let Some(relative) = canonicalize_under_root(&file_path, &self.root) else {
            debug!(path = %file_path, "Dropping error outside the project root");
            return None;
        };
        if relative.is_empty() {
            return None;
        }
        Some(ErrorRecord {
            file_path: relative,
            line_number: raw.line_number.unwrap_or(0),
            error_type: raw.error_type.unwrap_or_else(|| "error".to_string()),
            error_message: raw.error_message.unwrap_or_default(),
            code_with_error: raw.code_with_error.filter(|c| !c.is_empty()),
        })
    }
}
