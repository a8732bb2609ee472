//! The reasoning oracle: an opaque text / structured completion capability.
//!
//! Everything the pipeline cannot decide mechanically (what the errors are,
//! which packages are missing, how to fix a file) is delegated here. The
//! trait stays deliberately narrow so the backend is swappable.

pub mod claude;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::OracleError;
use crate::retry::{RetryPolicy, with_retry};

pub use claude::ClaudeCliOracle;

/// Parameters for a schema-validated completion.
#[derive(Debug, Clone)]
pub struct StructuredRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: &'a str,
    /// JSON schema the reply must satisfy.
    pub schema: &'a Value,
    pub temperature: f32,
    /// Extra attempts on a malformed reply.
    pub retries: u32,
    pub model_hint: Option<&'a str>,
}

impl<'a> StructuredRequest<'a> {
    pub fn new(prompt: &'a str, system_prompt: &'a str, schema: &'a Value) -> Self {
        Self {
            prompt,
            system_prompt,
            schema,
            temperature: 0.0,
            retries: 2,
            model_hint: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_model_hint(mut self, model: &'a str) -> Self {
        self.model_hint = Some(model);
        self
    }
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Free-text completion. `Ok(None)` means the oracle had nothing to say.
    async fn complete_text(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<Option<String>, OracleError>;

    /// One attempt at a JSON completion conforming to `request.schema`.
    async fn complete_json(&self, request: &StructuredRequest<'_>) -> Result<Value, OracleError>;
}

/// Schema-validated completion deserialized into `T`.
///
/// Malformed replies (bad JSON, missing required keys, wrong shape) are
/// retried `request.retries` more times before giving up.
pub async fn complete_structured<T: DeserializeOwned>(
    oracle: &dyn ReasoningOracle,
    request: &StructuredRequest<'_>,
) -> Result<T, OracleError> {
    let policy = RetryPolicy::immediate(request.retries + 1);

    with_retry(&policy, move |attempt| async move {
        debug!(attempt, "Requesting structured completion");
        let value = oracle.complete_json(request).await?;
        check_required_keys(&value, request.schema)?;
        serde_json::from_value::<T>(value).map_err(|e| OracleError::Malformed {
            reason: e.to_string(),
        })
    })
    .await
    .map_err(|exhausted| exhausted.last)
}

/// Verify that `value` is an object carrying every key the schema marks required.
pub fn check_required_keys(value: &Value, schema: &Value) -> Result<(), OracleError> {
    let Some(object) = value.as_object() else {
        return Err(OracleError::Malformed {
            reason: "expected a JSON object".to_string(),
        });
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);

    for key in required {
        if !object.contains_key(key) {
            return Err(OracleError::Malformed {
                reason: format!("missing required key '{}'", key),
            });
        }
    }
    Ok(())
}
