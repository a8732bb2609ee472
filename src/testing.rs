//! Scripted collaborator doubles for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::collab::{BuildOptions, BuildRunner, DependencyInstaller, InstallOptions, VersionControl};
use crate::errors::{BuildFailure, OracleError};
use crate::model::AuthContext;
use crate::oracle::{ReasoningOracle, StructuredRequest};

/// Oracle that answers from queues and records every prompt it sees.
///
/// An empty text queue answers `Ok(None)`; an empty JSON queue answers
/// `Unavailable`, which is not retried.
#[derive(Default)]
pub struct ScriptedOracle {
    text: Mutex<VecDeque<String>>,
    json: Mutex<VecDeque<Value>>,
    prompts: Mutex<Vec<String>>,
    text_calls: Mutex<usize>,
    json_calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, reply: impl Into<String>) -> Self {
        self.text.lock().unwrap().push_back(reply.into());
        self
    }

    pub fn with_json(self, reply: Value) -> Self {
        self.json.lock().unwrap().push_back(reply);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn text_calls(&self) -> usize {
        *self.text_calls.lock().unwrap()
    }

    pub fn json_calls(&self) -> usize {
        *self.json_calls.lock().unwrap()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete_text(
        &self,
        prompt: &str,
        _system_prompt: &str,
    ) -> Result<Option<String>, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        *self.text_calls.lock().unwrap() += 1;
        Ok(self.text.lock().unwrap().pop_front())
    }

    async fn complete_json(&self, request: &StructuredRequest<'_>) -> Result<Value, OracleError> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        *self.json_calls.lock().unwrap() += 1;
        self.json
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OracleError::Unavailable("script exhausted".to_string()))
    }
}

/// Build runner that replays a queue of outcomes. An empty queue means green.
#[derive(Default)]
pub struct ScriptedBuildRunner {
    outcomes: Mutex<VecDeque<Result<(), String>>>,
    calls: Mutex<Vec<BuildOptions>>,
}

impl ScriptedBuildRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, output: impl Into<String>) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(output.into()));
        self
    }

    pub fn passing(self) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn after_modifications_flags(&self) -> Vec<bool> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.after_modifications)
            .collect()
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn run(&self, options: &BuildOptions) -> Result<(), BuildFailure> {
        self.calls.lock().unwrap().push(options.clone());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Err(output)) => Err(BuildFailure::new(output)),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

/// Installer that records every attempt and fails for configured names.
#[derive(Default)]
pub struct RecordingInstaller {
    failing: Vec<String>,
    installed: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, package: impl Into<String>) -> Self {
        self.failing.push(package.into());
        self
    }

    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }

    pub fn attempts(&self, package: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(package)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DependencyInstaller for RecordingInstaller {
    async fn install(&self, package: &str, _options: &InstallOptions) -> Result<()> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(package.to_string())
            .or_insert(0) += 1;
        if self.failing.iter().any(|p| p == package) {
            bail!("npm ERR! 404 '{}' is not in this registry", package);
        }
        self.installed.lock().unwrap().push(package.to_string());
        Ok(())
    }
}

/// A commit seen by `RecordingVcs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommit {
    pub branch: String,
    pub message: String,
}

/// Version control that records commits and hands out fake hashes.
#[derive(Default)]
pub struct RecordingVcs {
    fail: bool,
    commits: Mutex<Vec<RecordedCommit>>,
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn commit_and_push(
        &self,
        branch: &str,
        message: &str,
        _auth: &AuthContext,
    ) -> Result<String> {
        if self.fail {
            bail!("remote rejected push to {}", branch);
        }
        let mut commits = self.commits.lock().unwrap();
        commits.push(RecordedCommit {
            branch: branch.to_string(),
            message: message.to_string(),
        });
        Ok(format!("{:040x}", commits.len()))
    }
}
