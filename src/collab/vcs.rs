//! Committing and pushing applied fixes.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use git2::{BranchType, IndexAddOption, Repository, Signature};
use tracing::{debug, info};

use crate::model::AuthContext;

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Commit the whole working tree to `branch` and push it.
    /// Returns the new commit hash once the change is durable.
    async fn commit_and_push(&self, branch: &str, message: &str, auth: &AuthContext)
    -> Result<String>;
}

/// `git2` for the commit, the `git` CLI for the push.
#[derive(Debug, Clone)]
pub struct GitVersionControl {
    repo_dir: PathBuf,
    remote: String,
    push: bool,
    author_name: String,
    author_email: String,
}

impl GitVersionControl {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: "origin".to_string(),
            push: true,
            author_name: "mend".to_string(),
            author_email: "mend@localhost".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    async fn push_branch(&self, branch: &str, auth: &AuthContext) -> Result<()> {
        let mut cmd = tokio::process::Command::new("git");
        if let Some(token) = &auth.token {
            cmd.arg("-c")
                .arg(format!("http.extraheader=AUTHORIZATION: bearer {}", token));
        }
        let output = cmd
            .args(["push", "-u", &self.remote, branch])
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(&self.repo_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run git push")?;

        if !output.status.success() {
            bail!(
                "Failed to push branch {}: {}",
                branch,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl VersionControl for GitVersionControl {
    async fn commit_and_push(
        &self,
        branch: &str,
        message: &str,
        auth: &AuthContext,
    ) -> Result<String> {
        let repo_dir = self.repo_dir.clone();
        let branch_owned = branch.to_string();
        let message = message.to_string();
        let name = self.author_name.clone();
        let email = self.author_email.clone();

        let commit = tokio::task::spawn_blocking(move || {
            commit_all(&repo_dir, &branch_owned, &message, &name, &email)
        })
        .await
        .context("Commit task panicked")??;

        debug!(branch, commit = %commit, "Committed working tree");

        if self.push {
            self.push_branch(branch, auth).await?;
            info!(branch, remote = %self.remote, "Pushed fix");
        }
        Ok(commit)
    }
}

/// Point HEAD at `branch`, creating it at the current commit if needed.
/// The working tree and index are left untouched.
fn switch_to_branch(repo: &Repository, branch: &str) -> Result<()> {
    if repo.find_branch(branch, BranchType::Local).is_err()
        && let Some(head) = head_commit(repo)
    {
        repo.branch(branch, &head, false)
            .with_context(|| format!("Failed to create branch {}", branch))?;
    }
    repo.set_head(&format!("refs/heads/{}", branch))
        .with_context(|| format!("Failed to switch HEAD to {}", branch))?;
    Ok(())
}

fn head_commit(repo: &Repository) -> Option<git2::Commit<'_>> {
    repo.head().ok().and_then(|head| head.peel_to_commit().ok())
}

/// Stage everything and commit on `branch`. Returns the commit id.
pub fn commit_all(
    repo_dir: &Path,
    branch: &str,
    message: &str,
    author_name: &str,
    author_email: &str,
) -> Result<String> {
    let repo = Repository::open(repo_dir).context("Failed to open git repository")?;
    switch_to_branch(&repo, branch)?;

    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now(author_name, author_email)?;

    // Unborn branch: first commit has no parent.
    let parents: Vec<git2::Commit<'_>> = head_commit(&repo).into_iter().collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

    let commit_id = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .context("Failed to create commit")?;
    Ok(commit_id.to_string())
}
