//! Turning a candidate patch into a file mutation.
//!
//! Two paths:
//! - **New file**: the patch is a seed description; the oracle writes the
//!   whole file.
//! - **Existing file**: the current file is sent with `N| ` line anchors and
//!   the oracle returns the whole updated file, still anchored. Anchors are
//!   stripped before writing.
//!
//! Any failure (missing file, reply without `<file>` tags, oracle error)
//! is retried through `with_retry`; once the attempts are spent the file
//! is abandoned with `PatchError::Exhausted`.

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::prompts::{self, FILE_TAG};
use crate::collab::FileStore;
use crate::errors::{OracleError, PatchError};
use crate::model::FileDescriptor;
use crate::oracle::ReasoningOracle;
use crate::retry::{RetryPolicy, with_retry};
use crate::util::extract_first_tagged;

static LINE_NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\d+\| ?").unwrap());

/// Prefix every line with its 1-based number as `N| `.
pub fn number_lines(content: &str) -> String {
    content
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{}| {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `N| ` anchors. Lines without an anchor are kept as-is.
pub fn strip_line_numbers(content: &str) -> String {
    content
        .split('\n')
        .map(|line| LINE_NUMBER_PREFIX.replace(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct PatchApplicator {
    oracle: Arc<dyn ReasoningOracle>,
    files: Arc<dyn FileStore>,
    retry: RetryPolicy,
}

impl PatchApplicator {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        files: Arc<dyn FileStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            oracle,
            files,
            retry,
        }
    }

    /// Apply `patch` to `root/file_path`, retrying up to the policy's bound.
    pub async fn apply_code_patch(
        &self,
        root: &Path,
        file_path: &str,
        patch: &str,
        is_new_file: bool,
    ) -> Result<Vec<FileDescriptor>, PatchError> {
        let target = root.join(file_path);

        with_retry(&self.retry, move |attempt| async move {
            debug!(file = file_path, attempt, is_new_file, "Applying patch");
            if is_new_file {
                self.create_file(root, file_path, patch).await
            } else {
                self.rewrite_file(root, file_path, patch).await
            }
        })
        .await
        .map_err(|exhausted| PatchError::Exhausted {
            path: target,
            attempts: exhausted.attempts,
            last: Box::new(exhausted.last),
        })
    }

    async fn ask_for_file(&self, prompt: &str) -> Result<String, PatchError> {
        let reply = self
            .oracle
            .complete_text(prompt, prompts::APPLY_SYSTEM_PROMPT)
            .await?
            .ok_or(PatchError::Oracle(OracleError::EmptyResponse))?;
        extract_first_tagged(&reply, FILE_TAG).ok_or_else(|| PatchError::MissingDelimiter {
            tag: FILE_TAG.to_string(),
        })
    }

    async fn create_file(
        &self,
        root: &Path,
        file_path: &str,
        patch: &str,
    ) -> Result<Vec<FileDescriptor>, PatchError> {
        let target = root.join(file_path);
        let content = self
            .ask_for_file(&prompts::new_file_prompt(file_path, patch))
            .await?;

        if let Some(parent) = target.parent()
            && !self.files.exists(parent).await
        {
            self.files
                .mkdirp(parent)
                .await
                .map_err(|source| PatchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.write(&target, &content).await?;

        info!(file = file_path, bytes = content.len(), "Created file");
        Ok(vec![FileDescriptor {
            path: file_path.to_string(),
            code_block: content,
            is_new: true,
        }])
    }

    async fn rewrite_file(
        &self,
        root: &Path,
        file_path: &str,
        patch: &str,
    ) -> Result<Vec<FileDescriptor>, PatchError> {
        let target = root.join(file_path);
        if !self.files.exists(&target).await {
            return Err(PatchError::MissingFile { path: target });
        }
        let current = self
            .files
            .read(&target)
            .await
            .map_err(|source| PatchError::Io {
                path: target.clone(),
                source,
            })?;

        let numbered = number_lines(&current);
        let reply = self
            .ask_for_file(&prompts::existing_file_prompt(file_path, &numbered, patch))
            .await?;
        let updated = strip_line_numbers(&reply);
        self.write(&target, &updated).await?;

        info!(file = file_path, bytes = updated.len(), "Rewrote file");
        Ok(vec![FileDescriptor {
            path: file_path.to_string(),
            code_block: updated,
            is_new: false,
        }])
    }

    async fn write(&self, target: &Path, content: &str) -> Result<(), PatchError> {
        self.files
            .write(target, content)
            .await
            .map_err(|source| PatchError::Io {
                path: target.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryFileStore;
    use crate::testing::ScriptedOracle;

    fn applicator(
        oracle: ScriptedOracle,
        files: MemoryFileStore,
    ) -> (Arc<ScriptedOracle>, Arc<MemoryFileStore>, PatchApplicator) {
        let oracle = Arc::new(oracle);
        let files = Arc::new(files);
        let applicator =
            PatchApplicator::new(oracle.clone(), files.clone(), RetryPolicy::immediate(3));
        (oracle, files, applicator)
    }

    #[test]
    fn test_number_then_strip_roundtrips() {
        for original in [
            "",
            "one line",
            "a\nb\nc",
            "trailing newline\n",
            "  indented\n\tTabbed\n\n\nblank lines\n",
            "windows\r\nline endings\r\n",
            "42| looks like an anchor",
        ] {
            // Only the leading anchor is removed, so anchor-like content survives.
            let stripped = strip_line_numbers(&number_lines(original));
            assert_eq!(stripped, original, "roundtrip failed for {:?}", original);
        }
    }

    #[test]
    fn test_number_lines_format() {
        assert_eq!(number_lines("a\nb"), "1| a\n2| b");
    }

    #[test]
    fn test_strip_keeps_unanchored_lines() {
        assert_eq!(strip_line_numbers("1| a\nb\n3| c"), "a\nb\nc");
    }

    #[tokio::test]
    async fn test_new_file_writes_exact_tag_content() {
        let body = "export const answer = 42;\n";
        let (_, files, applicator) = applicator(
            ScriptedOracle::new().with_text(format!("Here you go:\n<file>\n{}</file>", body)),
            MemoryFileStore::new(),
        );

        let descriptors = applicator
            .apply_code_patch(Path::new("/repo"), "src/new/answer.ts", "answer module", true)
            .await
            .unwrap();

        let written = files.get(Path::new("/repo/src/new/answer.ts")).unwrap();
        assert_eq!(written, body);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].code_block, written);
        assert!(descriptors[0].is_new);
    }

    #[tokio::test]
    async fn test_existing_file_strips_anchors() {
        let (oracle, files, applicator) = applicator(
            ScriptedOracle::new().with_text("<file>\n1| import { x } from './x';\n2| let y = x;\n</file>"),
            MemoryFileStore::new().with_file("/repo/src/a.ts", "let y = x;\n"),
        );

        let descriptors = applicator
            .apply_code_patch(Path::new("/repo"), "src/a.ts", "+ import x", false)
            .await
            .unwrap();

        let expected = "import { x } from './x';\nlet y = x;\n";
        assert_eq!(files.get(Path::new("/repo/src/a.ts")).unwrap(), expected);
        assert_eq!(descriptors[0].code_block, expected);
        assert!(!descriptors[0].is_new);
        assert!(oracle.prompts()[0].contains("1| let y = x;"));
    }

    #[tokio::test]
    async fn test_missing_delimiter_is_retried() {
        let (oracle, files, applicator) = applicator(
            ScriptedOracle::new()
                .with_text("no tags, sorry")
                .with_text("<file>\n1| fixed\n</file>"),
            MemoryFileStore::new().with_file("/repo/a.ts", "broken\n"),
        );

        applicator
            .apply_code_patch(Path::new("/repo"), "a.ts", "fix", false)
            .await
            .unwrap();
        assert_eq!(files.get(Path::new("/repo/a.ts")).unwrap(), "fixed\n");
        assert_eq!(oracle.text_calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let (oracle, _, applicator) = applicator(
            ScriptedOracle::new()
                .with_text("nope")
                .with_text("nope")
                .with_text("nope")
                .with_text("<file>\nnever reached\n</file>"),
            MemoryFileStore::new().with_file("/repo/a.ts", "broken\n"),
        );

        let err = applicator
            .apply_code_patch(Path::new("/repo"), "a.ts", "fix", false)
            .await
            .unwrap_err();
        match err {
            PatchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, PatchError::MissingDelimiter { .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(oracle.text_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_existing_file_exhausts_without_oracle_calls() {
        let (oracle, _, applicator) = applicator(ScriptedOracle::new(), MemoryFileStore::new());

        let err = applicator
            .apply_code_patch(Path::new("/repo"), "gone.ts", "fix", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PatchError::Exhausted { .. }));
        assert!(!err.is_unrecoverable());
        assert_eq!(oracle.text_calls(), 0);
    }
}
