//! Core data models used throughout docsift.
//!
//! These types describe the files that enter the ingestion pipeline, the
//! documents it stores, and the per-file outcomes it reports.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::extract::FileFormat;

/// A file queued for ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path-like identifier, unique within a corpus.
    pub key: String,
    pub bytes: Arc<[u8]>,
    /// Declared size in bytes, used for size limits.
    pub size: u64,
    /// 0 for files handed to the pipeline, parent depth + 1 for attachments.
    pub depth: usize,
    /// Key of the message this file was attached to.
    pub parent: Option<String>,
}

impl SourceFile {
    pub fn new(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            key: key.into(),
            size: bytes.len() as u64,
            bytes: Arc::from(bytes),
            depth: 0,
            parent: None,
        }
    }

    /// Overrides the declared size (e.g. from filesystem metadata).
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Lower-cased extension: the final `.ext` of 1-5 word characters.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.key)
    }

    pub fn base_name(&self) -> &str {
        base_name(&self.key)
    }
}

/// Final path segment of a key, splitting on `/` and `\`.
pub fn base_name(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}

/// Lower-cased extension of a file name, if it has a 1-5 word-character suffix.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if (1..=5).contains(&ext.len()) && ext.chars().all(word) {
        Some(ext.to_lowercase())
    } else {
        None
    }
}

/// Why a file was not indexed even though nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedExtension,
    OverSizeLimit,
    Duplicate,
    /// A PDF without a text layer; it would need OCR.
    NoTextContent,
    /// Attachment nesting or batch size cap reached.
    ExpansionLimit,
    Cancelled,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::UnsupportedExtension => "Unsupported Extension",
            SkipReason::OverSizeLimit => "Over Size Limit",
            SkipReason::Duplicate => "Duplicate",
            SkipReason::NoTextContent => "No Text Content",
            SkipReason::ExpansionLimit => "Expansion Limit",
            SkipReason::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why extraction of a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PortfolioUnsupported,
    ExtractionFailure,
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed { kind: FailureKind, detail: String },
    Skipped { reason: SkipReason },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Outcome::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("ok"),
            Outcome::Failed { detail, .. } => write!(f, "failed: {}", detail),
            Outcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// A file's extracted text as held by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub key: String,
    /// Normalized text; empty unless the outcome is a success.
    #[serde(skip)]
    pub text: String,
    pub format: Option<FileFormat>,
    pub extension: Option<String>,
    pub outcome: Outcome,
    pub content_hash: String,
}

impl Document {
    pub fn new(
        key: String,
        text: String,
        format: Option<FileFormat>,
        extension: Option<String>,
        outcome: Outcome,
    ) -> Self {
        let content_hash = content_hash(&text);
        Self {
            key,
            text,
            format,
            extension,
            outcome,
            content_hash,
        }
    }
}

pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Report entry for one processed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub key: String,
    pub extension: Option<String>,
    pub depth: usize,
    /// Key of the message an attachment came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of one ingest call; outcomes are in completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped { .. }))
    }

    pub fn outcome_of(&self, key: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.key == key)
            .map(|o| &o.outcome)
    }
}

/// One emitted search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub key: String,
    /// Byte offset of the match in the document text.
    pub match_index: usize,
    pub match_end: usize,
    pub snippet_start: usize,
    pub snippet_end: usize,
    pub pattern: String,
    /// Opaque identifier for addressing the match in rendered output.
    pub match_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_rules() {
        assert_eq!(file_extension("Report.DOCX").as_deref(), Some("docx"));
        assert_eq!(file_extension("dir/archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("notes.markdown"), None);
        assert_eq!(file_extension("Makefile"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension("weird.ht-ml"), None);
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name(r"C:\docs\memo.docx"), "memo.docx");
        assert_eq!(base_name("plain.txt"), "plain.txt");
        assert_eq!(base_name("mail.msg/attached.pdf"), "attached.pdf");
    }

    #[test]
    fn skip_labels_are_human_readable() {
        assert_eq!(SkipReason::OverSizeLimit.to_string(), "Over Size Limit");
        assert_eq!(
            Outcome::Skipped {
                reason: SkipReason::Duplicate
            }
            .to_string(),
            "skipped: Duplicate"
        );
    }

    #[test]
    fn report_filters_by_outcome() {
        let report = IngestReport {
            outcomes: vec![
                FileOutcome {
                    key: "a.txt".into(),
                    extension: Some("txt".into()),
                    depth: 0,
                    parent: None,
                    outcome: Outcome::Success,
                },
                FileOutcome {
                    key: "b.bin".into(),
                    extension: Some("bin".into()),
                    depth: 0,
                    parent: None,
                    outcome: Outcome::Skipped {
                        reason: SkipReason::UnsupportedExtension,
                    },
                },
            ],
        };
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.failed().count(), 0);
        assert_eq!(report.outcome_of("a.txt"), Some(&Outcome::Success));
    }
}
