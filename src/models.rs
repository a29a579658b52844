//! Core data models shared by the extraction pipeline, the corpus store and
//! the session state machine.
//!
//! Uploaded documents flow in as [`UploadedDocument`], leave the extractors as
//! [`ExtractionResult`], and are recorded as [`ProcessedFileRecord`]s. Chat
//! state is a list of [`Message`]s grouped into [`Conversation`]s.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Display format for timestamps shown to the user.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of characters shown in a record preview.
const PREVIEW_CHARS: usize = 500;

/// Document formats accepted at the ingestion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Txt,
}

impl DocumentFormat {
    /// Infers the format from a filename suffix. Matching is case-sensitive,
    /// so `report.PDF` is not accepted.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if filename.ends_with(".docx") {
            Some(Self::Docx)
        } else if filename.ends_with(".xlsx") {
            Some(Self::Xlsx)
        } else if filename.ends_with(".txt") {
            Some(Self::Txt)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Txt => "txt",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Returned when a filename does not carry one of the accepted suffixes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported file type: {filename} (expected .pdf, .docx, .xlsx or .txt)")]
pub struct UnsupportedFormat {
    pub filename: String,
}

/// A raw upload: bytes plus the name they arrived under.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    filename: String,
    bytes: Vec<u8>,
    format: DocumentFormat,
}

impl UploadedDocument {
    pub fn new(
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, UnsupportedFormat> {
        let filename = filename.into();
        let format = DocumentFormat::from_filename(&filename)
            .ok_or_else(|| UnsupportedFormat {
                filename: filename.clone(),
            })?;
        Ok(Self {
            filename,
            bytes: bytes.into(),
            format,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

/// Outcome of extracting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Ok,
    /// Some sub-units (spreadsheet sheets) failed; the text holds the rest
    /// plus inline failure markers.
    PartialFailure(String),
    Failure(String),
}

impl ExtractionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::PartialFailure(_) => "partial",
            Self::Failure(_) => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::PartialFailure(r) | Self::Failure(r) => Some(r),
        }
    }
}

/// Text extracted from one uploaded document. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub source_name: String,
    pub text: String,
    pub byte_length: usize,
    pub extracted_at: DateTime<Local>,
    pub status: ExtractionStatus,
}

impl ExtractionResult {
    pub fn new(source_name: impl Into<String>, text: String, status: ExtractionStatus) -> Self {
        Self {
            source_name: source_name.into(),
            byte_length: text.len(),
            text,
            extracted_at: Local::now(),
            status,
        }
    }

    pub fn ok(source_name: impl Into<String>, text: String) -> Self {
        Self::new(source_name, text, ExtractionStatus::Ok)
    }

    /// A failed extraction. The text carries a readable failure line so the
    /// failure stays visible next to the successfully processed files.
    pub fn failure(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let source_name = source_name.into();
        let reason = reason.into();
        let text = format!("[Error processing {}: {}]", source_name, reason);
        Self::new(source_name, text, ExtractionStatus::Failure(reason))
    }
}

/// An ingested document as kept by the corpus store.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFileRecord {
    pub result: ExtractionResult,
    /// 1-based position in ingestion order.
    pub display_index: usize,
}

impl ProcessedFileRecord {
    pub fn name(&self) -> &str {
        &self.result.source_name
    }

    pub fn text(&self) -> &str {
        &self.result.text
    }

    /// First 500 characters of the text, with `...` appended when cut.
    pub fn preview(&self) -> String {
        let text = &self.result.text;
        match text.char_indices().nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.clone(),
        }
    }

    pub fn processed_at(&self) -> String {
        self.result.extracted_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One chat turn. Immutable once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Set on a conversation once it has been snapshotted into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveMeta {
    pub title: String,
    pub archived_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub archive: Option<ArchiveMeta>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            archive: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_suffix_is_case_sensitive() {
        assert_eq!(
            DocumentFormat::from_filename("a.pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("b.docx"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            DocumentFormat::from_filename("c.xlsx"),
            Some(DocumentFormat::Xlsx)
        );
        assert_eq!(
            DocumentFormat::from_filename("d.txt"),
            Some(DocumentFormat::Txt)
        );
        assert_eq!(DocumentFormat::from_filename("e.PDF"), None);
        assert_eq!(DocumentFormat::from_filename("f.xls"), None);
        assert_eq!(DocumentFormat::from_filename("pdf"), None);
    }

    #[test]
    fn upload_with_unknown_suffix_is_rejected() {
        let err = UploadedDocument::new("notes.md", b"# hi".to_vec()).unwrap_err();
        assert_eq!(err.filename, "notes.md");
    }

    #[test]
    fn failure_result_carries_readable_text() {
        let r = ExtractionResult::failure("x.pdf", "bad xref");
        assert_eq!(r.text, "[Error processing x.pdf: bad xref]");
        assert_eq!(r.byte_length, r.text.len());
        assert_eq!(r.status, ExtractionStatus::Failure("bad xref".into()));
    }

    #[test]
    fn preview_cuts_at_500_chars() {
        let long = "é".repeat(600);
        let record = ProcessedFileRecord {
            result: ExtractionResult::ok("a.txt", long),
            display_index: 1,
        };
        let preview = record.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 503);

        let short = ProcessedFileRecord {
            result: ExtractionResult::ok("b.txt", "short".into()),
            display_index: 2,
        };
        assert_eq!(short.preview(), "short");
    }
}
