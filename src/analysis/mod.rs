//! Uploaded dataset handling.
//!
//! The upload endpoint validates the file type and hands the bytes to a
//! [`DatasetAnalyzer`]. Heavy lifting (spreadsheet decoding, statistics,
//! charts) belongs to external analyzers plugged in behind the trait; the
//! built-in [`PreviewAnalyzer`] only reports the shape and columns of CSV and
//! JSON records.

mod preview;

pub use preview::PreviewAnalyzer;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

/// Number of characters of a text upload echoed back to the client.
pub const TEXT_PREVIEW_CHARS: usize = 1000;

/// Upload types the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Text,
    Json,
}

impl FileKind {
    /// Classify a file by its extension, case-insensitively.
    ///
    /// ```rust
    /// use mode_chat::analysis::FileKind;
    ///
    /// assert_eq!(FileKind::from_filename("Sales.CSV"), Some(FileKind::Csv));
    /// assert_eq!(FileKind::from_filename("report.pdf"), None);
    /// ```
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// MIME type reported for this kind.
    #[must_use]
    pub fn mime_type(self) -> String {
        let ext = match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Text => "txt",
            Self::Json => "json",
        };
        mime_guess::from_ext(ext).first_or_octet_stream().to_string()
    }
}

/// Structural summary of a tabular upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    /// `[rows, columns]`.
    pub shape: [usize; 2],
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    /// Per column, how many rows have no value.
    pub missing_values: BTreeMap<String, usize>,
}

/// Errors that can occur while analyzing an upload.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The analyzer cannot handle this kind of file.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The bytes are not valid UTF-8 text.
    #[error("File is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The CSV payload does not parse.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The JSON payload does not parse.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The content parsed but has no usable structure.
    #[error("Malformed data: {0}")]
    Malformed(String),
}

/// Turns an uploaded tabular file into a [`DatasetSummary`].
#[async_trait]
pub trait DatasetAnalyzer: Send + Sync + std::fmt::Debug {
    /// Analyze `data`, which has already been classified as `kind`.
    async fn analyze(&self, kind: FileKind, data: &[u8]) -> Result<DatasetSummary, AnalysisError>;

    /// Get the analyzer name for logging.
    fn name(&self) -> &'static str;
}

/// First [`TEXT_PREVIEW_CHARS`] characters of a text upload, with `...`
/// appended when the upload is longer than that many bytes.
pub fn text_preview(data: &[u8]) -> Result<String, AnalysisError> {
    let text = std::str::from_utf8(data)?;
    if data.len() > TEXT_PREVIEW_CHARS {
        let mut preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
        preview.push_str("...");
        Ok(preview)
    } else {
        Ok(text.to_string())
    }
}
