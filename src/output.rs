//! Output types: formats, downloadable artifacts and conversion results.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;

/// MIME type of a Word (OOXML) document.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// MIME type of the plain-text download.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// What the user asked the PDF to be turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Structural conversion to `.docx` (with image optimization).
    #[serde(alias = "word", alias = "docx")]
    WordDocument,
    /// Extracted text offered as a `.txt` download.
    #[serde(alias = "text", alias = "txt")]
    TextFile,
    /// Extracted text shown inline.
    #[serde(alias = "extracted", alias = "show")]
    ExtractedText,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::WordDocument,
        OutputFormat::TextFile,
        OutputFormat::ExtractedText,
    ];

    /// Name shown in the format selector.
    pub fn display_name(self) -> &'static str {
        match self {
            OutputFormat::WordDocument => "Word Document",
            OutputFormat::TextFile => "Text File",
            OutputFormat::ExtractedText => "Extracted Text",
        }
    }

    /// Short identifier used on the command line and in the API.
    pub fn key(self) -> &'static str {
        match self {
            OutputFormat::WordDocument => "word",
            OutputFormat::TextFile => "text",
            OutputFormat::ExtractedText => "extracted",
        }
    }

    /// Download filename, `None` for inline output.
    pub fn filename(self) -> Option<&'static str> {
        match self {
            OutputFormat::WordDocument => Some("converted_document.docx"),
            OutputFormat::TextFile => Some("extracted_text.txt"),
            OutputFormat::ExtractedText => None,
        }
    }

    /// Content type of the download, `None` for inline output.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            OutputFormat::WordDocument => Some(DOCX_CONTENT_TYPE),
            OutputFormat::TextFile => Some(TEXT_CONTENT_TYPE),
            OutputFormat::ExtractedText => None,
        }
    }

    /// Whether this format needs text extraction (as opposed to structural conversion).
    pub fn is_text(self) -> bool {
        !matches!(self, OutputFormat::WordDocument)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word" | "docx" | "word document" | "word_document" => Ok(OutputFormat::WordDocument),
            "text" | "txt" | "text file" | "text_file" => Ok(OutputFormat::TextFile),
            "extracted" | "show" | "extracted text" | "extracted_text" => {
                Ok(OutputFormat::ExtractedText)
            }
            other => Err(ConvertError::InvalidConfig(format!(
                "Unknown output format '{other}' (expected word, text or extracted)"
            ))),
        }
    }
}

/// A downloadable result: bytes plus everything a browser needs to save them.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Button label, e.g. "Download Word Document".
    pub label: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Artifact {
    /// Attach the label / filename / content type for `format` to `bytes`.
    ///
    /// Returns `None` for [`OutputFormat::ExtractedText`], which is never a download.
    pub fn for_format(format: OutputFormat, bytes: Bytes) -> Option<Self> {
        Some(Self {
            label: format!("Download {}", format.display_name()),
            filename: format.filename()?.to_string(),
            content_type: format.content_type()?.to_string(),
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How the result reaches the user.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// One-shot file download.
    Download(Artifact),
    /// Text shown on screen.
    Inline { title: String, text: String },
}

impl Delivery {
    /// Byte size of the delivered payload.
    pub fn len(&self) -> usize {
        match self {
            Delivery::Download(a) => a.len(),
            Delivery::Inline { text, .. } => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a successful conversion request.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub format: OutputFormat,
    pub delivery: Delivery,
    pub stats: ConversionStats,
}

/// Numbers describing one conversion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source PDF (text formats only).
    pub page_count: Option<usize>,
    /// Size of the uploaded PDF.
    pub input_bytes: usize,
    /// Size of the delivered payload.
    pub output_bytes: usize,
    /// Images recompressed by the optimizer.
    pub images_optimized: usize,
    /// Image parts left untouched because their format cannot be decoded.
    pub images_skipped: usize,
    pub total_duration_ms: u64,
    /// Time spent in the external converter.
    pub conversion_duration_ms: u64,
    /// Time spent recompressing images.
    pub optimize_duration_ms: u64,
}

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub total_pages: usize,
    pub text: String,
}

/// PDF metadata, available without converting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_artifact_metadata() {
        let a = Artifact::for_format(OutputFormat::WordDocument, Bytes::from_static(b"PK"))
            .expect("word is a download");
        assert_eq!(a.filename, "converted_document.docx");
        assert_eq!(a.content_type, DOCX_CONTENT_TYPE);
        assert_eq!(a.label, "Download Word Document");
    }

    #[test]
    fn text_artifact_metadata() {
        let a = Artifact::for_format(OutputFormat::TextFile, Bytes::from_static(b"Hello"))
            .expect("text is a download");
        assert_eq!(a.filename, "extracted_text.txt");
        assert!(a.content_type.starts_with("text/plain"));
        assert_eq!(a.label, "Download Text File");
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn extracted_text_is_never_an_artifact() {
        assert!(Artifact::for_format(OutputFormat::ExtractedText, Bytes::new()).is_none());
        assert!(OutputFormat::ExtractedText.filename().is_none());
    }

    #[test]
    fn format_parsing_accepts_keys_and_display_names() {
        for f in OutputFormat::ALL {
            assert_eq!(f.key().parse::<OutputFormat>().unwrap(), f);
            assert_eq!(f.display_name().parse::<OutputFormat>().unwrap(), f);
        }
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn format_deserializes_from_short_keys() {
        let f: OutputFormat = serde_json::from_str("\"word\"").unwrap();
        assert_eq!(f, OutputFormat::WordDocument);
        let f: OutputFormat = serde_json::from_str("\"extracted_text\"").unwrap();
        assert_eq!(f, OutputFormat::ExtractedText);
    }
}
