//! Error types for the edgequake-pdfconvert library.
//!
//! Every public entry point returns `Result<_, ConvertError>`. A conversion
//! request either produces its complete output or fails with exactly one
//! `ConvertError`; there is no partial result and no automatic retry.
//!
//! [`ErrorCategory`] groups the variants into the handful of failure classes
//! a caller actually branches on (show "upload a file first", show "this PDF
//! is broken", stay silent on cancellation, …). The web server maps it to an
//! HTTP status code.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdfconvert library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A conversion was requested but nothing has been uploaded.
    #[error("No file uploaded. Please upload a PDF file first.")]
    NoInput,

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Uploaded payload exceeds the configured limit.
    #[error("File too large: {size} bytes (max {max} bytes)")]
    UploadTooLarge { size: usize, max: usize },

    /// The bytes were read, but they are not a PDF.
    #[error("'{origin}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { origin: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt or unsupported: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// The upload was withdrawn while text extraction was running.
    #[error("File upload canceled during conversion (after {completed_pages}/{total_pages} pages)")]
    Cancelled {
        completed_pages: usize,
        total_pages: usize,
    },

    // ── Structural conversion errors ─────────────────────────────────────
    /// The external PDF → DOCX converter reported a failure.
    #[error("PDF to Word conversion failed ({converter}): {detail}")]
    ConversionFailed { converter: String, detail: String },

    /// The converter program could not be started.
    #[error("Converter program '{program}' not found.\nInstall it (e.g. `pip install pdf2docx`) or set --converter.")]
    ConverterNotFound { program: String },

    /// The converter did not finish within the configured timeout.
    #[error("Converter '{converter}' timed out after {secs}s")]
    ConverterTimeout { converter: String, secs: u64 },

    // ── Package errors ────────────────────────────────────────────────────
    /// The DOCX package is not a readable ZIP/OPC container.
    #[error("Malformed Word package: {detail}")]
    PackageFailed { detail: String },

    /// An embedded image could not be decoded or re-encoded.
    #[error("Image '{part}' could not be recompressed: {detail}")]
    ImageFailed { part: String, detail: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// A conversion for this session is already running.
    #[error("A conversion is already in progress for this upload")]
    Busy,

    /// The upload was replaced or withdrawn before the result arrived.
    #[error("The uploaded file changed during conversion; the result was discarded")]
    Superseded,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the pdfconvert executable.\n\
  • Install pdfium system-wide (pre-built: github.com/bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure classes of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Nothing to convert.
    NoInput,
    /// Bad path, URL, size or session misuse.
    Input,
    /// The PDF could not be parsed.
    Parse,
    /// The structural converter failed.
    Conversion,
    /// The upload was withdrawn mid-request.
    Cancellation,
    /// The DOCX package or one of its images is malformed.
    Package,
    /// Environment / configuration / bug.
    Internal,
}

impl ConvertError {
    /// The failure class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConvertError::NoInput => ErrorCategory::NoInput,
            ConvertError::FileNotFound { .. }
            | ConvertError::PermissionDenied { .. }
            | ConvertError::InvalidInput { .. }
            | ConvertError::DownloadFailed { .. }
            | ConvertError::DownloadTimeout { .. }
            | ConvertError::UploadTooLarge { .. }
            | ConvertError::Busy => ErrorCategory::Input,
            ConvertError::NotAPdf { .. }
            | ConvertError::CorruptPdf { .. }
            | ConvertError::PasswordRequired
            | ConvertError::WrongPassword => ErrorCategory::Parse,
            ConvertError::ConversionFailed { .. }
            | ConvertError::ConverterNotFound { .. }
            | ConvertError::ConverterTimeout { .. } => ErrorCategory::Conversion,
            ConvertError::Cancelled { .. } | ConvertError::Superseded => {
                ErrorCategory::Cancellation
            }
            ConvertError::PackageFailed { .. } | ConvertError::ImageFailed { .. } => {
                ErrorCategory::Package
            }
            ConvertError::OutputWriteFailed { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::PdfiumBindingFailed(_)
            | ConvertError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::NoInput => "no_input",
            ConvertError::FileNotFound { .. } => "file_not_found",
            ConvertError::PermissionDenied { .. } => "permission_denied",
            ConvertError::InvalidInput { .. } => "invalid_input",
            ConvertError::DownloadFailed { .. } => "download_failed",
            ConvertError::DownloadTimeout { .. } => "download_timeout",
            ConvertError::UploadTooLarge { .. } => "upload_too_large",
            ConvertError::NotAPdf { .. } => "not_a_pdf",
            ConvertError::CorruptPdf { .. } => "corrupt_pdf",
            ConvertError::PasswordRequired => "password_required",
            ConvertError::WrongPassword => "wrong_password",
            ConvertError::Cancelled { .. } => "cancelled",
            ConvertError::ConversionFailed { .. } => "conversion_failed",
            ConvertError::ConverterNotFound { .. } => "converter_not_found",
            ConvertError::ConverterTimeout { .. } => "converter_timeout",
            ConvertError::PackageFailed { .. } => "package_failed",
            ConvertError::ImageFailed { .. } => "image_failed",
            ConvertError::Busy => "busy",
            ConvertError::Superseded => "superseded",
            ConvertError::OutputWriteFailed { .. } => "output_write_failed",
            ConvertError::InvalidConfig(_) => "invalid_config",
            ConvertError::PdfiumBindingFailed(_) => "pdfium_binding_failed",
            ConvertError::Internal(_) => "internal_error",
        }
    }

    /// First line of the message, for one-line UI display.
    pub fn one_line(&self) -> String {
        let msg = self.to_string();
        msg.lines().next().unwrap_or_default().to_string()
    }
}

impl From<zip::result::ZipError> for ConvertError {
    fn from(e: zip::result::ZipError) -> Self {
        ConvertError::PackageFailed {
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_input_message_matches_ui_text() {
        let e = ConvertError::NoInput;
        assert_eq!(
            e.to_string(),
            "No file uploaded. Please upload a PDF file first."
        );
        assert_eq!(e.category(), ErrorCategory::NoInput);
    }

    #[test]
    fn cancelled_display() {
        let e = ConvertError::Cancelled {
            completed_pages: 2,
            total_pages: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("canceled"), "got: {msg}");
        assert!(msg.contains("2/5"), "got: {msg}");
        assert_eq!(e.category(), ErrorCategory::Cancellation);
    }

    #[test]
    fn conversion_failure_display() {
        let e = ConvertError::ConversionFailed {
            converter: "pdf2docx".into(),
            detail: "exit status 1".into(),
        };
        assert!(e.to_string().contains("pdf2docx"));
        assert!(e.to_string().contains("exit status 1"));
        assert_eq!(e.category(), ErrorCategory::Conversion);
    }

    #[test]
    fn one_line_drops_hints() {
        let e = ConvertError::PdfiumBindingFailed("no such file".into());
        let line = e.one_line();
        assert!(line.contains("no such file"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn zip_error_becomes_package_failure() {
        let e: ConvertError = zip::result::ZipError::InvalidArchive("bad".into()).into();
        assert_eq!(e.category(), ErrorCategory::Package);
        assert_eq!(e.code(), "package_failed");
    }

    #[test]
    fn codes_are_snake_case() {
        let errors = [
            ConvertError::Busy,
            ConvertError::WrongPassword,
            ConvertError::Internal("x".into()),
        ];
        for e in errors {
            assert!(e.code().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
