//! # edgequake-pdfconvert
//!
//! Convert PDF documents to an editable Word document, a plain-text file, or
//! text shown on screen.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ Word Document
//!  │    ├─ 1. Convert   external structural converter (pdf2docx), scoped temp dir
//!  │    └─ 2. Optimize  every embedded image → flattened JPEG (quality 50, black bg)
//!  │
//!  ├─ Text File / Extracted Text
//!  │    └─ 1. Extract   pdfium text layer, page by page (spawn_blocking, cancellable)
//!  │
//!  └─ Output  one-shot download (.docx / .txt) or inline text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfconvert::{convert, ConversionConfig, Delivery, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("document.pdf", OutputFormat::WordDocument, &config).await?;
//!     if let Delivery::Download(artifact) = output.delivery {
//!         std::fs::write(&artifact.filename, &artifact.bytes)?;
//!     }
//!     eprintln!("{} images recompressed", output.stats.images_optimized);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdfconvert` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the axum web form behind `pdfconvert serve` |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-pdfconvert = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! Text extraction needs the pdfium shared library (see
//! [`pipeline::engine`]); Word conversion needs the converter program
//! (`pip install pdf2docx` for the default [`CommandConverter`]).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageOptions, Rgb};
pub use convert::{
    convert, convert_document, convert_from_bytes, convert_sync, convert_to_file, inspect,
    optimize_file, pdf_to_text, pdf_to_word, run_request,
};
pub use error::{ConvertError, ErrorCategory};
pub use output::{
    Artifact, ConversionOutput, ConversionStats, Delivery, DocumentMetadata, OutputFormat,
    PageText,
};
pub use pipeline::docx::{CommandConverter, DocxConverter};
pub use pipeline::input::SourceDocument;
pub use pipeline::optimize::{optimize_docx, OptimizeReport};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use session::{BeginOutcome, ConversionRequest, Session, SessionState, SessionStore};
pub use stream::{extract_pages_stream, stream_pages, PageStream};
pub use tokio_util::sync::CancellationToken;
