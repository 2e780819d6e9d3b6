//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts pages and recompresses images.
//!
//! Callbacks are invoked from the blocking worker thread that runs the stage,
//! so implementations must be `Send + Sync` and cheap.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfconvert::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PageCounter {
//!     fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} ({} chars)", page_num, total_pages, chars);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage announced through [`ConversionProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractingText,
    ConvertingToWord,
    OptimizingImages,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ExtractingText => "Extracting text from PDF",
            Stage::ConvertingToWord => "Converting PDF to Word document",
            Stage::OptimizingImages => "Optimizing embedded images",
            Stage::Done => "Done",
        };
        f.write_str(s)
    }
}

/// Called by the conversion pipeline as it makes progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the PDF is open and its page count is known.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when the pipeline enters a new stage.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after the text of one page was extracted.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: pages in the document
    /// * `chars`: characters extracted from this page
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// Called after one embedded image was recompressed.
    ///
    /// # Arguments
    /// * `part`: package part name, e.g. `word/media/image1.png`
    /// * `bytes_before`: original payload size
    /// * `bytes_after`: JPEG payload size
    fn on_image_optimized(&self, part: &str, bytes_before: usize, bytes_after: usize) {
        let _ = (part, bytes_before, bytes_after);
    }

    /// Called once after the request finished successfully.
    fn on_conversion_complete(&self, output_bytes: usize) {
        let _ = output_bytes;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
