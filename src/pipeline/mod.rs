//! Pipeline stages for PDF conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and the converter or text engine can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract                        (Text File / Extracted Text)
//!   │       (pdfium)
//!   └─────▶ docx ──▶ optimize ──▶ encode   (Word Document)
//!           (child   (package)    (JPEG)
//!           process)
//! ```
//!
//! 1. [`input`]: validate uploaded bytes, read a path or download a URL
//! 2. [`engine`]: bind the pdfium library
//! 3. [`extract`]: concatenate the text of every page; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`docx`]: run the structural converter in a scoped temp directory
//! 5. [`package`]: read content types and relationships of the DOCX
//! 6. [`optimize`]: swap every image payload for a JPEG
//! 7. [`encode`]: flatten alpha and encode one image

pub mod docx;
pub mod encode;
pub mod engine;
pub mod extract;
pub mod input;
pub mod optimize;
pub mod package;
