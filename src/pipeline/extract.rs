//! Text extraction: concatenate the text layer of every page via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. `tokio::task::spawn_blocking` moves the work onto the
//! blocking thread pool so Tokio worker threads never stall on a large PDF.
//!
//! ## Cancellation
//!
//! The caller's [`CancellationToken`] is checked before every page. When it
//! fires (the upload was withdrawn or replaced) the loop stops and the typed
//! [`ConvertError::Cancelled`] is returned; the text gathered so far is dropped.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::{DocumentMetadata, PageText};
use crate::pipeline::engine::{bind_pdfium, map_load_error};
use crate::pipeline::input::SourceDocument;
use crate::progress::ProgressCallback;
use pdfium_render::prelude::*;
use std::ops::ControlFlow;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Text of a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Page texts concatenated in page order, no separator.
    pub text: String,
    pub page_count: usize,
}

/// Extract the text of every page, in page order.
pub async fn extract_text(
    source: &SourceDocument,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<ExtractedText, ConvertError> {
    let bytes = source.bytes().clone();
    let password = config.password.clone();
    let library = config.pdfium_library_path.clone();
    let progress = config.progress_callback.clone();
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        extract_text_blocking(
            &bytes,
            password.as_deref(),
            library.as_deref(),
            &cancel,
            progress.as_ref(),
        )
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_text`].
pub fn extract_text_blocking(
    bytes: &[u8],
    password: Option<&str>,
    library: Option<&Path>,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<ExtractedText, ConvertError> {
    let mut text = String::new();
    let page_count = extract_pages_blocking(bytes, password, library, cancel, progress, |page| {
        text.push_str(&page.text);
        ControlFlow::Continue(())
    })?;

    info!("Extracted {} chars from {} pages", text.len(), page_count);
    Ok(ExtractedText { text, page_count })
}

/// Open the PDF and feed each page's text to `on_page`, in page order.
///
/// `on_page` may return [`ControlFlow::Break`] to stop early (the consumer went
/// away); that is not an error. Returns the document's page count.
pub fn extract_pages_blocking(
    bytes: &[u8],
    password: Option<&str>,
    library: Option<&Path>,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
    on_page: impl FnMut(PageText) -> ControlFlow<()>,
) -> Result<usize, ConvertError> {
    // Withdrawn before the document was opened: page count still unknown.
    if cancel.is_cancelled() {
        return Err(ConvertError::Cancelled {
            completed_pages: 0,
            total_pages: 0,
        });
    }

    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| map_load_error(e, password))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if let Some(cb) = progress {
        cb.on_conversion_start(total_pages);
    }

    walk_pages(
        total_pages,
        cancel,
        progress,
        |idx| {
            let page = pages
                .get(idx as u16)
                .map_err(|e| ConvertError::CorruptPdf {
                    detail: format!("page {}: {:?}", idx + 1, e),
                })?;
            let text = page.text().map_err(|e| ConvertError::CorruptPdf {
                detail: format!("page {} text layer: {:?}", idx + 1, e),
            })?;
            Ok(text.all())
        },
        on_page,
    )?;

    Ok(total_pages)
}

/// Drive page extraction: cancellation check, load, report, hand over.
pub(crate) fn walk_pages(
    total_pages: usize,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
    mut load_page: impl FnMut(usize) -> Result<String, ConvertError>,
    mut on_page: impl FnMut(PageText) -> ControlFlow<()>,
) -> Result<(), ConvertError> {
    for idx in 0..total_pages {
        if cancel.is_cancelled() {
            info!("Extraction cancelled before page {}/{}", idx + 1, total_pages);
            return Err(ConvertError::Cancelled {
                completed_pages: idx,
                total_pages,
            });
        }

        let text = load_page(idx)?;
        debug!("Page {}: {} chars", idx + 1, text.chars().count());

        if let Some(cb) = progress {
            cb.on_page_extracted(idx + 1, total_pages, text.chars().count());
        }

        let page = PageText {
            page_num: idx + 1,
            total_pages,
            text,
        };
        if on_page(page).is_break() {
            debug!("Page consumer stopped after page {}", idx + 1);
            break;
        }
    }

    Ok(())
}

/// Extract document metadata without reading page text.
pub async fn extract_metadata(
    source: &SourceDocument,
    config: &ConversionConfig,
) -> Result<DocumentMetadata, ConvertError> {
    let bytes = source.bytes().clone();
    let password = config.password.clone();
    let library = config.pdfium_library_path.clone();

    tokio::task::spawn_blocking(move || {
        extract_metadata_blocking(&bytes, password.as_deref(), library.as_deref())
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Blocking implementation of metadata extraction.
fn extract_metadata_blocking(
    bytes: &[u8],
    password: Option<&str>,
    library: Option<&Path>,
) -> Result<DocumentMetadata, ConvertError> {
    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| map_load_error(e, password))?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_pages(texts: &'static [&'static str]) -> impl FnMut(usize) -> Result<String, ConvertError> {
        move |idx| Ok(texts[idx].to_string())
    }

    #[test]
    fn pages_are_concatenated_in_order_without_separator() {
        let cancel = CancellationToken::new();
        let mut out = String::new();
        walk_pages(3, &cancel, None, fake_pages(&["a", "b", "c"]), |p| {
            out.push_str(&p.text);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn cancellation_between_pages_is_typed() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut seen = Vec::new();

        let err = walk_pages(
            4,
            &cancel,
            None,
            |idx| {
                if idx == 1 {
                    // Upload withdrawn while page 2 is being read.
                    trigger.cancel();
                }
                Ok(format!("p{idx}"))
            },
            |p| {
                seen.push(p.page_num);
                ControlFlow::Continue(())
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::Cancelled {
                completed_pages: 2,
                total_pages: 4
            }
        ));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn cancelled_before_start_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut loads = 0;
        let err = walk_pages(
            2,
            &cancel,
            None,
            |_| {
                loads += 1;
                Ok(String::new())
            },
            |_| ControlFlow::Continue(()),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled { completed_pages: 0, .. }));
        assert_eq!(loads, 0);
    }

    #[test]
    fn consumer_break_stops_without_error() {
        let cancel = CancellationToken::new();
        let mut seen = 0;
        walk_pages(5, &cancel, None, fake_pages(&["1", "2", "3", "4", "5"]), |_| {
            seen += 1;
            if seen == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn page_load_error_aborts() {
        let cancel = CancellationToken::new();
        let err = walk_pages(
            2,
            &cancel,
            None,
            |idx| {
                if idx == 1 {
                    Err(ConvertError::CorruptPdf {
                        detail: "broken page".into(),
                    })
                } else {
                    Ok("ok".into())
                }
            },
            |_| ControlFlow::Continue(()),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::CorruptPdf { .. }));
    }

    #[test]
    fn empty_document_yields_empty_text() {
        let cancel = CancellationToken::new();
        let mut called = false;
        walk_pages(0, &cancel, None, fake_pages(&[]), |_| {
            called = true;
            ControlFlow::Continue(())
        })
        .unwrap();
        assert!(!called);
    }
}
