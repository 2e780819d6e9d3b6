//! Streaming text extraction: emit page texts as they are read.
//!
//! ## Why stream?
//!
//! Long documents take a while to extract. A stream lets callers show text
//! immediately or write it out incrementally instead of buffering the whole
//! document.
//!
//! Pages arrive in page order over a bounded channel. The blocking producer
//! stops as soon as the consumer drops the stream or the cancellation token
//! fires; a cancellation is delivered as the final `Err` item.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::PageText;
use crate::pipeline::extract::extract_pages_blocking;
use crate::pipeline::input::{self, SourceDocument};
use std::ops::ControlFlow;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A boxed stream of page texts.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageText, ConvertError>> + Send>>;

/// Pages buffered ahead of a slow consumer.
const CHANNEL_CAPACITY: usize = 4;

/// Resolve a path or URL and stream its page texts.
///
/// # Returns
/// - `Ok(PageStream)`: a stream of `Result<PageText, ConvertError>`
/// - `Err(ConvertError)`: the input could not be read or is not a PDF
pub async fn extract_pages_stream(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
    cancel: CancellationToken,
) -> Result<PageStream, ConvertError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming extraction: {}", input_str);

    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    Ok(stream_pages(source, config, cancel))
}

/// Stream the page texts of an in-memory document.
pub fn stream_pages(
    source: SourceDocument,
    config: &ConversionConfig,
    cancel: CancellationToken,
) -> PageStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let password = config.password.clone();
    let library = config.pdfium_library_path.clone();
    let progress = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || {
        let result = extract_pages_blocking(
            source.bytes(),
            password.as_deref(),
            library.as_deref(),
            &cancel,
            progress.as_ref(),
            |page| match tx.blocking_send(Ok(page)) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            },
        );

        match result {
            Ok(pages) => debug!("Producer finished after {} pages", pages),
            Err(e) => {
                // The consumer may already be gone; nothing else to do then.
                let _ = tx.blocking_send(Err(e));
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn missing_input_fails_before_streaming() {
        let config = ConversionConfig::default();
        let result =
            extract_pages_stream("/no/such/file.pdf", &config, CancellationToken::new()).await;
        assert!(matches!(result, Err(ConvertError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn producer_errors_become_the_last_item() {
        // A bogus library path makes the producer fail on its first step.
        let config = ConversionConfig::builder()
            .pdfium_library_path("/definitely/not/libpdfium.so")
            .build()
            .unwrap();
        let source = SourceDocument::new(&b"%PDF-1.4\n%%EOF\n"[..], None).unwrap();

        let items: Vec<_> = stream_pages(source, &config, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ConvertError::PdfiumBindingFailed(_))));
    }
}
