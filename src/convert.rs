//! Conversion entry points.
//!
//! One pipeline serves all three output formats:
//!
//! ```text
//!                   ┌─ Word Document ─▶ pdf_to_docx ─▶ optimize_docx ─▶ Download(.docx)
//! SourceDocument ───┼─ Text File ─────▶ extract_text ──────────────────▶ Download(.txt)
//!                   └─ Extracted Text ▶ extract_text ──────────────────▶ Inline
//! ```
//!
//! [`convert_document`] is the core; the other functions resolve inputs
//! (path, URL, bytes, session request) or write outputs around it. A request
//! either yields its complete output or one [`ConvertError`].

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::{
    Artifact, ConversionOutput, ConversionStats, Delivery, DocumentMetadata, OutputFormat,
};
use crate::pipeline::optimize::OptimizeReport;
use crate::pipeline::{docx, extract, input, optimize};
use crate::progress::Stage;
use crate::session::ConversionRequest;
use bytes::Bytes;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Title of the inline text view.
pub const EXTRACTED_TEXT_TITLE: &str = "Extracted Text";

/// Convert a PDF file or URL.
///
/// # Arguments
/// * `input_str`: local file path or HTTP/HTTPS URL to a PDF
/// * `format`: requested output
/// * `config`: conversion configuration
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfconvert::{convert, ConversionConfig, Delivery, OutputFormat};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::default();
/// let output = convert("report.pdf", OutputFormat::ExtractedText, &config).await?;
/// if let Delivery::Inline { text, .. } = output.delivery {
///     println!("{text}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {} → {}", input_str, format);

    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_document(&source, format, config, &CancellationToken::new()).await
}

/// Convert PDF bytes held in memory.
pub async fn convert_from_bytes(
    bytes: impl Into<Bytes>,
    format: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let source = input::SourceDocument::new(bytes, None)?;
    convert_document(&source, format, config, &CancellationToken::new()).await
}

/// Run a request handed out by [`crate::Session::begin_conversion`].
pub async fn run_request(
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    debug!("Running request of generation {}", request.generation);
    convert_document(&request.source, request.format, config, &request.cancel).await
}

/// Convert `source` to `format`.
///
/// `cancel` is checked between pages during text extraction. Word conversion
/// does not observe it; the session discards a superseded Word result instead.
pub async fn convert_document(
    source: &input::SourceDocument,
    format: OutputFormat,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    let mut stats = ConversionStats {
        input_bytes: source.len(),
        ..ConversionStats::default()
    };

    let delivery = match format {
        OutputFormat::WordDocument => {
            let word = pdf_to_word(source, config).await?;
            stats.conversion_duration_ms = word.conversion_duration_ms;
            stats.optimize_duration_ms = word.optimize_duration_ms;
            stats.images_optimized = word.report.images_optimized;
            stats.images_skipped = word.report.images_skipped;
            download(format, word.bytes)?
        }
        OutputFormat::TextFile | OutputFormat::ExtractedText => {
            let extracted = pdf_to_text(source, config, cancel).await?;
            stats.page_count = Some(extracted.page_count);
            stats.conversion_duration_ms = total_start.elapsed().as_millis() as u64;
            if format == OutputFormat::TextFile {
                download(format, Bytes::from(extracted.text))?
            } else {
                Delivery::Inline {
                    title: EXTRACTED_TEXT_TITLE.to_string(),
                    text: extracted.text,
                }
            }
        }
    };

    stats.output_bytes = delivery.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {} ({} bytes) in {}ms",
        format, stats.output_bytes, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(Stage::Done);
        cb.on_conversion_complete(stats.output_bytes);
    }

    Ok(ConversionOutput {
        format,
        delivery,
        stats,
    })
}

fn download(format: OutputFormat, bytes: Bytes) -> Result<Delivery, ConvertError> {
    Artifact::for_format(format, bytes)
        .map(Delivery::Download)
        .ok_or_else(|| ConvertError::Internal(format!("{format} has no download form")))
}

/// Extract the text of every page, concatenated in page order.
pub async fn pdf_to_text(
    source: &input::SourceDocument,
    config: &ConversionConfig,
    cancel: &CancellationToken,
) -> Result<extract::ExtractedText, ConvertError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(Stage::ExtractingText);
    }
    extract::extract_text(source, config, cancel).await
}

/// Word output of one request.
#[derive(Debug, Clone)]
pub struct WordOutput {
    pub bytes: Bytes,
    pub report: OptimizeReport,
    pub conversion_duration_ms: u64,
    pub optimize_duration_ms: u64,
}

/// Structural conversion followed (unless disabled) by image optimization.
pub async fn pdf_to_word(
    source: &input::SourceDocument,
    config: &ConversionConfig,
) -> Result<WordOutput, ConvertError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(Stage::ConvertingToWord);
    }
    let convert_start = Instant::now();
    let docx = docx::pdf_to_docx(source, config).await?;
    let conversion_duration_ms = convert_start.elapsed().as_millis() as u64;

    if !config.optimize_images {
        debug!("Image optimization disabled");
        return Ok(WordOutput {
            bytes: docx,
            report: OptimizeReport::default(),
            conversion_duration_ms,
            optimize_duration_ms: 0,
        });
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(Stage::OptimizingImages);
    }
    let optimize_start = Instant::now();
    let (bytes, report) =
        optimize::optimize_docx(docx, config.image, config.progress_callback.clone()).await?;

    Ok(WordOutput {
        bytes,
        report,
        conversion_duration_ms,
        optimize_duration_ms: optimize_start.elapsed().as_millis() as u64,
    })
}

/// Recompress the images of an existing DOCX file into `output_path`.
pub async fn optimize_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<OptimizeReport, ConvertError> {
    let input_path = input_path.as_ref();
    let bytes = match tokio::fs::read(input_path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: input_path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::FileNotFound {
                path: input_path.to_path_buf(),
            })
        }
    };

    let (optimized, report) = optimize::optimize_docx(
        Bytes::from(bytes),
        config.image,
        config.progress_callback.clone(),
    )
    .await?;
    write_atomic(output_path.as_ref(), &optimized).await?;
    Ok(report)
}

/// Convert a PDF and write the result to a file.
///
/// Inline text is written as-is. Uses atomic write (temp file + rename) to
/// prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConvertError> {
    let output = convert(input_str, format, config).await?;
    let payload: &[u8] = match &output.delivery {
        Delivery::Download(artifact) => &artifact.bytes,
        Delivery::Inline { text, .. } => text.as_bytes(),
    };
    write_atomic(output_path.as_ref(), payload).await?;
    Ok(output.stats)
}

/// Write `bytes` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let write_err = |e: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    format: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, format, config))
}

/// Extract PDF metadata without converting content.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DocumentMetadata, ConvertError> {
    let source = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extract::extract_metadata(&source, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::docx::DocxConverter;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Produces a package with no images and records nothing else.
    struct EmptyDocx;

    #[async_trait]
    impl DocxConverter for EmptyDocx {
        fn name(&self) -> &str {
            "empty"
        }

        async fn convert(&self, _pdf: &Path, docx: &Path) -> Result<(), ConvertError> {
            use std::io::Write;
            let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            let opts = zip::write::SimpleFileOptions::default();
            w.start_file("[Content_Types].xml", opts)?;
            w.write_all(br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#)
                .unwrap();
            w.start_file("word/document.xml", opts)?;
            w.write_all(b"<w:document/>").unwrap();
            let bytes = w.finish()?.into_inner();
            tokio::fs::write(docx, bytes).await.unwrap();
            Ok(())
        }
    }

    fn config() -> ConversionConfig {
        ConversionConfig::builder()
            .converter(Arc::new(EmptyDocx))
            .build()
            .unwrap()
    }

    const PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    #[tokio::test]
    async fn word_output_is_a_docx_download() {
        let output = convert_from_bytes(PDF, OutputFormat::WordDocument, &config())
            .await
            .unwrap();
        match output.delivery {
            Delivery::Download(a) => {
                assert_eq!(a.filename, "converted_document.docx");
                assert!(a.bytes.starts_with(b"PK"));
            }
            Delivery::Inline { .. } => panic!("word output must be a download"),
        }
        assert_eq!(output.stats.images_optimized, 0);
        assert_eq!(output.stats.input_bytes, PDF.len());
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_conversion() {
        let err = convert_from_bytes(&b"hello"[..], OutputFormat::TextFile, &config())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        write_atomic(&path, b"Hello").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"Hello");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn optimize_file_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = optimize_file(dir.path().join("nope.docx"), dir.path().join("o.docx"), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }
}
