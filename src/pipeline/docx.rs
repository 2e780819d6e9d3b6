//! Structural PDF → DOCX conversion through an external converter.
//!
//! Layout recovery (paragraphs, tables, images) is delegated to a converter
//! behind the [`DocxConverter`] trait. The default [`CommandConverter`] runs
//! `pdf2docx convert {input} {output}` as a child process.
//!
//! Every request gets its own scratch directory:
//!
//! ```text
//! $TMPDIR/pdfconvert-XXXXXX/
//! ├── input.pdf     ← uploaded bytes
//! └── output.docx   ← written by the converter
//! ```
//!
//! The directory is a [`tempfile::TempDir`] guard, so it is removed when
//! [`pdf_to_docx`] returns, whatever the outcome, and during unwinding.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use bytes::Bytes;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Characters of converter stderr kept in error messages.
const STDERR_TAIL: usize = 500;

/// Turns a PDF file into a DOCX file.
#[async_trait]
pub trait DocxConverter: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Convert `pdf` into a DOCX package written at `docx`.
    async fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConvertError>;
}

/// Runs an external program; `{input}` and `{output}` in its arguments are
/// replaced with the PDF and DOCX paths.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for CommandConverter {
    /// `pdf2docx convert {input} {output}`, no timeout.
    fn default() -> Self {
        Self::new("pdf2docx", ["convert", INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER])
    }
}

impl CommandConverter {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    /// Kill the converter and fail with [`ConvertError::ConverterTimeout`]
    /// when it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn expand_args(&self, pdf: &Path, docx: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => pdf.as_os_str().to_owned(),
                OUTPUT_PLACEHOLDER => docx.as_os_str().to_owned(),
                other => other
                    .replace(INPUT_PLACEHOLDER, &pdf.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &docx.to_string_lossy())
                    .into(),
            })
            .collect()
    }
}

#[async_trait]
impl DocxConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConvertError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(pdf, docx))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running converter: {:?}", cmd.as_std());

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvertError::ConverterNotFound {
                    program: self.program.clone(),
                }
            } else {
                ConvertError::ConversionFailed {
                    converter: self.program.clone(),
                    detail: format!("failed to start: {e}"),
                }
            }
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ConvertError::ConverterTimeout {
                    converter: self.program.clone(),
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| ConvertError::ConversionFailed {
            converter: self.program.clone(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} stderr: {}", self.program, stderr.trim());
            return Err(ConvertError::ConversionFailed {
                converter: self.program.clone(),
                detail: format!("{}: {}", output.status, tail(stderr.trim(), STDERR_TAIL)),
            });
        }

        Ok(())
    }
}

/// Last `max` characters of `s`.
fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = s
        .char_indices()
        .nth(count - max)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[skip..]
}

/// Convert `source` to DOCX bytes with `config.converter`.
pub async fn pdf_to_docx(
    source: &SourceDocument,
    config: &ConversionConfig,
) -> Result<Bytes, ConvertError> {
    let converter = config.converter.clone();
    let start = Instant::now();

    let mut builder = tempfile::Builder::new();
    builder.prefix("pdfconvert-");
    let scratch = match &config.temp_dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
    .map_err(|e| ConvertError::Internal(format!("Failed to create temp directory: {}", e)))?;

    let pdf_path = scratch.path().join("input.pdf");
    let docx_path = scratch.path().join("output.docx");

    tokio::fs::write(&pdf_path, source.bytes())
        .await
        .map_err(|e| ConvertError::Internal(format!("Failed to stage PDF: {}", e)))?;

    info!(
        "Converting {} ({} bytes) with {}",
        source.name().unwrap_or("upload"),
        source.len(),
        converter.name()
    );
    converter.convert(&pdf_path, &docx_path).await?;

    let bytes = tokio::fs::read(&docx_path)
        .await
        .map_err(|e| ConvertError::ConversionFailed {
            converter: converter.name().to_string(),
            detail: format!("no output produced: {e}"),
        })?;

    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ConvertError::ConversionFailed {
            converter: converter.name().to_string(),
            detail: "output is not a DOCX package".to_string(),
        });
    }

    info!(
        "Converter produced {} bytes in {}ms",
        bytes.len(),
        start.elapsed().as_millis()
    );
    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    /// Writes fixed bytes (or fails) without touching any external program.
    struct FakeConverter {
        output: Option<Vec<u8>>,
    }

    #[async_trait]
    impl DocxConverter for FakeConverter {
        fn name(&self) -> &str {
            "fake"
        }

        async fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConvertError> {
            assert!(pdf.exists(), "input must be staged before conversion");
            match &self.output {
                Some(bytes) => {
                    tokio::fs::write(docx, bytes).await.unwrap();
                    Ok(())
                }
                None => Err(ConvertError::ConversionFailed {
                    converter: "fake".into(),
                    detail: "boom".into(),
                }),
            }
        }
    }

    fn config_in(dir: &Path, converter: FakeConverter) -> ConversionConfig {
        ConversionConfig::builder()
            .temp_dir(dir)
            .converter(Arc::new(converter))
            .build()
            .unwrap()
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn default_converter_is_pdf2docx() {
        let c = CommandConverter::default();
        assert_eq!(c.name(), "pdf2docx");
        let args = c.expand_args(Path::new("/t/in.pdf"), Path::new("/t/out.docx"));
        assert_eq!(args, vec![OsString::from("convert"), "/t/in.pdf".into(), "/t/out.docx".into()]);
    }

    #[test]
    fn placeholders_inside_arguments_are_expanded() {
        let c = CommandConverter::new("soffice", ["--outdir={output}", "{input}"]);
        let args = c.expand_args(Path::new("a.pdf"), Path::new("b.docx"));
        assert_eq!(args, vec![OsString::from("--outdir=b.docx"), "a.pdf".into()]);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn scratch_dir_is_removed_on_success() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(
            root.path(),
            FakeConverter {
                output: Some(b"PK\x03\x04rest".to_vec()),
            },
        );
        let source = SourceDocument::new(PDF, None).unwrap();

        let bytes = pdf_to_docx(&source, &config).await.unwrap();
        assert!(bytes.starts_with(ZIP_MAGIC));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn scratch_dir_is_removed_on_failure() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path(), FakeConverter { output: None });
        let source = SourceDocument::new(PDF, None).unwrap();

        let err = pdf_to_docx(&source, &config).await.unwrap_err();
        assert!(matches!(err, ConvertError::ConversionFailed { .. }));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn non_zip_output_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(
            root.path(),
            FakeConverter {
                output: Some(b"<html>".to_vec()),
            },
        );
        let source = SourceDocument::new(PDF, None).unwrap();

        let err = pdf_to_docx(&source, &config).await.unwrap_err();
        assert!(matches!(err, ConvertError::ConversionFailed { .. }));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let c = CommandConverter::new("definitely-not-a-real-converter-binary", ["{input}"]);
        let dir = tempfile::tempdir().unwrap();
        let err = c
            .convert(&dir.path().join("a.pdf"), &dir.path().join("b.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConverterNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_reports_stderr() {
        let c = CommandConverter::new("sh", ["-c", "echo 'bad xref table' >&2; exit 3"]);
        let dir = tempfile::tempdir().unwrap();
        let err = c
            .convert(&dir.path().join("a.pdf"), &dir.path().join("b.docx"))
            .await
            .unwrap_err();
        match err {
            ConvertError::ConversionFailed { converter, detail } => {
                assert_eq!(converter, "sh");
                assert!(detail.contains("bad xref table"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let c = CommandConverter::new("sleep", ["5"]).with_timeout(Duration::from_millis(100));
        let dir = tempfile::tempdir().unwrap();
        let err = c
            .convert(&dir.path().join("a.pdf"), &dir.path().join("b.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConverterTimeout { .. }));
    }
}
