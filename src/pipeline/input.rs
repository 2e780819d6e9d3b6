//! Input handling: turn an upload, a local path or a URL into a validated
//! [`SourceDocument`].
//!
//! Every input ends up as an immutable in-memory byte buffer. The `%PDF-`
//! header is looked for here so callers get a meaningful error rather
//! than an opaque pdfium or converter failure further down the pipeline.

use crate::error::ConvertError;
use bytes::Bytes;
use std::path::PathBuf;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// How far into the file the header may start.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Whether the `%PDF-` header appears within the first kilobyte.
fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Raw PDF bytes of one conversion request.
///
/// Cloning is cheap (`Bytes` is reference counted) and never copies the payload.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Bytes,
    name: Option<String>,
}

impl SourceDocument {
    /// Validate `bytes` as a PDF and wrap them.
    pub fn new(bytes: impl Into<Bytes>, name: Option<String>) -> Result<Self, ConvertError> {
        let bytes = bytes.into();
        let origin = name.clone().unwrap_or_else(|| "upload".to_string());

        if bytes.is_empty() {
            return Err(ConvertError::NoInput);
        }
        if !has_pdf_header(&bytes) {
            return Err(ConvertError::NotAPdf {
                origin,
                magic: bytes.iter().take(4).copied().collect(),
            });
        }

        Ok(Self { bytes, name })
    }

    /// Like [`SourceDocument::new`], rejecting payloads larger than `max_bytes`.
    pub fn from_upload(
        bytes: impl Into<Bytes>,
        name: Option<String>,
        max_bytes: usize,
    ) -> Result<Self, ConvertError> {
        let bytes = bytes.into();
        if bytes.len() > max_bytes {
            return Err(ConvertError::UploadTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }
        Self::new(bytes, name)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Original filename, when known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or HTTP(S) URL into a [`SourceDocument`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, ConvertError> {
    if input.trim().is_empty() {
        return Err(ConvertError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Read a local file, mapping I/O failures to input errors.
async fn resolve_local(path_str: &str) -> Result<SourceDocument, ConvertError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied { path });
        }
        Err(_) => return Err(ConvertError::FileNotFound { path }),
    };

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .or_else(|| Some(path_str.to_string()));
    SourceDocument::new(bytes, name)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, ConvertError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    SourceDocument::new(bytes, Some(filename_from_url(url)))
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn accepts_pdf_magic() {
        let doc = SourceDocument::new(&b"%PDF-1.7\n..."[..], Some("a.pdf".into())).unwrap();
        assert_eq!(doc.name(), Some("a.pdf"));
        assert_eq!(doc.len(), 12);
    }

    #[test]
    fn header_after_leading_bytes_is_accepted() {
        let mut bytes = b"\xEF\xBB\xBFjunk\r\n".to_vec();
        bytes.extend_from_slice(b"%PDF-1.4\n%%EOF\n");
        assert!(SourceDocument::new(bytes, None).is_ok());
    }

    #[test]
    fn header_beyond_first_kilobyte_is_rejected() {
        let mut bytes = vec![b' '; HEADER_SEARCH_WINDOW];
        bytes.extend_from_slice(b"%PDF-1.4\n%%EOF\n");
        assert!(matches!(
            SourceDocument::new(bytes, None),
            Err(ConvertError::NotAPdf { .. })
        ));
    }

    #[test]
    fn rejects_non_pdf() {
        let err = SourceDocument::new(&b"PK\x03\x04rest"[..], None).unwrap_err();
        match err {
            ConvertError::NotAPdf { origin, magic } => {
                assert_eq!(origin, "upload");
                assert_eq!(magic, b"PK\x03\x04".to_vec());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_upload_is_no_input() {
        assert!(matches!(
            SourceDocument::new(Bytes::new(), None),
            Err(ConvertError::NoInput)
        ));
    }

    #[test]
    fn upload_limit_is_enforced() {
        let err = SourceDocument::from_upload(vec![b'%'; 32], None, 16).unwrap_err();
        assert!(matches!(err, ConvertError::UploadTooLarge { size: 32, max: 16 }));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/papers/a.pdf"), "a.pdf");
        assert_eq!(filename_from_url("https://x.org/pdf/1706"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_local_file_is_reported() {
        let err = resolve_input("/definitely/not/a/real/file.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.name(), Some("doc.pdf"));
        assert!(doc.bytes().starts_with(b"%PDF"));
    }
}
