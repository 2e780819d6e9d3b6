//! Configuration types for PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct replaces the hard-coded
//! constants scattered over the pipeline stages: the JPEG quality and the
//! flattening background used by the image optimizer, the converter used for
//! Word output, where temporary files go and which PDFium library to load.

use crate::error::ConvertError;
use crate::pipeline::docx::{CommandConverter, DocxConverter};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default JPEG quality used when recompressing embedded images.
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

/// Configuration for a conversion request.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfconvert::{ConversionConfig, Rgb};
///
/// let config = ConversionConfig::builder()
///     .jpeg_quality(70)
///     .background(Rgb::WHITE)
///     .build()
///     .unwrap();
/// assert_eq!(config.image.jpeg_quality, 70);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// How embedded images of Word output are recompressed.
    pub image: ImageOptions,

    /// Run the image optimizer on Word output. Default: true.
    ///
    /// When false the DOCX produced by the converter is delivered untouched.
    pub optimize_images: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to the pdfium shared library (file or directory).
    ///
    /// When `None`, `PDFIUM_LIB_PATH` is consulted, then the directory of the
    /// running executable, then the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Structural PDF → DOCX converter. Default: [`CommandConverter::default()`]
    /// (`pdf2docx convert {input} {output}`).
    pub converter: Arc<dyn DocxConverter>,

    /// Directory for the per-request scratch directory. Default: system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress events receiver.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            image: ImageOptions::default(),
            optimize_images: true,
            password: None,
            pdfium_library_path: None,
            converter: Arc::new(CommandConverter::default()),
            temp_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("image", &self.image)
            .field("optimize_images", &self.optimize_images)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("converter", &self.converter.name())
            .field("temp_dir", &self.temp_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.image.jpeg_quality = quality;
        self
    }

    pub fn background(mut self, color: Rgb) -> Self {
        self.config.image.background = color;
        self
    }

    pub fn optimize_images(mut self, v: bool) -> Self {
        self.config.optimize_images = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn converter(mut self, converter: Arc<dyn DocxConverter>) -> Self {
        self.config.converter = converter;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Register a per-event progress callback.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.image.jpeg_quality == 0 || c.image.jpeg_quality > 100 {
            return Err(ConvertError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.image.jpeg_quality
            )));
        }
        if let Some(ref dir) = c.temp_dir {
            if !dir.is_dir() {
                return Err(ConvertError::InvalidConfig(format!(
                    "Temporary directory does not exist: {}",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Image options ────────────────────────────────────────────────────────

/// Recompression parameters for embedded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// JPEG quality on a 1–100 scale. Default: 50.
    pub jpeg_quality: u8,

    /// Opaque colour transparent pixels are composited onto. Default: black.
    pub background: Rgb,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            background: Rgb::BLACK,
        }
    }
}

/// An opaque 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    /// Parse `black`, `white`, `#rrggbb` or `rrggbb`.
    pub fn parse(s: &str) -> Result<Self, ConvertError> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "black" => return Ok(Rgb::BLACK),
            "white" => return Ok(Rgb::WHITE),
            _ => {}
        }

        let hex = s.strip_prefix('#').unwrap_or(&s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConvertError::InvalidConfig(format!(
                "Invalid colour '{s}': expected black, white or #rrggbb"
            )));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| ConvertError::InvalidConfig(format!("Invalid colour '{s}': {e}")))
        };
        Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_behaviour() {
        let config = ConversionConfig::default();
        assert_eq!(config.image.jpeg_quality, 50);
        assert_eq!(config.image.background, Rgb::BLACK);
        assert!(config.optimize_images);
        assert_eq!(config.converter.name(), "pdf2docx");
    }

    #[test]
    fn builder_rejects_quality_out_of_range() {
        assert!(ConversionConfig::builder().jpeg_quality(0).build().is_err());
        assert!(ConversionConfig::builder().jpeg_quality(101).build().is_err());
        assert!(ConversionConfig::builder().jpeg_quality(100).build().is_ok());
    }

    #[test]
    fn builder_rejects_missing_temp_dir() {
        let result = ConversionConfig::builder()
            .temp_dir("/definitely/not/a/real/dir")
            .build();
        assert!(matches!(result, Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_password() {
        let config = ConversionConfig::builder()
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn rgb_parse_forms() {
        assert_eq!(Rgb::parse("black").unwrap(), Rgb::BLACK);
        assert_eq!(Rgb::parse("WHITE").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::parse("#ff8000").unwrap(), Rgb([255, 128, 0]));
        assert_eq!(Rgb::parse("00ff00").unwrap(), Rgb([0, 255, 0]));
        assert!(Rgb::parse("#ff80").is_err());
        assert!(Rgb::parse("zzzzzz").is_err());
    }

    #[test]
    fn rgb_display_round_trips_through_parse() {
        let c = Rgb([18, 52, 86]);
        assert_eq!(c.to_string(), "#123456");
        assert_eq!(Rgb::parse(&c.to_string()).unwrap(), c);
    }
}
