//! Image encoding: decoded image → opaque RGB → baseline JPEG.
//!
//! Word renders JPEG parts without complaint regardless of the part's file
//! extension, so the optimizer only swaps payloads and never touches the
//! package's content types. JPEG carries no alpha channel; transparent pixels
//! are composited onto [`ImageOptions::background`] first.

use crate::config::{ImageOptions, Rgb};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Whether the `image` crate can decode payloads of this format.
///
/// Payloads we cannot read (EMF, WMF, SVG, ...) are left in place.
pub fn can_decode(bytes: &[u8]) -> bool {
    image::guess_format(bytes)
        .map(|format| format.reading_enabled())
        .unwrap_or(false)
}

/// Composite `img` onto an opaque `background`.
///
/// Images without an alpha channel are converted straight to RGB8.
pub fn flatten(img: &DynamicImage, background: Rgb) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let [br, bg, bb] = background.0;
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u32::from(a);
        let mix = |fg: u8, bgc: u8| -> u8 {
            ((u32::from(fg) * a + u32::from(bgc) * (255 - a) + 127) / 255) as u8
        };
        image::Rgb([mix(r, br), mix(g, bg), mix(b, bb)])
    })
}

/// Decode `bytes`, flatten and re-encode as JPEG at `options.jpeg_quality`.
pub fn encode_jpeg(bytes: &[u8], options: &ImageOptions) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let rgb = DynamicImage::ImageRgb8(flatten(&img, options.background));

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), options.jpeg_quality);
    rgb.write_with_encoder(encoder)?;

    debug!(
        "Encoded {}x{} image → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        options.jpeg_quality
    );
    Ok(buf)
}
