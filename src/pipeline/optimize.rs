//! DOCX image optimizer: recompress every embedded image as a small JPEG.
//!
//! Only payloads change. Every other entry is raw-copied in its original
//! order (no recompression), and the relationship records, content types and
//! part names stay exactly as the converter wrote them.
//!
//! Image parts whose format the `image` crate cannot read (EMF, WMF, SVG, ...)
//! are left untouched and counted as skipped. A part that claims a readable
//! format but fails to decode aborts the whole optimization: a half-optimized
//! package is never returned.

use crate::config::ImageOptions;
use crate::error::ConvertError;
use crate::pipeline::encode::{can_decode, encode_jpeg};
use crate::pipeline::package::image_parts;
use crate::progress::ProgressCallback;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// What the optimizer did to a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    pub images_optimized: usize,
    pub images_skipped: usize,
    /// Total image payload size before recompression (optimized parts only).
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Recompress the images of `docx` on the blocking pool.
pub async fn optimize_docx(
    docx: Bytes,
    options: ImageOptions,
    progress: Option<ProgressCallback>,
) -> Result<(Bytes, OptimizeReport), ConvertError> {
    tokio::task::spawn_blocking(move || {
        optimize_docx_blocking(&docx, &options, progress.as_ref())
            .map(|(bytes, report)| (Bytes::from(bytes), report))
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Optimizer task panicked: {}", e)))?
}

/// Recompress the images of `docx`, returning the rewritten package.
pub fn optimize_docx_blocking(
    docx: &[u8],
    options: &ImageOptions,
    progress: Option<&ProgressCallback>,
) -> Result<(Vec<u8>, OptimizeReport), ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let parts = image_parts(&mut archive)?;

    let mut report = OptimizeReport::default();
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();

    for part in &parts {
        let original = read_entry(&mut archive, &part.part_name)?;

        if !can_decode(&original) {
            warn!(
                "Leaving {} ({}) untouched: format not decodable",
                part.part_name, part.content_type
            );
            report.images_skipped += 1;
            continue;
        }

        let jpeg = encode_jpeg(&original, options).map_err(|e| ConvertError::ImageFailed {
            part: part.part_name.clone(),
            detail: e.to_string(),
        })?;

        debug!(
            "{} [{}]: {} → {} bytes",
            part.part_name,
            part.rel_ids.join(","),
            original.len(),
            jpeg.len()
        );
        if let Some(cb) = progress {
            cb.on_image_optimized(&part.part_name, original.len(), jpeg.len());
        }

        report.images_optimized += 1;
        report.bytes_before += original.len();
        report.bytes_after += jpeg.len();
        replacements.insert(part.part_name.clone(), jpeg);
    }

    let rewritten = rewrite_package(&mut archive, &replacements)?;

    info!(
        "Optimized {} images ({} skipped): {} → {} bytes of image data",
        report.images_optimized, report.images_skipped, report.bytes_before, report.bytes_after
    );
    Ok((rewritten, report))
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ConvertError> {
    let mut file = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| ConvertError::PackageFailed {
            detail: format!("{name}: {e}"),
        })?;
    Ok(buf)
}

/// Copy every entry in order, swapping in the replacement payloads.
fn rewrite_package(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    replacements: &HashMap<String, Vec<u8>>,
) -> Result<Vec<u8>, ConvertError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    // JPEG data does not deflate.
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for idx in 0..archive.len() {
        let file = archive.by_index_raw(idx)?;
        match replacements.get(file.name()) {
            Some(payload) => {
                let name = file.name().to_string();
                drop(file);
                writer.start_file(name.as_str(), stored)?;
                writer
                    .write_all(payload)
                    .map_err(|e| ConvertError::PackageFailed {
                        detail: format!("{name}: {e}"),
                    })?;
            }
            None => writer.raw_copy_file(file)?,
        }
    }

    Ok(writer.finish()?.into_inner())
}
