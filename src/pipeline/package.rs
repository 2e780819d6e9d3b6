//! Read-only view of a DOCX (OPC) package: content types, relationships and
//! the image parts the main document references.
//!
//! ```text
//! [Content_Types].xml          extension / part name → content type
//! _rels/.rels                  package rels → officeDocument (word/document.xml)
//! word/_rels/document.xml.rels main part rels → media, styles, hyperlinks, ...
//! word/media/image1.png        image payload
//! ```
//!
//! A relationship points at an image when its target is internal and the
//! target part's declared content type is `image/*`. Part names and file
//! extensions play no role beyond the content-type lookup.
//!
//! Part names inside the XML are IRIs (`media/image%201.png`); they are
//! percent-decoded before being compared with ZIP entry names.

use crate::error::ConvertError;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read, Seek};
use tracing::debug;
use zip::ZipArchive;

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";
const OFFICE_DOCUMENT_SUFFIX: &str = "/officeDocument";

// ── Content types ────────────────────────────────────────────────────────

/// Parsed `[Content_Types].xml`.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// Lower-cased extension → content type.
    defaults: HashMap<String, String>,
    /// Lower-cased part name without leading slash → content type.
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self, ConvertError> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| ConvertError::PackageFailed {
            detail: format!("{CONTENT_TYPES_PART}: {e}"),
        })?;

        let mut types = Self::default();
        for node in doc.root_element().children().filter(|n| n.is_element()) {
            let Some(content_type) = node.attribute("ContentType") else {
                continue;
            };
            match node.tag_name().name() {
                "Default" => {
                    if let Some(ext) = node.attribute("Extension") {
                        types
                            .defaults
                            .insert(ext.to_ascii_lowercase(), content_type.to_string());
                    }
                }
                "Override" => {
                    if let Some(part) = node.attribute("PartName") {
                        types
                            .overrides
                            .insert(normalize_part(part), content_type.to_string());
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Content type of `part`: its Override if any, else the Default for its extension.
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let key = normalize_part(part);
        if let Some(ct) = self.overrides.get(&key) {
            return Some(ct.as_str());
        }
        let file = key.rsplit('/').next().unwrap_or(&key);
        let (_, ext) = file.rsplit_once('.')?;
        self.defaults.get(ext).map(String::as_str)
    }

    pub fn is_image(&self, part: &str) -> bool {
        self.content_type_of(part)
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

fn normalize_part(part: &str) -> String {
    decode_part_name(part)
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

/// Percent-decode a part name; invalid escapes leave it as written.
fn decode_part_name(name: &str) -> Cow<'_, str> {
    urlencoding::decode(name).unwrap_or(Cow::Borrowed(name))
}

// ── Relationships ────────────────────────────────────────────────────────

/// One `<Relationship>` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// `TargetMode="External"` (hyperlinks, linked images).
    pub external: bool,
}

/// Parse a `.rels` part.
pub fn parse_relationships(xml: &str) -> Result<Vec<Relationship>, ConvertError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| ConvertError::PackageFailed {
        detail: format!("relationships: {e}"),
    })?;

    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|n| {
            Some(Relationship {
                id: n.attribute("Id")?.to_string(),
                rel_type: n.attribute("Type").unwrap_or_default().to_string(),
                target: n.attribute("Target")?.to_string(),
                external: n
                    .attribute("TargetMode")
                    .is_some_and(|m| m.eq_ignore_ascii_case("External")),
            })
        })
        .collect())
}

/// Name of the `.rels` part describing `part`.
///
/// `word/document.xml` → `word/_rels/document.xml.rels`
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// Handles `..` segments, absolute (`/word/media/x.png`) and percent-encoded
/// targets. The result is a ZIP entry name (no leading slash).
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = decode_part_name(target);
    let mut segments: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        let mut dir: Vec<&str> = source_part.split('/').collect();
        dir.pop();
        dir
    };

    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

// ── Package access ───────────────────────────────────────────────────────

/// An image part referenced by the main document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    /// ZIP entry name, e.g. `word/media/image1.png`.
    pub part_name: String,
    pub content_type: String,
    /// Every relationship id pointing at this part.
    pub rel_ids: Vec<String>,
}

/// Read an entry as UTF-8 text, `None` when it does not exist.
pub fn read_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ConvertError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ConvertError::PackageFailed {
            detail: format!("{name}: {e}"),
        })?;
    Ok(Some(content))
}

/// Locate the main document part via the package relationships.
pub fn main_document_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<String, ConvertError> {
    if let Some(xml) = read_text(archive, PACKAGE_RELS_PART)? {
        if let Some(rel) = parse_relationships(&xml)?
            .into_iter()
            .find(|r| !r.external && r.rel_type.ends_with(OFFICE_DOCUMENT_SUFFIX))
        {
            return Ok(resolve_target("", &rel.target));
        }
    }
    Ok(DEFAULT_MAIN_PART.to_string())
}

/// Relationships of the main document part.
pub fn main_part_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(String, Vec<Relationship>), ConvertError> {
    let main = main_document_part(archive)?;
    if archive.index_for_name(&main).is_none() {
        return Err(ConvertError::PackageFailed {
            detail: format!("main document part '{main}' is missing"),
        });
    }
    let rels = match read_text(archive, &rels_part_for(&main))? {
        Some(xml) => parse_relationships(&xml)?,
        None => Vec::new(),
    };
    Ok((main, rels))
}

/// Image parts referenced from the main document, each listed once.
pub fn image_parts<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<ImagePart>, ConvertError> {
    let Some(ct_xml) = read_text(archive, CONTENT_TYPES_PART)? else {
        return Err(ConvertError::PackageFailed {
            detail: format!("{CONTENT_TYPES_PART} is missing"),
        });
    };
    let content_types = ContentTypes::parse(&ct_xml)?;
    let (main, rels) = main_part_relationships(archive)?;

    let mut parts: Vec<ImagePart> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for rel in rels.into_iter().filter(|r| !r.external) {
        let part_name = resolve_target(&main, &rel.target);
        if !content_types.is_image(&part_name) {
            continue;
        }
        if let Some(&idx) = seen.get(&part_name) {
            parts[idx].rel_ids.push(rel.id);
            continue;
        }
        if archive.index_for_name(&part_name).is_none() {
            debug!("Image relationship {} points at missing part {}", rel.id, part_name);
            continue;
        }
        let content_type = content_types
            .content_type_of(&part_name)
            .unwrap_or_default()
            .to_string();
        seen.insert(part_name.clone(), parts.len());
        parts.push(ImagePart {
            part_name,
            content_type,
            rel_ids: vec![rel.id],
        });
    }

    debug!("{} image parts referenced by {}", parts.len(), main);
    Ok(parts)
}

/// Relationship ids of the main document part.
pub fn relationship_ids(docx: &[u8]) -> Result<BTreeSet<String>, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let (_, rels) = main_part_relationships(&mut archive)?;
    Ok(rels.into_iter().map(|r| r.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="PNG" ContentType="image/png"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/media/blob.bin" ContentType="image/jpeg"/>
</Types>"#;

    #[test]
    fn content_type_lookup_prefers_override() {
        let ct = ContentTypes::parse(CT).unwrap();
        assert_eq!(ct.content_type_of("word/media/blob.bin"), Some("image/jpeg"));
        assert_eq!(ct.content_type_of("/word/media/image1.png"), Some("image/png"));
        assert_eq!(ct.content_type_of("word/media/unknown.emf"), None);
        assert!(ct.is_image("word/media/blob.bin"));
        assert!(!ct.is_image("word/document.xml"));
    }

    #[test]
    fn name_containing_image_is_not_enough() {
        let ct = ContentTypes::parse(CT).unwrap();
        assert!(!ct.is_image("word/imageStyles.xml"));
    }

    #[test]
    fn relationships_are_parsed() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].id, "rId1");
        assert!(!rels[0].external);
        assert!(rels[1].external);
    }

    #[test]
    fn rels_part_naming() {
        assert_eq!(rels_part_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_for("document.xml"), "_rels/document.xml.rels");
    }

    #[test]
    fn targets_resolve_relative_to_source_part() {
        assert_eq!(resolve_target("word/document.xml", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word/document.xml", "../media/a.png"), "media/a.png");
        assert_eq!(resolve_target("word/document.xml", "/word/media/b.png"), "word/media/b.png");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn percent_encoded_targets_are_decoded() {
        assert_eq!(
            resolve_target("word/document.xml", "media/image%201.png"),
            "word/media/image 1.png"
        );
        assert_eq!(
            resolve_target("word/document.xml", "media/caf%C3%A9.png"),
            "word/media/café.png"
        );
        // Not valid UTF-8 once decoded: kept as written.
        assert_eq!(resolve_target("word/document.xml", "media/%FF.png"), "word/media/%FF.png");
    }

    #[test]
    fn encoded_override_matches_decoded_part() {
        let xml = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Override PartName="/word/media/scan%201.bin" ContentType="image/png"/>
</Types>"#;
        let ct = ContentTypes::parse(xml).unwrap();
        assert!(ct.is_image("word/media/scan 1.bin"));
    }

    #[test]
    fn malformed_xml_is_a_package_failure() {
        assert!(matches!(
            parse_relationships("<Relationships>"),
            Err(ConvertError::PackageFailed { .. })
        ));
    }

    #[test]
    fn non_zip_is_a_package_failure() {
        assert!(matches!(
            relationship_ids(b"not a zip"),
            Err(ConvertError::PackageFailed { .. })
        ));
    }
}
