//! Resources extracted by SimPE.
//!
//! SimPE exports a resource as two files: the raw payload and a
//! `.simpe.xml` descriptor naming it and recording its key:
//!
//! ```xml
//! <package type="2">
//!   <packedfile path="" name="BHAV - Main.simpe">
//!     <type><number>1112031574</number></type>
//!     <classid>0</classid>
//!     <group>2130706433</group>
//!     <instance>4097</instance>
//!   </packedfile>
//! </package>
//! ```
//!
//! Key fields are decimal `u32` values.

use crate::diff::VersionDiff;
use crate::error::{DbpfError, Result};
use crate::filter::{GroupFilter, SearchFilter};
use crate::index::{ResourceKey, Tag};
use crate::registry::{ResourceRegistry, ScanOptions};
use crate::resource::Resource;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Key and payload location read from a `.simpe.xml` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedResource {
    /// File name of the payload, relative to the descriptor.
    pub name: String,
    /// Resource key.
    pub key: ResourceKey,
    /// Resolved payload path, set by [`open`](Self::open).
    pub payload_path: Option<PathBuf>,
}

#[derive(Default)]
struct Fields {
    name: Option<String>,
    rtype: Option<Tag>,
    class_id: Option<Tag>,
    group: Option<Tag>,
    instance: Option<Tag>,
}

fn decimal_tag(text: &str, field: &str) -> Result<Tag> {
    text.trim()
        .parse::<u32>()
        .map(Tag::from_u32)
        .map_err(|e| DbpfError::MalformedXml(format!("{} '{}': {}", field, text.trim(), e)))
}

impl ExtractedResource {
    /// Parses descriptor XML.
    ///
    /// Only the first `packedfile` element is read.
    ///
    /// # Errors
    ///
    /// Returns `MalformedXml` for unparsable XML or non-numeric key fields,
    /// and `MissingField` when the name or a key field is absent.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut fields = Fields::default();
        let mut seen_packedfile = false;

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if tag == "packedfile" && path.len() == 1 && !seen_packedfile {
                        seen_packedfile = true;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"name" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| DbpfError::MalformedXml(e.to_string()))?;
                                fields.name = Some(value.into_owned());
                            }
                        }
                    }
                    path.push(tag);
                }
                Ok(Event::End(_)) => {
                    if path.pop().as_deref() == Some("packedfile") && path.len() == 1 {
                        break;
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| DbpfError::MalformedXml(e.to_string()))?;
                    let inner: Vec<&str> = path.iter().skip(1).map(String::as_str).collect();
                    match inner.as_slice() {
                        ["packedfile", "type", "number"] => fields.rtype = Some(decimal_tag(&text, "type")?),
                        ["packedfile", "classid"] => fields.class_id = Some(decimal_tag(&text, "classid")?),
                        ["packedfile", "group"] => fields.group = Some(decimal_tag(&text, "group")?),
                        ["packedfile", "instance"] => fields.instance = Some(decimal_tag(&text, "instance")?),
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DbpfError::MalformedXml(format!(
                        "at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
            }
        }

        if !seen_packedfile {
            return Err(DbpfError::MissingField("packedfile"));
        }

        Ok(ExtractedResource {
            name: fields.name.ok_or(DbpfError::MissingField("packedfile@name"))?,
            key: ResourceKey::new(
                fields.rtype.ok_or(DbpfError::MissingField("type/number"))?,
                fields.group.ok_or(DbpfError::MissingField("group"))?,
                fields.class_id.ok_or(DbpfError::MissingField("classid"))?,
                fields.instance.ok_or(DbpfError::MissingField("instance"))?,
            ),
            payload_path: None,
        })
    }

    /// Reads and parses a descriptor file, resolving the payload beside it.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` if the descriptor cannot be read, and the
    /// [`parse`](Self::parse) errors otherwise.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|e| DbpfError::unreadable(path, e))?;
        let mut extracted = Self::parse(&xml)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        extracted.payload_path = Some(dir.join(&extracted.name));
        debug!(key = %extracted.key, name = %extracted.name, "Parsed extracted resource descriptor");
        Ok(extracted)
    }

    /// Reads the payload file named by the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the descriptor was parsed from a string rather
    /// than opened, and `UnreadableFile` if the payload cannot be read.
    pub fn load(&self) -> Result<Resource> {
        let path = self
            .payload_path
            .as_deref()
            .ok_or_else(|| DbpfError::not_found("payload file", &self.name))?;
        let bytes = std::fs::read(path).map_err(|e| DbpfError::unreadable(path, e))?;
        debug!(file = %path.display(), size = bytes.len(), "Reading extracted resource");
        Resource::from_standalone(self.key, &bytes)
    }
}

/// Compares an extracted resource with the copy of its key in `package`.
///
/// The extracted payload is the new side and the package copy is the old
/// side. If `package` has no copy the returned diff is not `compared`.
///
/// # Errors
///
/// Returns descriptor and payload errors from [`ExtractedResource`] and the
/// [`scan_file`](ResourceRegistry::scan_file) errors for `package`.
pub fn compare_with_package(descriptor: &Path, package: &Path) -> Result<VersionDiff> {
    let extracted = ExtractedResource::open(descriptor)?;
    let resource = extracted.load()?;
    let key = extracted.key;

    let filter = SearchFilter::new([key.rtype])
        .with_group(GroupFilter::Exact(key.group))
        .with_instance(key.instance);
    let mut registry = ResourceRegistry::new(filter);
    registry.insert(resource, &extracted.name, true);
    registry.scan_file(package, &ScanOptions::new())?;

    registry.diff(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package type="2">
  <packedfile path="" name="BHAV - Main.simpe">
    <type><number>1112031574</number></type>
    <classid>0</classid>
    <group>2130706433</group>
    <instance>4097</instance>
  </packedfile>
</package>"#;

    #[test]
    fn test_parse_descriptor() {
        let extracted = ExtractedResource::parse(DESCRIPTOR).unwrap();
        assert_eq!(extracted.name, "BHAV - Main.simpe");
        assert_eq!(extracted.key.rtype, Tag::BHAV);
        assert_eq!(extracted.key.group, Tag::from_u32(0x7F00_0001));
        assert_eq!(extracted.key.class_id, Tag::ZERO);
        assert_eq!(extracted.key.instance, Tag::from_u32(0x1001));
        assert_eq!(extracted.payload_path, None);
    }

    #[test]
    fn test_missing_field() {
        let xml = DESCRIPTOR.replace("<classid>0</classid>", "");
        assert!(matches!(
            ExtractedResource::parse(&xml),
            Err(DbpfError::MissingField("classid"))
        ));
    }

    #[test]
    fn test_missing_packedfile() {
        assert!(matches!(
            ExtractedResource::parse("<package></package>"),
            Err(DbpfError::MissingField("packedfile"))
        ));
    }

    #[test]
    fn test_bad_number() {
        let xml = DESCRIPTOR.replace("4097", "0x1001");
        assert!(matches!(ExtractedResource::parse(&xml), Err(DbpfError::MalformedXml(_))));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            ExtractedResource::parse("<package><packedfile name=\"x\"></package>"),
            Err(DbpfError::MalformedXml(_))
        ));
    }

    #[test]
    fn test_load_requires_open() {
        let extracted = ExtractedResource::parse(DESCRIPTOR).unwrap();
        assert!(matches!(extracted.load(), Err(DbpfError::NotFound(_))));
    }
}
