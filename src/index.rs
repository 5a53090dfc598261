//! Resource index (directory of descriptors) parsing.
//!
//! The index is a table of fixed-size entries located by the header. Each
//! entry names a resource by its (type, group, instance[, class id]) tags and
//! points at the payload with an offset and a length.

use crate::error::{DbpfError, Result};
use crate::header::PackageHeader;
use crate::utils::{read_tag_bytes, read_u32_le, slice_at, tag_hex};
use std::fmt;

/// Smallest index entry: three tags plus offset and length.
pub const MIN_ENTRY_SIZE: usize = 20;

/// Entries larger than this carry a class id after the instance.
const CLASS_ID_THRESHOLD: usize = 20;

/// Raw type tags with a human-readable name that is not simply the
/// reversed tag bytes.
pub const TYPE_ALIASES: &[([u8; 4], &str)] = &[
    ([0x64, 0x67, 0x50, 0xAC], "3IDR"),
    ([0x87, 0x86, 0x4F, 0xAC], "GMDC"),
    ([0x27, 0x3E, 0xCF, 0xEB], "GZPS"),
    ([0xB5, 0x80, 0x15, 0x8C], "XHTN"),
    ([0x42, 0xE3, 0xFE, 0xEB], "VERS"),
    ([0x76, 0x9A, 0x7E, 0x0C], "JPG"),
];

/// Types searched case-insensitively by content filters.
pub const TEXT_TYPES: [Tag; 3] = [Tag::STR, Tag::CTSS, Tag::TTAS];

/// A 4-byte identifier stored in the container's native byte order.
///
/// Tags are compared as opaque arrays. Numeric conversion exists only for
/// display and for filters typed in by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Sentinel used for the class id of entries too short to carry one.
    pub const ZERO: Tag = Tag([0; 4]);

    /// Behaviour constant (BCON).
    pub const BCON: Tag = Tag(*b"NOCB");
    /// Behaviour function (BHAV).
    pub const BHAV: Tag = Tag(*b"VAHB");
    /// Text list (STR#).
    pub const STR: Tag = Tag(*b"#RTS");
    /// Catalog description (CTSS).
    pub const CTSS: Tag = Tag(*b"SSTC");
    /// Pie menu strings (TTAs).
    pub const TTAS: Tag = Tag(*b"sATT");
    /// Pie menu functions (TTAB).
    pub const TTAB: Tag = Tag(*b"BATT");
    /// Object data (OBJD).
    pub const OBJD: Tag = Tag(*b"DJBO");
    /// Object functions (OBJf).
    pub const OBJF: Tag = Tag(*b"fJBO");
    /// Property set (GZPS).
    pub const GZPS: Tag = Tag([0x27, 0x3E, 0xCF, 0xEB]);
    /// Geometric data container (GMDC).
    pub const GMDC: Tag = Tag([0x87, 0x86, 0x4F, 0xAC]);
    /// JPEG image (JPG).
    pub const JPG: Tag = Tag([0x76, 0x9A, 0x7E, 0x0C]);

    /// Creates a tag from its little-endian numeric value.
    pub fn from_u32(value: u32) -> Self {
        Tag(value.to_le_bytes())
    }

    /// Returns the little-endian numeric value of the tag.
    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Returns true for types whose payload is mostly human-readable text.
    pub fn is_text(self) -> bool {
        TEXT_TYPES.contains(&self)
    }

    /// Returns the most significant byte of the numeric value.
    pub fn top_byte(self) -> u8 {
        self.0[3]
    }

    /// Returns the display name of a type tag.
    ///
    /// Aliased tags use the alias table; otherwise printable tags are shown
    /// with their bytes reversed (stored `NOCB` reads as `BCON`), and
    /// anything else falls back to hex.
    pub fn mnemonic(self) -> String {
        if let Some((_, name)) = TYPE_ALIASES.iter().find(|(raw, _)| *raw == self.0) {
            return (*name).to_string();
        }
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            self.0.iter().rev().map(|&b| b as char).collect()
        } else {
            tag_hex(&self.0)
        }
    }

    /// Resolves a display name back to the raw tag.
    ///
    /// Accepts alias names, four-character mnemonics and `0x`-prefixed hex.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        if let Some((raw, _)) = TYPE_ALIASES.iter().find(|(_, alias)| *alias == name) {
            return Some(Tag(*raw));
        }
        if let Some(digits) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
            return u32::from_str_radix(digits, 16).ok().map(Tag::from_u32);
        }
        let bytes = name.as_bytes();
        if bytes.len() == 4 && bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Some(Tag([bytes[3], bytes[2], bytes[1], bytes[0]]));
        }
        None
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&tag_hex(&self.0))
    }
}

/// Identity of a resource across containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    /// Resource type.
    pub rtype: Tag,
    /// Group the resource belongs to.
    pub group: Tag,
    /// Class id (instance high), [`Tag::ZERO`] when absent.
    pub class_id: Tag,
    /// Instance within the group.
    pub instance: Tag,
}

impl ResourceKey {
    /// Creates a key from its four tags.
    pub fn new(rtype: Tag, group: Tag, class_id: Tag, instance: Tag) -> Self {
        Self {
            rtype,
            group,
            class_id,
            instance,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group {} class {} instance {}",
            self.rtype.mnemonic(),
            self.group,
            self.class_id,
            self.instance
        )
    }
}

/// One index entry: where a resource lives inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Resource identity.
    pub key: ResourceKey,
    /// Absolute offset of the payload in the container.
    pub offset: u32,
    /// Length of the payload in the container.
    pub length: u32,
}

impl ResourceDescriptor {
    /// Parses a descriptor from one stride-sized index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is shorter than [`MIN_ENTRY_SIZE`].
    pub fn parse(entry: &[u8]) -> Result<Self> {
        if entry.len() < MIN_ENTRY_SIZE {
            return Err(DbpfError::TruncatedData {
                offset: 0,
                expected: MIN_ENTRY_SIZE,
                actual: entry.len(),
            });
        }

        let rtype = Tag(read_tag_bytes(entry, 0)?);
        let group = Tag(read_tag_bytes(entry, 4)?);
        let instance = Tag(read_tag_bytes(entry, 8)?);
        let class_id = if entry.len() > CLASS_ID_THRESHOLD {
            Tag(read_tag_bytes(entry, 12)?)
        } else {
            Tag::ZERO
        };

        // Offset and length always sit in the last eight bytes.
        let tail = entry.len() - 8;
        let offset = read_u32_le(entry, tail)?;
        let length = read_u32_le(entry, tail + 4)?;

        Ok(ResourceDescriptor {
            key: ResourceKey::new(rtype, group, class_id, instance),
            offset,
            length,
        })
    }

    /// Returns the payload range as `usize` bounds.
    pub fn range(&self) -> (usize, usize) {
        let start = self.offset as usize;
        (start, start.saturating_add(self.length as usize))
    }
}

/// Iterator over the descriptors in a container's index.
pub struct IndexIterator<'a> {
    data: &'a [u8],
    position: usize,
    stride: usize,
    remaining: usize,
}

impl<'a> IndexIterator<'a> {
    /// Creates an iterator over the index described by `header`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the stride is too small to hold an entry.
    pub fn new(data: &'a [u8], header: &PackageHeader) -> Result<Self> {
        let stride = header.stride();
        if stride < MIN_ENTRY_SIZE {
            return Err(DbpfError::InvalidFormat(format!(
                "Index stride {} is smaller than {} bytes ({} entries in {} bytes)",
                stride, MIN_ENTRY_SIZE, header.entry_count, header.index_length
            )));
        }

        Ok(Self {
            data,
            position: header.index_offset as usize,
            stride,
            remaining: header.index_length as usize / stride,
        })
    }

    /// Returns the entry size in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl<'a> Iterator for IndexIterator<'a> {
    type Item = Result<ResourceDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let entry = match slice_at(self.data, self.position, self.stride) {
            Ok(entry) => entry,
            Err(e) => {
                // Nothing past a truncated entry can be read either.
                self.remaining = 0;
                return Some(Err(e));
            }
        };
        self.position += self.stride;

        Some(ResourceDescriptor::parse(entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Reads the header and every descriptor of a container.
///
/// # Errors
///
/// Returns `EmptyContainer` for a zero entry count, and format or truncation
/// errors when the index cannot be read in full.
pub fn descriptors(data: &[u8]) -> Result<Vec<ResourceDescriptor>> {
    let header = PackageHeader::parse(data)?;
    IndexIterator::new(data, &header)?.collect()
}
