//! Search filters applied while scanning containers.
//!
//! Key-level filters (type, group, instance) run against index entries
//! before any payload is read; resource-level filters (content, name) run
//! after the payload has been fetched at the scan's depth.

use crate::error::{DbpfError, Result};
use crate::index::{ResourceKey, Tag};
use crate::resource::Resource;
use crate::utils::contains_bytes;

/// Top byte shared by globally scoped groups.
pub const HIGH_GROUP_BYTE: u8 = 0x7F;

/// Group constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupFilter {
    /// Any group.
    #[default]
    Any,
    /// Exactly this group.
    Exact(Tag),
    /// Any group whose most significant byte equals this value.
    TopByteEquals(u8),
}

impl GroupFilter {
    /// Only globally scoped (`0x7F??????`) groups.
    pub fn global() -> Self {
        GroupFilter::TopByteEquals(HIGH_GROUP_BYTE)
    }

    /// Returns true if `group` satisfies the filter.
    pub fn matches(&self, group: Tag) -> bool {
        match *self {
            GroupFilter::Any => true,
            GroupFilter::Exact(expected) => group == expected,
            GroupFilter::TopByteEquals(byte) => group.top_byte() == byte,
        }
    }
}

/// Resource name constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameFilter {
    /// Any name.
    #[default]
    Any,
    /// Name contains this lower-case text (case-insensitive match).
    Contains(String),
    /// Name is none of these exact strings.
    Exclude(Vec<String>),
}

impl NameFilter {
    /// Creates a case-insensitive substring filter.
    pub fn contains(text: &str) -> Self {
        NameFilter::Contains(text.to_lowercase())
    }

    /// Returns true if `name` satisfies the filter.
    ///
    /// A resource without a readable name has the empty name.
    pub fn matches(&self, name: Option<&str>) -> bool {
        let name = name.unwrap_or("");
        match self {
            NameFilter::Any => true,
            NameFilter::Contains(needle) => name.to_lowercase().contains(needle.as_str()),
            NameFilter::Exclude(names) => !names.iter().any(|excluded| excluded == name),
        }
    }
}

/// Byte pattern that must occur in a resource's contents.
///
/// For text-bearing types the needle is expected in lower case and the
/// contents are lower-cased before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter(pub Vec<u8>);

impl ContentFilter {
    /// Returns true if the contents of a resource of type `rtype` match.
    pub fn matches(&self, rtype: Tag, contents: &[u8]) -> bool {
        if rtype.is_text() {
            contains_bytes(&contents.to_ascii_lowercase(), &self.0)
        } else {
            contains_bytes(contents, &self.0)
        }
    }
}

/// Everything a scan filters on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchFilter {
    /// Tracked resource types, in report order.
    pub types: Vec<Tag>,
    /// Group constraint.
    pub group: GroupFilter,
    /// Exact instance, if set.
    pub instance: Option<Tag>,
    /// Name constraint.
    pub name: NameFilter,
    /// Content constraint, if set.
    pub content: Option<ContentFilter>,
}

impl SearchFilter {
    /// Creates a filter tracking `types` with no other constraint.
    pub fn new(types: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            types: types.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the group constraint.
    pub fn with_group(mut self, group: GroupFilter) -> Self {
        self.group = group;
        self
    }

    /// Sets the instance constraint.
    pub fn with_instance(mut self, instance: Tag) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Sets the name constraint.
    pub fn with_name(mut self, name: NameFilter) -> Self {
        self.name = name;
        self
    }

    /// Sets the content constraint.
    pub fn with_content(mut self, content: ContentFilter) -> Self {
        self.content = Some(content);
        self
    }

    /// Returns true if resources of this type are tracked.
    pub fn tracks(&self, rtype: Tag) -> bool {
        self.types.contains(&rtype)
    }

    /// Checks the filters that need only the index entry.
    pub fn accepts_key(&self, key: &ResourceKey) -> bool {
        self.tracks(key.rtype)
            && self.group.matches(key.group)
            && self.instance.map_or(true, |instance| instance == key.instance)
    }

    /// Checks the filters that need the fetched payload.
    pub fn accepts_resource(&self, resource: &Resource) -> bool {
        if let Some(content) = &self.content {
            if !content.matches(resource.key.rtype, &resource.contents) {
                return false;
            }
        }
        self.name.matches(resource.name.as_deref())
    }
}

/// Strips an optional `0x` prefix and returns the lower-case hex digits.
fn hex_digits(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    match lower.rsplit_once('x') {
        Some((_, digits)) => digits.to_string(),
        None => lower,
    }
}

/// Parses hex digits into a tag holding their little-endian value.
fn parse_hex_tag(digits: &str, what: &str) -> Result<Tag> {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(digits, &mut bytes)
        .map_err(|e| DbpfError::InvalidFilter(format!("{} '{}': {}", what, digits, e)))?;
    bytes.reverse();
    Ok(Tag(bytes))
}

/// Parses a group typed as eight hex digits, with or without `0x`.
///
/// # Errors
///
/// Returns `InvalidFilter` for any other length or non-hex input.
pub fn parse_group(text: &str) -> Result<Tag> {
    let digits = hex_digits(text);
    if digits.len() != 8 {
        return Err(DbpfError::InvalidFilter(format!(
            "group must be 8 hex digits, got '{}'",
            text
        )));
    }
    parse_hex_tag(&digits, "group")
}

/// Parses an instance typed as four or eight hex digits.
///
/// Four digits are zero-padded on the left.
///
/// # Errors
///
/// Returns `InvalidFilter` for any other length or non-hex input.
pub fn parse_instance(text: &str) -> Result<Tag> {
    let digits = hex_digits(text);
    let digits = match digits.len() {
        4 => format!("0000{}", digits),
        8 => digits,
        _ => {
            return Err(DbpfError::InvalidFilter(format!(
                "instance must be 4 or 8 hex digits, got '{}'",
                text
            )))
        }
    };
    parse_hex_tag(&digits, "instance")
}

/// Parses a type mnemonic such as `BHAV`, `STR#` or `GZPS`.
///
/// # Errors
///
/// Returns `InvalidFilter` if the name is neither an alias nor four
/// printable characters.
pub fn parse_type(text: &str) -> Result<Tag> {
    Tag::from_mnemonic(text.trim())
        .ok_or_else(|| DbpfError::InvalidFilter(format!("unknown resource type '{}'", text)))
}

/// Builds a content filter from user text.
///
/// Text-bearing types search for the lower-cased text; every other type
/// takes the text as hex bytes.
///
/// # Errors
///
/// Returns `InvalidFilter` for odd-length or non-hex input on binary types.
pub fn parse_content(rtype: Option<Tag>, text: &str) -> Result<ContentFilter> {
    if rtype.is_some_and(Tag::is_text) {
        return Ok(ContentFilter(text.to_lowercase().into_bytes()));
    }
    if text.len() % 2 != 0 {
        return Err(DbpfError::InvalidFilter(format!(
            "content '{}' must be an even number of hex digits",
            text
        )));
    }
    hex::decode(text)
        .map(ContentFilter)
        .map_err(|e| DbpfError::InvalidFilter(format!("content '{}': {}", text, e)))
}
