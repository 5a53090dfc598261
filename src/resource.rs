//! Resource payload extraction at a chosen fetch depth.

use crate::compression::decompress;
use crate::error::{DbpfError, Result};
use crate::index::{ResourceDescriptor, ResourceKey};
use crate::utils::{read_cstr, slice_at, slice_clamped};
use std::fmt;
use tracing::{debug, warn};

/// Bytes read (and decoded) by the cheap fetch depths.
pub const PREFIX_LEN: usize = 74;

/// Bytes searched for a resource's embedded name.
pub const NAME_LEN: usize = 64;

/// How much of a resource to read and decode.
///
/// Full decompression of every resource in a large library dominates the
/// cost of a scan, so each query picks the cheapest depth that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchDepth {
    /// Raw first [`PREFIX_LEN`] bytes, never decompressed, no name.
    KeyOnly,
    /// First [`PREFIX_LEN`] bytes, decompressed to at most [`PREFIX_LEN`] bytes.
    Prefix,
    /// Whole payload, fully decompressed.
    #[default]
    Full,
    /// Whole payload, decompressed up to the given number of bytes.
    Limit(usize),
}

impl FetchDepth {
    /// Returns the decompression cutoff for this depth.
    pub fn cutoff(self) -> Option<usize> {
        match self {
            FetchDepth::KeyOnly | FetchDepth::Prefix => Some(PREFIX_LEN),
            FetchDepth::Full => None,
            FetchDepth::Limit(limit) => Some(limit),
        }
    }

    /// Returns true if only the payload prefix is read from the container.
    pub fn reads_prefix(self) -> bool {
        matches!(self, FetchDepth::KeyOnly | FetchDepth::Prefix)
    }
}

/// A resource read from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource identity.
    pub key: ResourceKey,

    /// Payload bytes, decompressed when the payload was compressed.
    pub contents: Vec<u8>,

    /// Name embedded at the start of the contents, if readable.
    pub name: Option<String>,

    /// Whether the stored payload was compressed.
    pub compressed: bool,
}

impl Resource {
    /// Reads the resource described by `descriptor` from `package`.
    ///
    /// A payload counts as compressed when its first four bytes, read as a
    /// little-endian integer, equal the descriptor's length. Truncated
    /// compressed streams keep whatever was decoded.
    ///
    /// # Errors
    ///
    /// Returns `TruncatedData` if the payload starts past the end of the
    /// container or, for the whole-payload depths, ends past it.
    pub fn read(package: &[u8], descriptor: &ResourceDescriptor, depth: FetchDepth) -> Result<Self> {
        let (start, _) = descriptor.range();
        let length = descriptor.length as usize;

        let raw = if depth.reads_prefix() {
            if start > package.len() {
                return Err(DbpfError::truncated(start, length, package.len()));
            }
            slice_clamped(package, start, PREFIX_LEN.min(length))
        } else {
            slice_at(package, start, length)?
        };

        if depth == FetchDepth::KeyOnly {
            return Ok(Resource {
                key: descriptor.key,
                contents: raw.to_vec(),
                name: None,
                compressed: false,
            });
        }

        let compressed = raw.len() >= 4
            && u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) == descriptor.length;

        let contents = if compressed {
            let decoded = decompress(raw, depth.cutoff());
            if !decoded.is_intact() {
                if depth.reads_prefix() {
                    debug!(key = %descriptor.key, status = ?decoded.status, "Prefix decode ended early");
                } else {
                    warn!(
                        key = %descriptor.key,
                        status = ?decoded.status,
                        decoded = decoded.data.len(),
                        "Truncated compressed resource, keeping partial contents"
                    );
                }
            }
            decoded.data
        } else {
            raw.to_vec()
        };

        let name = read_cstr(slice_clamped(&contents, 0, NAME_LEN));

        Ok(Resource {
            key: descriptor.key,
            contents,
            name,
            compressed,
        })
    }

    /// Builds a resource from a file holding a single extracted payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the payload is too large to describe with
    /// a 32-bit length.
    pub fn from_standalone(key: ResourceKey, bytes: &[u8]) -> Result<Self> {
        let length = u32::try_from(bytes.len()).map_err(|_| {
            DbpfError::InvalidFormat(format!("Resource of {} bytes is too large", bytes.len()))
        })?;
        let descriptor = ResourceDescriptor {
            key,
            offset: 0,
            length,
        };
        Self::read(bytes, &descriptor, FetchDepth::Full)
    }

    /// Returns the printable summary of this resource.
    pub fn summary(&self) -> Summary<'_> {
        Summary {
            name: self.name.as_deref(),
            key: &self.key,
        }
    }
}

/// Name and key lines shared by resource listings.
#[derive(Debug, Clone, Copy)]
pub struct Summary<'a> {
    /// Embedded name, printed first when present.
    pub name: Option<&'a str>,
    /// Key whose type, group and instance are printed.
    pub key: &'a ResourceKey,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name {
            writeln!(f, "{}", name)?;
        }
        writeln!(f, "File Type: {}", self.key.rtype.mnemonic())?;
        writeln!(f, "Group ID: {}", self.key.group)?;
        writeln!(f, "Instance ID: {}", self.key.instance)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
