//! DBPF container header parsing.
//!
//! The header is the first 96 bytes of a `.package` file. Only the three
//! index fields are needed to enumerate resources; the rest is kept for
//! display.

use crate::error::{DbpfError, Result};
use crate::utils::{read_tag_bytes, read_u32_le};
use std::fmt;

/// Size of the header written by [`PackageWriter`](crate::writer::PackageWriter).
pub const HEADER_SIZE: usize = 96;

/// Magic signature at the start of a package ("DBPF").
pub const DBPF_SIGNATURE: &[u8; 4] = b"DBPF";

/// Offset of the index entry count.
pub const ENTRY_COUNT_OFFSET: usize = 36;

/// Offset of the index table start.
pub const INDEX_OFFSET_OFFSET: usize = 40;

/// Offset of the index table length in bytes.
pub const INDEX_LENGTH_OFFSET: usize = 44;

/// Offset of the index major version.
pub const INDEX_MAJOR_OFFSET: usize = 0x20;

/// Offset of the index minor version (2 means entries carry a class id).
pub const INDEX_MINOR_OFFSET: usize = 0x3C;

/// Smallest buffer that holds every field this reader needs.
const MIN_HEADER_LEN: usize = INDEX_LENGTH_OFFSET + 4;

/// DBPF container header.
#[derive(Debug, Clone)]
pub struct PackageHeader {
    /// Signature, normally "DBPF". Not validated.
    pub signature: [u8; 4],

    /// Major file format version.
    pub major_version: u32,

    /// Minor file format version.
    pub minor_version: u32,

    /// Index major version (7 for The Sims 2).
    pub index_major_version: u32,

    /// Number of entries in the index table.
    pub entry_count: u32,

    /// Absolute offset of the index table.
    pub index_offset: u32,

    /// Length of the index table in bytes.
    pub index_length: u32,

    /// Index minor version, zero when the header is too short to carry it.
    pub index_minor_version: u32,
}

impl PackageHeader {
    /// Parses a header from the start of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Data is too small to hold the index fields
    /// - The entry count is zero (`EmptyContainer`)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_HEADER_LEN {
            return Err(DbpfError::TruncatedData {
                offset: 0,
                expected: MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let signature = read_tag_bytes(data, 0x00)?;
        let major_version = read_u32_le(data, 0x04)?;
        let minor_version = read_u32_le(data, 0x08)?;
        let index_major_version = read_u32_le(data, INDEX_MAJOR_OFFSET)?;
        let entry_count = read_u32_le(data, ENTRY_COUNT_OFFSET)?;
        let index_offset = read_u32_le(data, INDEX_OFFSET_OFFSET)?;
        let index_length = read_u32_le(data, INDEX_LENGTH_OFFSET)?;
        let index_minor_version = read_u32_le(data, INDEX_MINOR_OFFSET).unwrap_or(0);

        if entry_count == 0 {
            return Err(DbpfError::EmptyContainer);
        }

        Ok(PackageHeader {
            signature,
            major_version,
            minor_version,
            index_major_version,
            entry_count,
            index_offset,
            index_length,
            index_minor_version,
        })
    }

    /// Returns the size in bytes of one index entry.
    pub fn stride(&self) -> usize {
        (self.index_length / self.entry_count) as usize
    }

    /// Returns true if the signature reads "DBPF".
    pub fn has_signature(&self) -> bool {
        &self.signature == DBPF_SIGNATURE
    }
}

impl fmt::Display for PackageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Package Header:\n\
             - Version: {}.{}\n\
             - Index Version: {}.{}\n\
             - Entries: {}\n\
             - Index Offset: {:#x}\n\
             - Index Length: {} bytes",
            self.major_version,
            self.minor_version,
            self.index_major_version,
            self.index_minor_version,
            self.entry_count,
            self.index_offset,
            self.index_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(count: u32, offset: u32, length: u32) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(DBPF_SIGNATURE);
        data[4..8].copy_from_slice(&1u32.to_le_bytes());
        data[8..12].copy_from_slice(&1u32.to_le_bytes());
        data[36..40].copy_from_slice(&count.to_le_bytes());
        data[40..44].copy_from_slice(&offset.to_le_bytes());
        data[44..48].copy_from_slice(&length.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_index_fields() {
        let header = PackageHeader::parse(&header_bytes(3, 0x200, 72)).unwrap();
        assert!(header.has_signature());
        assert_eq!(header.entry_count, 3);
        assert_eq!(header.index_offset, 0x200);
        assert_eq!(header.stride(), 24);
    }

    #[test]
    fn test_empty_container() {
        let result = PackageHeader::parse(&header_bytes(0, 0x60, 0));
        assert!(matches!(result.unwrap_err(), DbpfError::EmptyContainer));
    }

    #[test]
    fn test_too_small() {
        let result = PackageHeader::parse(&[0u8; 20]);
        assert!(matches!(result.unwrap_err(), DbpfError::TruncatedData { .. }));
    }

    #[test]
    fn test_short_header_has_no_index_minor() {
        let data = header_bytes(1, 0x60, 20);
        let header = PackageHeader::parse(&data[..MIN_HEADER_LEN]).unwrap();
        assert_eq!(header.index_minor_version, 0);
    }
}
