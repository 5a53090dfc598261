//! DBPF container writer.
//!
//! Produces version 1.1 containers: a 96-byte header, the payloads in
//! insertion order, then the index. Used to build fixtures and to repack
//! resources.

use crate::compression::compress;
use crate::error::{DbpfError, Result};
use crate::header::{
    DBPF_SIGNATURE, ENTRY_COUNT_OFFSET, HEADER_SIZE, INDEX_LENGTH_OFFSET, INDEX_MAJOR_OFFSET,
    INDEX_MINOR_OFFSET, INDEX_OFFSET_OFFSET,
};
use crate::index::{ResourceKey, MIN_ENTRY_SIZE};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Index major version written to the header.
const INDEX_MAJOR_VERSION: u32 = 7;

/// Entry size when class ids are written.
const EXTENDED_ENTRY_SIZE: usize = 24;

struct PendingResource {
    key: ResourceKey,
    data: Vec<u8>,
    compress: bool,
}

/// Builder for a DBPF container.
#[derive(Default)]
pub struct PackageWriter {
    resources: Vec<PendingResource>,
    class_ids: bool,
}

impl PackageWriter {
    /// Creates a writer producing 20-byte index entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes 24-byte index entries carrying each key's class id.
    pub fn with_class_ids(mut self) -> Self {
        self.class_ids = true;
        self
    }

    /// Adds a resource stored as-is.
    pub fn add(&mut self, key: ResourceKey, data: Vec<u8>) -> &mut Self {
        self.resources.push(PendingResource { key, data, compress: false });
        self
    }

    /// Adds a resource stored compressed.
    pub fn add_compressed(&mut self, key: ResourceKey, data: Vec<u8>) -> &mut Self {
        self.resources.push(PendingResource { key, data, compress: true });
        self
    }

    /// Returns the number of resources added so far.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if no resource has been added.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn entry_size(&self) -> usize {
        if self.class_ids {
            EXTENDED_ENTRY_SIZE
        } else {
            MIN_ENTRY_SIZE
        }
    }

    /// Assembles the container.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the container would exceed 4 GiB, or a
    /// compression error for payloads too large to compress.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; HEADER_SIZE];
        let mut index = Vec::with_capacity(self.resources.len() * self.entry_size());

        for pending in &self.resources {
            let stored = if pending.compress {
                compress(&pending.data)?
            } else {
                pending.data.clone()
            };
            let offset = to_u32(out.len())?;
            let length = to_u32(stored.len())?;
            out.extend_from_slice(&stored);

            let key = &pending.key;
            index.write_all(&key.rtype.0)?;
            index.write_all(&key.group.0)?;
            index.write_all(&key.instance.0)?;
            if self.class_ids {
                index.write_all(&key.class_id.0)?;
            }
            index.write_u32::<LittleEndian>(offset)?;
            index.write_u32::<LittleEndian>(length)?;
        }

        let index_offset = to_u32(out.len())?;
        let index_length = to_u32(index.len())?;
        out.extend_from_slice(&index);

        let mut header = &mut out[..HEADER_SIZE];
        header.write_all(DBPF_SIGNATURE)?;
        header.write_u32::<LittleEndian>(1)?;
        header.write_u32::<LittleEndian>(1)?;
        put_u32(&mut out, INDEX_MAJOR_OFFSET, INDEX_MAJOR_VERSION);
        put_u32(&mut out, ENTRY_COUNT_OFFSET, to_u32(self.resources.len())?);
        put_u32(&mut out, INDEX_OFFSET_OFFSET, index_offset);
        put_u32(&mut out, INDEX_LENGTH_OFFSET, index_length);
        put_u32(&mut out, INDEX_MINOR_OFFSET, if self.class_ids { 2 } else { 1 });

        debug!(resources = self.resources.len(), size = out.len(), "Built package");
        Ok(out)
    }

    /// Assembles the container and writes it to `path`.
    ///
    /// # Errors
    ///
    /// Returns the [`build`](Self::build) errors, or `UnreadableFile` if
    /// the file cannot be written.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.build()?;
        std::fs::write(path, bytes).map_err(|e| DbpfError::unreadable(path, e))
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DbpfError::InvalidFormat(format!("Package offset {} exceeds 32 bits", value)))
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::PackageHeader;
    use crate::index::{descriptors, Tag};
    use crate::resource::{FetchDepth, Resource};

    fn key(instance: u32) -> ResourceKey {
        ResourceKey::new(Tag::BCON, Tag::from_u32(0x7F00_0001), Tag::from_u32(0xABCD), Tag::from_u32(instance))
    }

    #[test]
    fn test_header_fields() {
        let mut writer = PackageWriter::new();
        writer.add(key(1), vec![1, 2, 3]).add(key(2), vec![4, 5]);
        let package = writer.build().unwrap();

        let header = PackageHeader::parse(&package).unwrap();
        assert!(header.has_signature());
        assert_eq!(header.entry_count, 2);
        assert_eq!(header.index_offset as usize, HEADER_SIZE + 5);
        assert_eq!(header.stride(), 20);
        assert_eq!(header.index_major_version, 7);
        assert_eq!(header.index_minor_version, 1);
    }

    #[test]
    fn test_descriptors_without_class_ids() {
        let mut writer = PackageWriter::new();
        writer.add(key(1), b"payload".to_vec());
        let package = writer.build().unwrap();

        let found = descriptors(&package).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.class_id, Tag::ZERO);
        assert_eq!(found[0].key.instance, Tag::from_u32(1));
        assert_eq!(found[0].offset as usize, HEADER_SIZE);
        assert_eq!(found[0].length, 7);
    }

    #[test]
    fn test_descriptors_with_class_ids() {
        let mut writer = PackageWriter::new().with_class_ids();
        writer.add(key(1), b"payload".to_vec());
        let package = writer.build().unwrap();

        let found = descriptors(&package).unwrap();
        assert_eq!(found[0].key, key(1));
        assert_eq!(PackageHeader::parse(&package).unwrap().index_minor_version, 2);
    }

    #[test]
    fn test_compressed_resource_reads_back() {
        let data: Vec<u8> = b"Compressed Name\0".iter().copied().chain((0..600).map(|i| (i % 13) as u8)).collect();
        let mut writer = PackageWriter::new();
        writer.add_compressed(key(1), data.clone());
        let package = writer.build().unwrap();

        let descriptor = descriptors(&package).unwrap()[0];
        let resource = Resource::read(&package, &descriptor, FetchDepth::Full).unwrap();
        assert!(resource.compressed);
        assert_eq!(resource.contents, data);
        assert_eq!(resource.name.as_deref(), Some("Compressed Name"));
    }

    #[test]
    fn test_empty_writer_builds_empty_container() {
        let package = PackageWriter::new().build().unwrap();
        assert_eq!(package.len(), HEADER_SIZE);
        assert!(PackageHeader::parse(&package).is_err());
    }
}
