//! Field-level comparison of two versions of a resource.
//!
//! Behaviour and constant resources are tables of 16-bit little-endian
//! fields after a fixed-size header. Comparing two versions field by field
//! shows which values a mod changed.

use crate::index::Tag;
use crate::utils::slice_clamped;
use std::fmt;

/// Where the field table starts inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum RecordLayout {
    /// Fields start after a 64-byte header.
    Standard = 64,
    /// Fields start after a 66-byte header (BCON).
    Extended = 66,
}

impl RecordLayout {
    /// Picks the layout used by resources of type `rtype`.
    pub fn for_type(rtype: Tag) -> Self {
        if rtype == Tag::BCON {
            RecordLayout::Extended
        } else {
            RecordLayout::Standard
        }
    }

    /// Byte offset of the first field.
    pub fn offset(self) -> usize {
        self as usize
    }
}

/// One changed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldChange {
    /// Field index counted from the layout offset.
    pub field: usize,
    /// Value in the old version.
    pub old: i32,
    /// Value in the new version.
    pub new: i32,
}

/// Interprets a stored field as a signed value.
///
/// Values at or above 2^15 have 2^16 - 1 subtracted, so `0xFFFF` reads as 0
/// and `0x8000` as -32767. Existing reports depend on this mapping.
pub fn signed_field(raw: u16) -> i32 {
    let value = i32::from(raw);
    if value >= 1 << 15 {
        value - ((1 << 16) - 1)
    } else {
        value
    }
}

/// Reads the field at `offset`, using only the bytes that exist.
///
/// A field cut short by the end of the buffer reads as its low byte.
fn field_at(data: &[u8], offset: usize) -> u16 {
    match *slice_clamped(data, offset, 2) {
        [lo, hi] => u16::from_le_bytes([lo, hi]),
        [lo] => u16::from(lo),
        _ => 0,
    }
}

/// Compares the fields of two versions up to the shorter length.
///
/// When the shorter length is odd, the last field is partial: one byte is
/// read from the shorter version and up to two from the other.
pub fn diff_fields(old: &[u8], new: &[u8], layout: RecordLayout) -> Vec<FieldChange> {
    let start = layout.offset();
    let end = old.len().min(new.len());

    (start..end)
        .step_by(2)
        .enumerate()
        .filter_map(|(field, offset)| {
            let old = signed_field(field_at(old, offset));
            let new = signed_field(field_at(new, offset));
            (old != new).then_some(FieldChange { field, old, new })
        })
        .collect()
}

/// Result of comparing the stored versions of a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VersionDiff {
    /// Whether there were two versions to compare.
    pub compared: bool,
    /// Changed fields in index order.
    pub changes: Vec<FieldChange>,
}

impl VersionDiff {
    /// Compares the first two of `versions`.
    ///
    /// The second version is the old side and the first is the new side.
    /// With fewer than two versions there is nothing to compare.
    pub fn from_versions(versions: &[Vec<u8>], rtype: Tag) -> Self {
        match versions {
            [new, old, ..] => VersionDiff {
                compared: true,
                changes: diff_fields(old, new, RecordLayout::for_type(rtype)),
            },
            _ => VersionDiff::default(),
        }
    }

    /// Returns true if no field changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for VersionDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.compared {
            return write!(f, "No differences found.");
        }
        writeln!(f, "Changed Lines:")?;
        for change in &self.changes {
            writeln!(
                f,
                "Line:\t{}\tValue:\t{}\t->\t{}",
                change.field, change.old, change.new
            )?;
        }
        Ok(())
    }
}
