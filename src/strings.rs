//! String-table cleanliness heuristic.
//!
//! Text lists (STR#, CTSS, TTAs) carry one record per language. A table
//! with untranslated, empty or irregular records is worth opening in an
//! editor; this module decides which tables to flag. The check over-flags
//! on purpose: anything the simple splitter cannot account for is reported.

use crate::resource::Resource;
use crate::utils::{read_u16_le, split_on};

/// Offset of the declared string count.
pub const COUNT_OFFSET: usize = 66;

/// Offset of the first string entry.
pub const ENTRIES_OFFSET: usize = 68;

/// Separator between consecutive entries.
const ENTRY_DELIMITER: &[u8] = &[0x00, 0x01];

/// Sentinel at the end of the last entry.
const TABLE_TERMINATOR: &[u8] = &[0x00, 0x00];

/// Why a string table was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FlagReason {
    /// The declared count is zero or unreadable.
    ZeroCount,
    /// An entry holds an embedded NUL before its end.
    NestedEntry,
    /// The number of parsed entries differs from the declared count.
    CountMismatch {
        /// Count stored in the table.
        declared: u16,
        /// Entries found by splitting.
        parsed: usize,
    },
    /// No entry is longer than one byte.
    EmptyEntries,
}

/// Verdict on a string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Classification {
    /// Nothing suspicious.
    Clean,
    /// Worth reviewing, for the given reason.
    Flagged(FlagReason),
}

impl Classification {
    /// Returns true for [`Classification::Flagged`].
    pub fn is_flagged(&self) -> bool {
        matches!(self, Classification::Flagged(_))
    }
}

/// Classifies decoded string-table contents.
pub fn classify_strings(contents: &[u8]) -> Classification {
    let declared = read_u16_le(contents, COUNT_OFFSET).unwrap_or(0);
    let body = contents.get(ENTRIES_OFFSET..).unwrap_or(&[]);

    let mut entries = split_on(body, ENTRY_DELIMITER);
    if let Some(last) = entries.last_mut() {
        if let Some(trimmed) = last.strip_suffix(TABLE_TERMINATOR) {
            *last = trimmed;
        }
    }

    if declared == 0 {
        return Classification::Flagged(FlagReason::ZeroCount);
    }

    let nested = entries.iter().any(|entry| {
        let end = entry.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        entry[..end].contains(&0)
    });
    if nested {
        return Classification::Flagged(FlagReason::NestedEntry);
    }

    if entries.len() != usize::from(declared) {
        return Classification::Flagged(FlagReason::CountMismatch {
            declared,
            parsed: entries.len(),
        });
    }

    if entries.iter().all(|entry| entry.len() <= 1) {
        return Classification::Flagged(FlagReason::EmptyEntries);
    }

    Classification::Clean
}

/// Returns true if `resource` is a string table worth reviewing.
pub fn needs_review(resource: &Resource) -> bool {
    classify_strings(&resource.contents).is_flagged()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(declared: u16, entries: &[&[u8]]) -> Vec<u8> {
        let mut data = vec![0u8; COUNT_OFFSET];
        data.extend_from_slice(&declared.to_le_bytes());
        data.extend_from_slice(&entries.join(ENTRY_DELIMITER));
        data.extend_from_slice(TABLE_TERMINATOR);
        data
    }

    #[test]
    fn test_clean_table() {
        let data = table(2, &[b"Sofa", b"A comfy sofa"]);
        assert_eq!(classify_strings(&data), Classification::Clean);
    }

    #[test]
    fn test_zero_count() {
        let data = table(0, &[b"Sofa"]);
        assert_eq!(classify_strings(&data), Classification::Flagged(FlagReason::ZeroCount));
    }

    #[test]
    fn test_count_mismatch() {
        let data = table(3, &[b"Sofa", b"Chair"]);
        assert_eq!(
            classify_strings(&data),
            Classification::Flagged(FlagReason::CountMismatch { declared: 3, parsed: 2 })
        );
    }

    #[test]
    fn test_empty_entries() {
        let data = table(2, &[b"", b"x"]);
        assert_eq!(classify_strings(&data), Classification::Flagged(FlagReason::EmptyEntries));
    }

    #[test]
    fn test_nested_entry() {
        let data = table(2, &[b"So\0fa", b"Chair"]);
        assert_eq!(classify_strings(&data), Classification::Flagged(FlagReason::NestedEntry));
    }

    #[test]
    fn test_trailing_nuls_are_not_nested() {
        let data = table(2, &[b"Sofa\0\0", b"Chair"]);
        assert_eq!(classify_strings(&data), Classification::Clean);
    }

    #[test]
    fn test_short_contents_flagged() {
        assert!(classify_strings(&[0u8; 10]).is_flagged());
    }
}
