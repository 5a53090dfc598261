//! Utility functions for binary parsing and byte-string handling.

use crate::error::{DbpfError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use memchr::memmem;
use std::io::Cursor;

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice_at(data, offset, 4)?;
    let mut cursor = Cursor::new(bytes);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = slice_at(data, offset, 2)?;
    let mut cursor = Cursor::new(bytes);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads four raw bytes at the given offset without interpreting them.
pub fn read_tag_bytes(data: &[u8], offset: usize) -> Result<[u8; 4]> {
    let bytes = slice_at(data, offset, 4)?;
    let mut tag = [0u8; 4];
    tag.copy_from_slice(bytes);
    Ok(tag)
}

/// Returns `len` bytes starting at `offset`, or a truncation error.
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(DbpfError::truncated(offset, len, data.len())),
    }
}

/// Returns up to `len` bytes starting at `offset`, clamped to the buffer.
pub fn slice_clamped(data: &[u8], offset: usize, len: usize) -> &[u8] {
    let start = offset.min(data.len());
    let end = offset.saturating_add(len).min(data.len());
    &data[start..end]
}

/// Reads a NUL-terminated UTF-8 string from the start of `data`.
///
/// Returns `None` when the bytes before the terminator are not valid UTF-8.
pub fn read_cstr(data: &[u8]) -> Option<String> {
    let end = memchr::memchr(0, data).unwrap_or(data.len());
    std::str::from_utf8(&data[..end]).ok().map(str::to_owned)
}

/// Splits `data` on every non-overlapping occurrence of `delimiter`.
///
/// Mirrors byte-string splitting: an empty input yields one empty piece and
/// adjacent delimiters yield empty pieces between them.
pub fn split_on<'a>(data: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for pos in memmem::find_iter(data, delimiter) {
        pieces.push(&data[start..pos]);
        start = pos + delimiter.len();
    }
    pieces.push(&data[start..]);
    pieces
}

/// Returns true if `needle` occurs anywhere in `haystack`.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    memmem::find(haystack, needle).is_some()
}

/// Formats four stored bytes as the `0x`-prefixed hex of their little-endian value.
pub fn tag_hex(tag: &[u8; 4]) -> String {
    let mut reversed = *tag;
    reversed.reverse();
    format!("0x{}", hex::encode(reversed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_le() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 0x04030201);
    }

    #[test]
    fn test_read_u32_le_truncated() {
        let data = [0x01, 0x02, 0x03];
        let err = read_u32_le(&data, 0).unwrap_err();
        assert!(matches!(
            err,
            DbpfError::TruncatedData { offset: 0, expected: 4, actual: 3 }
        ));
        assert!(read_u32_le(&data, usize::MAX).is_err());
    }

    #[test]
    fn test_read_u16_le() {
        let data = [0x00, 0x34, 0x12];
        assert_eq!(read_u16_le(&data, 1).unwrap(), 0x1234);
    }

    #[test]
    fn test_slice_clamped() {
        let data = [1, 2, 3, 4, 5];
        assert_eq!(slice_clamped(&data, 3, 10), &[4, 5]);
        assert!(slice_clamped(&data, 9, 2).is_empty());
    }

    #[test]
    fn test_read_cstr() {
        assert_eq!(read_cstr(b"Lamp\0junk").as_deref(), Some("Lamp"));
        assert_eq!(read_cstr(b"NoTerminator").as_deref(), Some("NoTerminator"));
        assert_eq!(read_cstr(b"\xff\xfe\0"), None);
    }

    #[test]
    fn test_split_on() {
        let pieces = split_on(b"a\x00\x01bc\x00\x01", b"\x00\x01");
        assert_eq!(pieces, vec![&b"a"[..], &b"bc"[..], &b""[..]]);
        assert_eq!(split_on(b"", b"\x00\x01"), vec![&b""[..]]);
    }

    #[test]
    fn test_tag_hex() {
        assert_eq!(tag_hex(&[0x01, 0x00, 0x00, 0x7F]), "0x7f000001");
    }
}
