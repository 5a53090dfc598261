//! Resource payload compression (the RefPack-style LZ77 variant).
//!
//! A compressed payload starts with a 9-byte preamble followed by control
//! codes. Each code carries a run of literal bytes and, for the first three
//! shapes, a back-reference into the output produced so far:
//!
//! ```text
//! Byte 0      Size  Literals              Copy length                 Distance
//! 0x00-0x7F   2     b0 & 3                ((b0 >> 2) & 7) + 3         ((b0 & 0x60) << 3) + b1 + 1
//! 0x80-0xBF   3     (b1 >> 6) & 3         (b0 & 0x3F) + 4             ((b1 & 0x3F) << 8) + b2 + 1
//! 0xC0-0xDF   4     b0 & 3                ((b0 & 0x0C) << 6) + b3 + 5 ((b0 & 0x10) << 12) + (b1 << 8) + b2 + 1
//! 0xE0-0xFB   1     ((b0 & 0x1F) + 1) * 4 -                           -
//! 0xFC-0xFF   1     b0 & 3 (then stop)    -                           -
//! ```
//!
//! The preamble written by the game (and by [`compress`]) is the u32 LE
//! total compressed size, the id `0x10 0xFB`, and the u24 BE uncompressed
//! size. The decoder only skips it.

use crate::error::{DbpfError, Result};
use std::collections::HashMap;
use tracing::trace;

/// Bytes skipped before the first control code.
pub const PREAMBLE_LEN: usize = 9;

/// Compression id following the size field in the preamble.
pub const COMPRESSION_ID: [u8; 2] = [0x10, 0xFB];

/// Largest uncompressed size the preamble can describe.
pub const MAX_UNCOMPRESSED_SIZE: usize = 0x00FF_FFFF;

/// Upper bound on the output buffer reserved from an untrusted preamble.
const MAX_PREALLOCATION: usize = 1 << 20;

/// How a decode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// The terminal control code was reached.
    Complete,
    /// The output reached the caller's cutoff first.
    CutOff,
    /// The input ended before the terminal code.
    Truncated {
        /// Input offset where decoding stopped.
        offset: usize,
    },
    /// A back-reference pointed before the start of the output.
    BadReference {
        /// Input offset of the offending control code.
        offset: usize,
        /// Requested distance.
        distance: usize,
        /// Output bytes available at that point.
        available: usize,
    },
}

/// Output of [`decompress`]: the bytes decoded and why decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    /// Decoded bytes. Always a prefix of the full decode.
    pub data: Vec<u8>,
    /// Reason decoding stopped.
    pub status: StreamStatus,
}

impl Decompressed {
    /// Returns true unless the stream was truncated or malformed.
    pub fn is_intact(&self) -> bool {
        matches!(self.status, StreamStatus::Complete | StreamStatus::CutOff)
    }

    /// Converts to a strict result, rejecting truncated or malformed streams.
    ///
    /// # Errors
    ///
    /// Returns `TruncatedStream` if decoding stopped early for any reason
    /// other than the caller's cutoff.
    pub fn into_result(self) -> Result<Vec<u8>> {
        match self.status {
            StreamStatus::Complete | StreamStatus::CutOff => Ok(self.data),
            StreamStatus::Truncated { offset } | StreamStatus::BadReference { offset, .. } => {
                Err(DbpfError::TruncatedStream {
                    offset,
                    decoded: self.data.len(),
                })
            }
        }
    }
}

/// One decoded control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlCode {
    /// Bytes the code itself occupies.
    width: usize,
    literals: usize,
    copy: usize,
    distance: usize,
    terminal: bool,
}

impl ControlCode {
    /// Reads the control code at the start of `input`, or `None` if the
    /// input ends inside it.
    fn read(input: &[u8]) -> Option<Self> {
        let b0 = *input.first()? as usize;
        let code = match b0 {
            0x00..=0x7F => {
                let b1 = *input.get(1)? as usize;
                ControlCode {
                    width: 2,
                    literals: b0 & 0x03,
                    copy: ((b0 >> 2) & 0x07) + 3,
                    distance: ((b0 & 0x60) << 3) + b1 + 1,
                    terminal: false,
                }
            }
            0x80..=0xBF => {
                let b1 = *input.get(1)? as usize;
                let b2 = *input.get(2)? as usize;
                ControlCode {
                    width: 3,
                    literals: (b1 >> 6) & 0x03,
                    copy: (b0 & 0x3F) + 4,
                    distance: ((b1 & 0x3F) << 8) + b2 + 1,
                    terminal: false,
                }
            }
            0xC0..=0xDF => {
                let b1 = *input.get(1)? as usize;
                let b2 = *input.get(2)? as usize;
                let b3 = *input.get(3)? as usize;
                ControlCode {
                    width: 4,
                    literals: b0 & 0x03,
                    copy: ((b0 & 0x0C) << 6) + b3 + 5,
                    distance: ((b0 & 0x10) << 12) + (b1 << 8) + b2 + 1,
                    terminal: false,
                }
            }
            0xE0..=0xFB => ControlCode {
                width: 1,
                literals: ((b0 & 0x1F) + 1) << 2,
                copy: 0,
                distance: 0,
                terminal: false,
            },
            _ => ControlCode {
                width: 1,
                literals: b0 & 0x03,
                copy: 0,
                distance: 0,
                terminal: true,
            },
        };
        Some(code)
    }
}

/// Reads the uncompressed size from a game-style preamble, if present.
pub fn declared_size(input: &[u8]) -> Option<usize> {
    if input.len() < PREAMBLE_LEN || input[4..6] != COMPRESSION_ID {
        return None;
    }
    Some(((input[6] as usize) << 16) | ((input[7] as usize) << 8) | input[8] as usize)
}

/// Decompresses a payload, stopping once `cutoff` output bytes exist.
///
/// The cutoff is checked between control codes, so the output may run a
/// little past it; it is always a prefix of the uncut decode. Malformed
/// input never panics: decoding stops and the partial output is returned
/// with a status saying why.
pub fn decompress(input: &[u8], cutoff: Option<usize>) -> Decompressed {
    let capacity = declared_size(input)
        .unwrap_or(input.len() * 2)
        .min(cutoff.map_or(usize::MAX, |limit| limit.saturating_add(MAX_COPY)))
        .min(MAX_PREALLOCATION);
    let mut out: Vec<u8> = Vec::with_capacity(capacity);
    let mut pos = PREAMBLE_LEN;

    let status = loop {
        if cutoff.is_some_and(|limit| out.len() >= limit) {
            break StreamStatus::CutOff;
        }

        let code = match input.get(pos..).and_then(ControlCode::read) {
            Some(code) => code,
            None => break StreamStatus::Truncated { offset: pos.min(input.len()) },
        };
        let code_offset = pos;
        pos += code.width;

        let literal_end = pos + code.literals;
        if literal_end > input.len() {
            out.extend_from_slice(&input[pos.min(input.len())..]);
            break StreamStatus::Truncated { offset: input.len() };
        }
        out.extend_from_slice(&input[pos..literal_end]);
        pos = literal_end;

        if code.copy > 0 {
            if code.distance > out.len() {
                break StreamStatus::BadReference {
                    offset: code_offset,
                    distance: code.distance,
                    available: out.len(),
                };
            }
            // The source may overlap the bytes being appended, so copy one
            // byte at a time.
            for _ in 0..code.copy {
                let byte = out[out.len() - code.distance];
                out.push(byte);
            }
        }

        if code.terminal {
            break StreamStatus::Complete;
        }
    };

    trace!(input = input.len(), output = out.len(), ?status, "Decompressed payload");
    Decompressed { data: out, status }
}

/// Longest back-reference any control code can express.
const MAX_COPY: usize = 1028;

/// Farthest back-reference any control code can express.
const MAX_DISTANCE: usize = 0x20000;

/// Longest literal run a single literal-only code can carry.
const MAX_LITERAL_RUN: usize = 112;

/// Candidates examined per position by the match finder.
const MAX_CHAIN: usize = 32;

/// Compresses `data` into a complete payload, preamble included.
///
/// This is a straightforward greedy encoder. Its output is not byte-identical
/// to the game's, but any decoder of the format reads it back exactly.
///
/// # Errors
///
/// Returns `InvalidFormat` if `data` is larger than the preamble's 24-bit
/// size field can describe.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_UNCOMPRESSED_SIZE {
        return Err(DbpfError::InvalidFormat(format!(
            "Cannot compress {} bytes (maximum {})",
            data.len(),
            MAX_UNCOMPRESSED_SIZE
        )));
    }

    let mut out = Vec::with_capacity(PREAMBLE_LEN + data.len() + data.len() / 64 + 2);
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&COMPRESSION_ID);
    let size = data.len() as u32;
    out.extend_from_slice(&[(size >> 16) as u8, (size >> 8) as u8, size as u8]);

    let mut chains: HashMap<[u8; 3], Vec<usize>> = HashMap::new();
    let mut pos = 0;
    let mut literal_start = 0;

    while pos < data.len() {
        match find_match(data, pos, &chains) {
            Some((copy, distance)) => {
                let literals = flush_literals(&mut out, &data[literal_start..pos]);
                emit_copy(&mut out, literals, copy, distance);
                for p in pos..pos + copy {
                    remember(&mut chains, data, p);
                }
                pos += copy;
                literal_start = pos;
            }
            None => {
                remember(&mut chains, data, pos);
                pos += 1;
            }
        }
    }

    let tail = flush_literals(&mut out, &data[literal_start..]);
    out.push(0xFC | tail.len() as u8);
    out.extend_from_slice(tail);

    let total = out.len() as u32;
    out[0..4].copy_from_slice(&total.to_le_bytes());
    Ok(out)
}

/// Records position `p` in the match-finder chains.
fn remember(chains: &mut HashMap<[u8; 3], Vec<usize>>, data: &[u8], p: usize) {
    if p + 3 <= data.len() {
        chains.entry([data[p], data[p + 1], data[p + 2]]).or_default().push(p);
    }
}

/// Returns the longest encodable (copy length, distance) at `pos`.
fn find_match(data: &[u8], pos: usize, chains: &HashMap<[u8; 3], Vec<usize>>) -> Option<(usize, usize)> {
    if pos + 3 > data.len() {
        return None;
    }
    let candidates = chains.get(&[data[pos], data[pos + 1], data[pos + 2]])?;
    let limit = (data.len() - pos).min(MAX_COPY);

    let mut best: Option<(usize, usize)> = None;
    for &candidate in candidates.iter().rev().take(MAX_CHAIN) {
        let distance = pos - candidate;
        if distance > MAX_DISTANCE {
            break;
        }
        let mut len = 0;
        while len < limit && data[candidate + len] == data[pos + len] {
            len += 1;
        }
        let usable = encodable_length(len, distance);
        if usable > best.map_or(0, |(l, _)| l) {
            best = Some((usable, distance));
        }
        if usable == MAX_COPY {
            break;
        }
    }
    best
}

/// Trims a match to what some control code can express, zero if none can.
fn encodable_length(len: usize, distance: usize) -> usize {
    match len {
        0..=2 => 0,
        3 if distance <= 1024 => 3,
        3 => 0,
        4 if distance <= 16384 => 4,
        4 => 0,
        _ => len.min(MAX_COPY),
    }
}

/// Writes literal-only codes until at most three literals remain, and
/// returns those for the next code to carry.
fn flush_literals<'a>(out: &mut Vec<u8>, mut literals: &'a [u8]) -> &'a [u8] {
    while literals.len() > 3 {
        let run = (literals.len() & !3).min(MAX_LITERAL_RUN);
        out.push(0xE0 | ((run >> 2) - 1) as u8);
        out.extend_from_slice(&literals[..run]);
        literals = &literals[run..];
    }
    literals
}

/// Writes the smallest control code carrying `literals` and a copy.
fn emit_copy(out: &mut Vec<u8>, literals: &[u8], copy: usize, distance: usize) {
    let lit = literals.len();
    let d = distance - 1;
    if copy <= 10 && distance <= 1024 {
        out.push((((d >> 3) & 0x60) | ((copy - 3) << 2) | lit) as u8);
        out.push(d as u8);
    } else if copy <= 67 && distance <= 16384 {
        out.push((0x80 | (copy - 4)) as u8);
        out.push(((lit << 6) | (d >> 8)) as u8);
        out.push(d as u8);
    } else {
        let c = copy - 5;
        out.push((0xC0 | ((d >> 12) & 0x10) | ((c >> 6) & 0x0C) | lit) as u8);
        out.push((d >> 8) as u8);
        out.push(d as u8);
        out.push(c as u8);
    }
    out.extend_from_slice(literals);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codes: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; PREAMBLE_LEN];
        data.extend_from_slice(codes);
        data
    }

    #[test]
    fn test_literal_run_and_terminal() {
        // 4 literals via 0xE0, then terminal with 2 literals.
        let input = stream(&[0xE0, b'a', b'b', b'c', b'd', 0xFE, b'e', b'f']);
        let out = decompress(&input, None);
        assert_eq!(out.status, StreamStatus::Complete);
        assert_eq!(out.data, b"abcdef");
    }

    #[test]
    fn test_two_byte_code_overlapping_copy() {
        // 1 literal 'x', then copy 3 bytes from distance 1 -> "xxxx".
        let input = stream(&[0x01, 0x00, b'x', 0xFC]);
        let out = decompress(&input, None);
        assert_eq!(out.data, b"xxxx");
        assert!(out.is_intact());
    }

    #[test]
    fn test_three_byte_code() {
        // 2 literals "ab", copy 4 from distance 2 -> "ababab".
        let input = stream(&[0x80, 0x80, 0x01, b'a', b'b', 0xFC]);
        assert_eq!(decompress(&input, None).data, b"ababab");
    }

    #[test]
    fn test_four_byte_code() {
        // 3 literals "abc", copy 5 from distance 3 -> "abcabcab".
        let input = stream(&[0xC3, 0x00, 0x02, 0x00, b'a', b'b', b'c', 0xFC]);
        assert_eq!(decompress(&input, None).data, b"abcabcab");
    }

    #[test]
    fn test_cutoff_stops_early() {
        let input = stream(&[0xE0, b'a', b'b', b'c', b'd', 0xE0, b'e', b'f', b'g', b'h', 0xFC]);
        let out = decompress(&input, Some(4));
        assert_eq!(out.status, StreamStatus::CutOff);
        assert_eq!(out.data, b"abcd");
    }

    #[test]
    fn test_zero_cutoff_decodes_nothing() {
        let input = stream(&[0xE0, b'a', b'b', b'c', b'd', 0xFC]);
        let out = decompress(&input, Some(0));
        assert!(out.data.is_empty());
        assert_eq!(out.status, StreamStatus::CutOff);
    }

    #[test]
    fn test_truncated_literal_run_keeps_partial_bytes() {
        let input = stream(&[0xE0, b'a', b'b']);
        let out = decompress(&input, None);
        assert_eq!(out.data, b"ab");
        assert!(matches!(out.status, StreamStatus::Truncated { .. }));
        assert!(matches!(out.into_result(), Err(DbpfError::TruncatedStream { decoded: 2, .. })));
    }

    #[test]
    fn test_missing_terminal() {
        let input = stream(&[0xE0, b'a', b'b', b'c', b'd']);
        let out = decompress(&input, None);
        assert_eq!(out.data, b"abcd");
        assert_eq!(out.status, StreamStatus::Truncated { offset: input.len() });
    }

    #[test]
    fn test_partial_control_code() {
        let input = stream(&[0xC0, 0x00]);
        let out = decompress(&input, None);
        assert!(out.data.is_empty());
        assert_eq!(out.status, StreamStatus::Truncated { offset: PREAMBLE_LEN });
    }

    #[test]
    fn test_bad_reference() {
        // Copy from distance 5 with nothing decoded yet.
        let input = stream(&[0x00, 0x04, 0xFC]);
        let out = decompress(&input, None);
        assert!(out.data.is_empty());
        assert!(matches!(out.status, StreamStatus::BadReference { distance: 5, available: 0, .. }));
    }

    #[test]
    fn test_shorter_than_preamble() {
        let out = decompress(&[1, 2, 3], None);
        assert!(out.data.is_empty());
        assert!(!out.is_intact());
    }

    #[test]
    fn test_compress_preamble() {
        let data = b"hello hello hello hello";
        let packed = compress(data).unwrap();
        assert_eq!(u32::from_le_bytes([packed[0], packed[1], packed[2], packed[3]]) as usize, packed.len());
        assert_eq!(&packed[4..6], &COMPRESSION_ID);
        assert_eq!(declared_size(&packed), Some(data.len()));
    }

    #[test]
    fn test_round_trip_repetitive() {
        let data: Vec<u8> = b"BCON".iter().cycle().take(5000).copied().collect();
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len() / 4);
        let out = decompress(&packed, None);
        assert_eq!(out.status, StreamStatus::Complete);
        assert_eq!(out.data, data);
    }

    #[test]
    fn test_round_trip_far_references() {
        // A block repeated 40 KiB later needs the 4-byte code.
        let block: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        let mut data = block.clone();
        data.extend((0..40_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8));
        data.extend_from_slice(&block);
        let packed = compress(&data).unwrap();
        assert_eq!(decompress(&packed, None).data, data);
    }

    #[test]
    fn test_round_trip_empty() {
        let packed = compress(&[]).unwrap();
        let out = decompress(&packed, None);
        assert!(out.data.is_empty());
        assert_eq!(out.status, StreamStatus::Complete);
    }

    #[test]
    fn test_encodable_length() {
        assert_eq!(encodable_length(3, 1024), 3);
        assert_eq!(encodable_length(3, 1025), 0);
        assert_eq!(encodable_length(4, 16384), 4);
        assert_eq!(encodable_length(4, 16385), 0);
        assert_eq!(encodable_length(2000, 100_000), MAX_COPY);
    }
}
