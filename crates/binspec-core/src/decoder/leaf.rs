//! Self-contained decoders for the specialised node kinds.
//!
//! ## EBML variable-length integers
//!
//! The number of leading zero bits in the first byte, plus one, is the
//! total encoded length (1..=8 bytes):
//!
//! ```text
//! 1xxxxxxx                    1 byte
//! 01xxxxxx xxxxxxxx           2 bytes
//! ...
//! 00000001 xxxxxxxx * 7       8 bytes
//! ```
//!
//! Element ids keep the marker bit in the value; data sizes mask it off.

use super::cursor::Cursor;
use crate::error::{Error, Result};
use crate::schema::{BitFieldEntry, BitKind};
use crate::value::Value;

/// PDF whitespace: NUL, HT, LF, FF, CR, SP
const PDF_WHITESPACE: [u8; 6] = [0x00, 0x09, 0x0A, 0x0C, 0x0D, 0x20];

/// Unpacks one byte into sub-fields, first entry taking the highest bits.
///
/// Padding entries (no id) consume bits but produce nothing.
pub(crate) fn unpack_bitfield(byte: u8, entries: &[BitFieldEntry]) -> Result<Vec<(String, Value)>> {
    let mut remaining: u32 = 8;
    let mut fields = Vec::with_capacity(entries.len());

    for entry in entries {
        let bits = u32::from(entry.bits);
        if bits == 0 || bits > remaining {
            return Err(Error::invalid_schema(format!(
                "bitfield entry of {} bits does not fit in the {} bits left",
                bits, remaining
            )));
        }
        remaining -= bits;
        let raw = (u32::from(byte) >> remaining) & ((1 << bits) - 1);

        if let Some(id) = &entry.id {
            let value = match entry.kind {
                BitKind::Uint => Value::Int(i64::from(raw)),
                BitKind::Boolean => Value::Bool(raw != 0),
            };
            fields.push((id.clone(), value));
        }
    }

    Ok(fields)
}

/// Reads an EBML vint and returns `(value, encoded_length)`.
pub(crate) fn read_ebml_vint(cursor: &mut Cursor, keep_marker: bool) -> Result<(u64, usize)> {
    let offset = cursor.offset();
    let first = cursor
        .peek_u8()
        .ok_or_else(|| Error::unexpected_eof(offset, 1, 0))?;
    if first == 0 {
        return Err(Error::InvalidVint {
            offset,
            byte: first,
        });
    }

    let length = first.leading_zeros() as usize + 1;
    let bytes = cursor.read_bytes(length)?;

    let head = if keep_marker {
        first
    } else {
        first & 0xFFu8.checked_shr(length as u32).unwrap_or(0)
    };
    let value = bytes[1..]
        .iter()
        .fold(u64::from(head), |acc, &b| (acc << 8) | u64::from(b));

    Ok((value, length))
}

/// Returns true for bytes PDF treats as whitespace
pub(crate) fn is_pdf_whitespace(byte: u8) -> bool {
    PDF_WHITESPACE.contains(&byte)
}

/// Advances past PDF whitespace
pub(crate) fn skip_whitespace(cursor: &mut Cursor) -> usize {
    let run = cursor
        .rest()
        .iter()
        .take_while(|&&b| is_pdf_whitespace(b))
        .count();
    cursor.skip_lenient(run)
}

/// Length of the run before the first terminator byte, capped at `max_len`
pub(crate) fn scan_until_any(data: &[u8], terminators: &[u8], max_len: Option<usize>) -> usize {
    let limit = max_len.map_or(data.len(), |max| max.min(data.len()));
    data[..limit]
        .iter()
        .position(|b| terminators.contains(b))
        .unwrap_or(limit)
}

/// Length of the run before the first occurrence of `seq`, capped at `max_len`
pub(crate) fn scan_until_seq(data: &[u8], seq: &[u8], max_len: Option<usize>) -> usize {
    let limit = max_len.map_or(data.len(), |max| max.min(data.len()));
    if seq.is_empty() {
        return 0;
    }
    data.windows(seq.len())
        .take(limit + 1)
        .position(|window| window == seq)
        .map_or(limit, |pos| pos.min(limit))
}

/// Length of the run before the first unescaped `prefix`.
///
/// A prefix followed by a passthrough byte is an escape: both bytes belong to
/// the run. A prefix followed by anything else (or by the end of input) ends
/// the run before the prefix.
pub(crate) fn scan_prefixed(
    data: &[u8],
    prefix: u8,
    passthrough_values: &[u8],
    passthrough_ranges: &[(u8, u8)],
) -> usize {
    let passes = |b: u8| {
        passthrough_values.contains(&b)
            || passthrough_ranges
                .iter()
                .any(|&(lo, hi)| (lo..=hi).contains(&b))
    };

    let mut i = 0;
    while i < data.len() {
        if data[i] == prefix {
            match data.get(i + 1) {
                Some(&next) if passes(next) => {
                    i += 2;
                    continue;
                }
                _ => break,
            }
        }
        i += 1;
    }
    i
}
