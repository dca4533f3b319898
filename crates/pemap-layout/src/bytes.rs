//! Bounds-checked little-endian reads.

use crate::{LayoutError, Result};

#[inline]
fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(LayoutError::OutOfBounds { offset, len })
}

/// Read little-endian u16 from bytes.
#[inline]
pub fn read_le16(data: &[u8], offset: usize) -> Result<u16> {
    let b = slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

/// Read little-endian u32 from bytes.
#[inline]
pub fn read_le32(data: &[u8], offset: usize) -> Result<u32> {
    let b = slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read little-endian u64 from bytes.
#[inline]
pub fn read_le64(data: &[u8], offset: usize) -> Result<u64> {
    let b = slice(data, offset, 8)?;
    Ok(u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Borrow `len` bytes at `offset`.
#[inline]
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    slice(data, offset, len)
}

/// Bytes from `offset` up to (not including) the next NUL.
///
/// Unlike the raw-memory string read in the capability layer this one is
/// bounded by the buffer, so a missing terminator is an error.
pub fn read_cstr(data: &[u8], offset: usize) -> Result<&[u8]> {
    let tail = data
        .get(offset..)
        .ok_or(LayoutError::OutOfBounds { offset, len: 1 })?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(LayoutError::UnterminatedString(offset))?;
    Ok(&tail[..end])
}
