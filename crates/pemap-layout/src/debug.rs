//! Debug directory and POGO records.
//!
//! The loader only interprets the profile-guided-optimization (POGO)
//! record; every other debug type is passed through as a raw directory.

use crate::bytes::{read_bytes, read_cstr, read_le16, read_le32};
use crate::constants::DEBUG_TYPE_POGO;
use crate::{Result, Rva};

/// Debug directory entry (`IMAGE_DEBUG_DIRECTORY`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DebugDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: Rva,
    pub pointer_to_raw_data: u32,
}

impl DebugDirectory {
    pub const SIZE: usize = 28;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            characteristics: read_le32(data, offset)?,
            time_date_stamp: read_le32(data, offset + 4)?,
            major_version: read_le16(data, offset + 8)?,
            minor_version: read_le16(data, offset + 10)?,
            debug_type: read_le32(data, offset + 12)?,
            size_of_data: read_le32(data, offset + 16)?,
            address_of_raw_data: read_le32(data, offset + 20)?,
            pointer_to_raw_data: read_le32(data, offset + 24)?,
        })
    }

    #[must_use]
    pub const fn is_pogo(&self) -> bool {
        self.debug_type == DEBUG_TYPE_POGO
    }
}

/// Header of a POGO debug record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PogoHeader {
    /// `LTCG` or `PGU\0`.
    pub signature: u32,
}

/// One named range of a POGO record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PogoEntry {
    pub start_rva: Rva,
    pub size: u32,
    pub name: Vec<u8>,
}

/// Decode a POGO record occupying `len` bytes at `offset`.
///
/// Entries are `start_rva`, `size`, then a NUL-terminated name padded to a
/// 4-byte boundary.
pub fn parse_pogo(data: &[u8], offset: usize, len: usize) -> Result<(PogoHeader, Vec<PogoEntry>)> {
    let record = read_bytes(data, offset, len)?;
    let header = PogoHeader {
        signature: read_le32(record, 0)?,
    };

    let mut entries = Vec::new();
    let mut pos = 4;
    while pos + 8 < record.len() {
        let start_rva = read_le32(record, pos)?;
        let size = read_le32(record, pos + 4)?;
        let name = read_cstr(record, pos + 8)?;
        let name_len = (name.len() + 1 + 3) & !3;
        entries.push(PogoEntry {
            start_rva,
            size,
            name: name.to_vec(),
        });
        pos += 8 + name_len;
    }

    Ok((header, entries))
}
