//! Import thunks and name records.

use crate::bytes::{read_le16, read_le32, read_le64};
use crate::constants::*;
use crate::{LayoutError, Result, Rva};

/// Width of thunk slots and image pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerWidth {
    /// PE32: 4-byte thunks.
    Pe32,
    /// PE32+: 8-byte thunks.
    Pe32Plus,
}

impl PointerWidth {
    /// Width matching the host pointer size.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Pe32Plus
        } else {
            Self::Pe32
        }
    }

    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Pe32 => 4,
            Self::Pe32Plus => 8,
        }
    }

    /// High bit marking an ordinal import.
    #[must_use]
    pub const fn ordinal_flag(self) -> u64 {
        match self {
            Self::Pe32 => ORDINAL_FLAG32 as u64,
            Self::Pe32Plus => ORDINAL_FLAG64,
        }
    }

    /// Read one pointer-sized value.
    pub fn read(self, data: &[u8], offset: usize) -> Result<u64> {
        match self {
            Self::Pe32 => read_le32(data, offset).map(u64::from),
            Self::Pe32Plus => read_le64(data, offset),
        }
    }

    /// Little-endian encoding of `value` truncated to this width.
    #[must_use]
    pub fn encode(self, value: u64) -> Vec<u8> {
        value.to_le_bytes()[..self.size()].to_vec()
    }
}

/// How an import lookup slot names its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThunkKind {
    Ordinal(u16),
    /// RVA of an [`ImportByName`] record.
    Name(Rva),
}

/// One raw thunk slot (`IMAGE_THUNK_DATA`).
///
/// The same storage is an unbound lookup entry before binding and the
/// resolved address afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thunk {
    pub raw: u64,
    pub width: PointerWidth,
}

impl Thunk {
    #[must_use]
    pub const fn new(raw: u64, width: PointerWidth) -> Self {
        Self { raw, width }
    }

    /// A zero slot terminates the table.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    #[must_use]
    pub const fn is_ordinal(&self) -> bool {
        self.raw & self.width.ordinal_flag() != 0
    }

    /// Decode the slot as an unbound import.
    ///
    /// Ordinal imports keep the low 16 bits. Name imports must carry a
    /// 31-bit RVA; anything wider is malformed.
    pub fn decode(&self) -> Result<ThunkKind> {
        if self.is_ordinal() {
            return Ok(ThunkKind::Ordinal((self.raw & ORDINAL_MASK) as u16));
        }
        let rva = u32::try_from(self.raw).map_err(|_| LayoutError::MalformedThunk(self.raw))?;
        if rva & ORDINAL_FLAG32 != 0 {
            return Err(LayoutError::MalformedThunk(self.raw));
        }
        Ok(ThunkKind::Name(rva))
    }
}

/// Name-based import record (`IMAGE_IMPORT_BY_NAME`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportByName {
    /// Index hint into the exporter's name table.
    pub hint: u16,
}

impl ImportByName {
    /// Offset of the name bytes from the start of the record.
    pub const NAME_OFFSET: u32 = 2;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            hint: read_le16(data, offset)?,
        })
    }

    /// RVA of the null-terminated name within a record at `rva`.
    #[must_use]
    pub const fn name_rva(rva: Rva) -> Rva {
        rva.wrapping_add(Self::NAME_OFFSET)
    }
}
