//! Base relocation blocks and packed entries.

use crate::bytes::{read_le16, read_le32};
use crate::constants::*;
use crate::{LayoutError, Result, Rva};

/// Relocation type stored in the upper 4 bits of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocationKind {
    /// Padding, never patched.
    Absolute,
    /// Add the high 16 bits of the delta to a 16-bit field.
    High,
    /// Add the low 16 bits of the delta to a 16-bit field.
    Low,
    /// Add the delta to a 32-bit field.
    HighLow,
    /// High 16 bits with a second adjustment slot.
    HighAdj,
    /// Add the delta to a 64-bit field.
    Dir64,
    /// Architecture-specific type with no patch rule here.
    Other(u8),
}

impl RelocationKind {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            REL_BASED_ABSOLUTE => Self::Absolute,
            REL_BASED_HIGH => Self::High,
            REL_BASED_LOW => Self::Low,
            REL_BASED_HIGHLOW => Self::HighLow,
            REL_BASED_HIGHADJ => Self::HighAdj,
            REL_BASED_DIR64 => Self::Dir64,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Absolute => REL_BASED_ABSOLUTE,
            Self::High => REL_BASED_HIGH,
            Self::Low => REL_BASED_LOW,
            Self::HighLow => REL_BASED_HIGHLOW,
            Self::HighAdj => REL_BASED_HIGHADJ,
            Self::Dir64 => REL_BASED_DIR64,
            Self::Other(raw) => raw,
        }
    }
}

/// One packed 16-bit relocation record.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelocationEntry(pub u16);

impl RelocationEntry {
    pub const SIZE: usize = 2;

    /// Pack a type and a page offset. Bits beyond 4/12 are dropped.
    #[must_use]
    pub const fn new(kind: u8, offset: u16) -> Self {
        Self((((kind as u16) << RELOC_TYPE_SHIFT) & RELOC_TYPE_MASK) | (offset & RELOC_OFFSET_MASK))
    }

    /// Byte offset within the block's page.
    #[must_use]
    pub const fn offset(self) -> u16 {
        self.0 & RELOC_OFFSET_MASK
    }

    /// Raw 4-bit type.
    #[must_use]
    pub const fn raw_type(self) -> u8 {
        ((self.0 & RELOC_TYPE_MASK) >> RELOC_TYPE_SHIFT) as u8
    }

    #[must_use]
    pub const fn kind(self) -> RelocationKind {
        RelocationKind::from_raw(self.raw_type())
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Header of one page's worth of relocation entries (`IMAGE_BASE_RELOCATION`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BaseRelocationBlock {
    /// RVA of the page the entries patch.
    pub virtual_address: Rva,
    /// Total block size in bytes, header included.
    pub size_of_block: u32,
}

impl BaseRelocationBlock {
    pub const SIZE: usize = 8;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            virtual_address: read_le32(data, offset)?,
            size_of_block: read_le32(data, offset + 4)?,
        })
    }

    /// Number of packed entries following the header.
    #[must_use]
    pub const fn entry_count(&self) -> usize {
        (self.size_of_block as usize).saturating_sub(Self::SIZE) / RelocationEntry::SIZE
    }

    /// RVA patched by `entry`.
    #[must_use]
    pub const fn target(&self, entry: RelocationEntry) -> Rva {
        self.virtual_address.wrapping_add(entry.offset() as u32)
    }
}

/// Iterator over the blocks of a relocation directory.
///
/// Yields each block header with its decoded entries. A block whose size is
/// smaller than its own header, or which runs past the directory, ends the
/// iteration with an error.
pub struct RelocationBlocks<'a> {
    data: &'a [u8],
    offset: usize,
    end: usize,
    failed: bool,
}

impl<'a> RelocationBlocks<'a> {
    pub(crate) const fn new(data: &'a [u8], start: usize, len: usize) -> Self {
        Self {
            data,
            offset: start,
            end: start.saturating_add(len),
            failed: false,
        }
    }

    fn next_block(&mut self) -> Result<(BaseRelocationBlock, Vec<RelocationEntry>)> {
        let block = BaseRelocationBlock::read(self.data, self.offset)?;
        let size = block.size_of_block as usize;
        if size < BaseRelocationBlock::SIZE || self.offset.saturating_add(size) > self.end {
            return Err(LayoutError::MalformedRelocationBlock {
                rva: block.virtual_address,
                size: block.size_of_block,
            });
        }

        let first = self.offset + BaseRelocationBlock::SIZE;
        let entries = (0..block.entry_count())
            .map(|i| read_le16(self.data, first + i * RelocationEntry::SIZE).map(RelocationEntry))
            .collect::<Result<Vec<_>>>()?;

        self.offset += size;
        Ok((block, entries))
    }
}

impl Iterator for RelocationBlocks<'_> {
    type Item = Result<(BaseRelocationBlock, Vec<RelocationEntry>)>;

    fn next(&mut self) -> Option<Self::Item> {
        // A trailing fragment shorter than a header is linker padding.
        if self.failed || self.offset + BaseRelocationBlock::SIZE > self.end {
            return None;
        }
        let item = self.next_block();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encode_round_trip() {
        for kind in 0u8..16 {
            for offset in 0u16..=0x0FFF {
                let raw = (u16::from(kind) << 12) | offset;
                let entry = RelocationEntry(raw);
                assert_eq!(entry.offset(), raw & 0x0FFF);
                assert_eq!(entry.raw_type(), ((raw >> 12) & 0xF) as u8);
                assert_eq!(RelocationEntry::new(entry.raw_type(), entry.offset()), entry);
            }
        }
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RelocationEntry(0x3010).kind(), RelocationKind::HighLow);
        assert_eq!(RelocationEntry(0xA020).kind(), RelocationKind::Dir64);
        assert_eq!(RelocationEntry(0x0000).kind(), RelocationKind::Absolute);
        assert_eq!(RelocationEntry(0x5000).kind(), RelocationKind::Other(5));
        for raw in 0u8..16 {
            assert_eq!(RelocationKind::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_block_entry_count() {
        let block = BaseRelocationBlock {
            virtual_address: 0x1000,
            size_of_block: 12,
        };
        assert_eq!(block.entry_count(), 2);
        assert_eq!(block.target(RelocationEntry(0x3010)), 0x1010);

        let empty = BaseRelocationBlock {
            virtual_address: 0,
            size_of_block: 4,
        };
        assert_eq!(empty.entry_count(), 0);
    }

    fn block_bytes(va: u32, entries: &[u16]) -> Vec<u8> {
        let size = (8 + entries.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&va.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        for e in entries {
            out.extend_from_slice(&e.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_iterate_blocks() {
        let mut data = block_bytes(0x1000, &[0x3010, 0x3020]);
        data.extend(block_bytes(0x2000, &[0xA008, 0x0000]));

        let blocks: Vec<_> = RelocationBlocks::new(&data, 0, data.len())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0.virtual_address, 0x1000);
        assert_eq!(blocks[0].1, vec![RelocationEntry(0x3010), RelocationEntry(0x3020)]);
        assert_eq!(blocks[1].1[0].kind(), RelocationKind::Dir64);
    }

    #[test]
    fn test_block_smaller_than_header_is_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x1000u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());

        let mut blocks = RelocationBlocks::new(&data, 0, data.len());
        assert_eq!(
            blocks.next(),
            Some(Err(LayoutError::MalformedRelocationBlock {
                rva: 0x1000,
                size: 4
            }))
        );
        assert_eq!(blocks.next(), None);
    }

    #[test]
    fn test_block_past_directory_is_error() {
        let data = block_bytes(0x1000, &[0x3010, 0x3020]);
        let mut blocks = RelocationBlocks::new(&data, 0, 10);
        assert!(matches!(
            blocks.next(),
            Some(Err(LayoutError::MalformedRelocationBlock { .. }))
        ));
    }
}
