//! PE image layout model for in-memory mapping.
//!
//! Every record here is a transient view over bytes owned by the caller.
//! Decoding goes through explicit little-endian field offsets, so an
//! [`ImageView`] over a `Vec<u8>` behaves the same as one over mapped memory.

mod address;
mod bytes;
mod constants;
pub mod debug;
pub mod exports;
mod headers;
mod records;
mod relocation;
mod thunk;
mod view;

pub use address::{Address, Rva};
pub use constants::*;
pub use debug::{DebugDirectory, PogoEntry, PogoHeader, parse_pogo};
pub use exports::{ExportDirectory, ExportTable, ExportTarget};
pub use headers::{ImageHeaders, SectionHeader};
pub use records::{DataDirectory, ImportDescriptor};
pub use relocation::{BaseRelocationBlock, RelocationBlocks, RelocationEntry, RelocationKind};
pub use thunk::{ImportByName, PointerWidth, Thunk, ThunkKind};
pub use view::ImageView;

use thiserror::Error;

/// Layout decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("read of {len} bytes at offset {offset:#x} is outside the image")]
    OutOfBounds { offset: usize, len: usize },
    #[error("Invalid DOS magic number")]
    InvalidDosMagic,
    #[error("Invalid NT signature")]
    InvalidNtSignature,
    #[error("Unsupported optional header magic: {0:#x}")]
    UnsupportedOptionalMagic(u16),
    #[error("Too many sections: {0}")]
    TooManySections(usize),
    #[error("malformed relocation block at rva {rva:#x} (size {size:#x})")]
    MalformedRelocationBlock { rva: u32, size: u32 },
    #[error("malformed import thunk {0:#x}")]
    MalformedThunk(u64),
    #[error("string at rva {0:#x} is not null-terminated")]
    UnterminatedString(usize),
    #[error("image size {0:#x} exceeds the mapping limit")]
    ImageTooLarge(u32),
    #[error("export ordinal base {base:#x} plus index {index} overflows")]
    OrdinalOverflow { base: u32, index: u32 },
    #[error("export table names {names} entries but only {functions} functions")]
    InconsistentExportCounts { names: u32, functions: u32 },
}

pub type Result<T> = std::result::Result<T, LayoutError>;
