//! PE/COFF format constants.

// DOS / NT header constants
pub const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
pub const DOS_LFANEW_OFFSET: usize = 0x3C;
pub const NT_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
pub const FILE_HEADER_SIZE: usize = 20;

// Optional header magic
pub const OPTIONAL_MAGIC_PE32: u16 = 0x10B;
pub const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x20B;

// Machine types
pub const MACHINE_I386: u16 = 0x014C;
pub const MACHINE_AMD64: u16 = 0x8664;
pub const MACHINE_ARM64: u16 = 0xAA64;

// Data directory indices
pub const DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const DIRECTORY_ENTRY_RESOURCE: usize = 2;
pub const DIRECTORY_ENTRY_EXCEPTION: usize = 3;
pub const DIRECTORY_ENTRY_SECURITY: usize = 4;
pub const DIRECTORY_ENTRY_BASERELOC: usize = 5;
pub const DIRECTORY_ENTRY_DEBUG: usize = 6;
pub const DIRECTORY_ENTRY_TLS: usize = 9;
pub const DIRECTORY_ENTRY_IAT: usize = 12;
pub const NUMBER_OF_DIRECTORY_ENTRIES: usize = 16;

// Base relocation types (upper 4 bits of an entry)
pub const REL_BASED_ABSOLUTE: u8 = 0x0;
pub const REL_BASED_HIGH: u8 = 0x1;
pub const REL_BASED_LOW: u8 = 0x2;
pub const REL_BASED_HIGHLOW: u8 = 0x3;
pub const REL_BASED_HIGHADJ: u8 = 0x4;
pub const REL_BASED_DIR64: u8 = 0xA;

// Relocation entry bit packing
pub const RELOC_OFFSET_MASK: u16 = 0x0FFF;
pub const RELOC_TYPE_MASK: u16 = 0xF000;
pub const RELOC_TYPE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u32 = 0x1000;

// Import thunks
pub const ORDINAL_FLAG32: u32 = 0x8000_0000;
pub const ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;
pub const ORDINAL_MASK: u64 = 0xFFFF;

// Debug directory types
pub const DEBUG_TYPE_CODEVIEW: u32 = 0x2;
pub const DEBUG_TYPE_POGO: u32 = 0xD;

// POGO signatures
pub const POGO_SIGNATURE_LTCG: u32 = 0x4C54_4347; // "LTCG"
pub const POGO_SIGNATURE_PGU: u32 = 0x5047_5500; // "PGU\0"

// Section characteristics
pub const SCN_CNT_CODE: u32 = 0x0000_0020;
pub const SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
pub const SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
pub const SCN_MEM_EXECUTE: u32 = 0x2000_0000;
pub const SCN_MEM_READ: u32 = 0x4000_0000;
pub const SCN_MEM_WRITE: u32 = 0x8000_0000;

// File characteristics
pub const FILE_RELOCS_STRIPPED: u16 = 0x0001;
pub const FILE_DLL: u16 = 0x2000;

// Limits
pub const MAX_SECTIONS: usize = 96;
pub const MAX_IMAGE_SIZE: u32 = 1 << 30;
