//! Fixed-layout directory records.

use crate::bytes::read_le32;
use crate::{Result, Rva};

/// Data directory entry (`IMAGE_DATA_DIRECTORY`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: Rva,
    pub size: u32,
}

impl DataDirectory {
    pub const SIZE: usize = 8;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            virtual_address: read_le32(data, offset)?,
            size: read_le32(data, offset + 4)?,
        })
    }

    /// A zero RVA means the directory is absent.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }

    /// Whether `rva` falls inside this directory.
    #[must_use]
    pub const fn contains(&self, rva: Rva) -> bool {
        rva >= self.virtual_address && rva - self.virtual_address < self.size
    }
}

/// Import table entry for one imported module (`IMAGE_IMPORT_DESCRIPTOR`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportDescriptor {
    /// RVA of the import lookup table (original thunks).
    pub original_first_thunk: Rva,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    /// RVA of the module name.
    pub name: Rva,
    /// RVA of the import address table (bound thunks).
    pub first_thunk: Rva,
}

impl ImportDescriptor {
    pub const SIZE: usize = 20;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            original_first_thunk: read_le32(data, offset)?,
            time_date_stamp: read_le32(data, offset + 4)?,
            forwarder_chain: read_le32(data, offset + 8)?,
            name: read_le32(data, offset + 12)?,
            first_thunk: read_le32(data, offset + 16)?,
        })
    }

    /// The all-zero descriptor terminates the table.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.original_first_thunk == 0 && self.name == 0 && self.first_thunk == 0
    }

    /// Table to walk for import names.
    ///
    /// Some linkers leave the lookup table empty; the address table then
    /// holds the unbound thunks.
    #[must_use]
    pub const fn lookup_table(&self) -> Rva {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}
