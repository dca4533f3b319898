//! Read-only view over an image in mapped layout.

use crate::bytes::read_cstr;
use crate::debug::{DebugDirectory, PogoEntry, PogoHeader, parse_pogo};
use crate::exports::{ExportDirectory, ExportTable, ExportTarget};
use crate::records::{DataDirectory, ImportDescriptor};
use crate::relocation::RelocationBlocks;
use crate::thunk::{ImportByName, PointerWidth, Thunk};
use crate::{Result, Rva};

/// Typed access to an image whose bytes sit at their RVAs.
///
/// The view borrows the buffer; it never copies or owns image memory.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: PointerWidth,
}

impl<'a> ImageView<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8], width: PointerWidth) -> Self {
        Self { data, width }
    }

    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.data
    }

    #[must_use]
    pub const fn width(&self) -> PointerWidth {
        self.width
    }

    /// Null-terminated string at `rva`, bounded by the buffer.
    pub fn c_str(&self, rva: Rva) -> Result<&'a [u8]> {
        read_cstr(self.data, rva as usize)
    }

    /// Relocation blocks in the base relocation directory.
    #[must_use]
    pub fn relocation_blocks(&self, directory: DataDirectory) -> RelocationBlocks<'a> {
        RelocationBlocks::new(
            self.data,
            directory.virtual_address as usize,
            directory.size as usize,
        )
    }

    /// Import descriptors up to the null terminator.
    pub fn import_descriptors(&self, directory: DataDirectory) -> Result<Vec<ImportDescriptor>> {
        let mut descriptors = Vec::new();
        if !directory.is_present() {
            return Ok(descriptors);
        }
        let mut offset = directory.virtual_address as usize;
        loop {
            let descriptor = ImportDescriptor::read(self.data, offset)?;
            if descriptor.is_null() {
                break;
            }
            descriptors.push(descriptor);
            offset += ImportDescriptor::SIZE;
        }
        Ok(descriptors)
    }

    /// Thunk table at `rva` up to the zero slot.
    pub fn thunks(&self, rva: Rva) -> Result<Vec<Thunk>> {
        let size = self.width.size();
        let mut thunks = Vec::new();
        let mut offset = rva as usize;
        loop {
            let raw = self.width.read(self.data, offset)?;
            if raw == 0 {
                break;
            }
            thunks.push(Thunk::new(raw, self.width));
            offset += size;
        }
        Ok(thunks)
    }

    pub fn import_by_name(&self, rva: Rva) -> Result<ImportByName> {
        ImportByName::read(self.data, rva as usize)
    }

    /// Export table, if the image has one.
    pub fn exports(&self, directory: DataDirectory) -> Result<Option<ExportTable<'a>>> {
        if !directory.is_present() {
            return Ok(None);
        }
        ExportTable::new(self.data, directory).map(Some)
    }

    /// Raw export directory record, if the image has one.
    pub fn export_directory(&self, directory: DataDirectory) -> Result<Option<ExportDirectory>> {
        Ok(self.exports(directory)?.map(|table| *table.directory()))
    }

    /// Export named `name`, if any.
    pub fn find_export(&self, directory: DataDirectory, name: &[u8]) -> Result<Option<ExportTarget>> {
        match self.exports(directory)? {
            Some(table) => table.find(name),
            None => Ok(None),
        }
    }

    /// Export with biased ordinal `ordinal`, if any.
    pub fn export_by_ordinal(&self, directory: DataDirectory, ordinal: u16) -> Result<Option<ExportTarget>> {
        match self.exports(directory)? {
            Some(table) => table.find_ordinal(ordinal),
            None => Ok(None),
        }
    }

    /// Debug directory entries.
    pub fn debug_directories(&self, directory: DataDirectory) -> Result<Vec<DebugDirectory>> {
        if !directory.is_present() {
            return Ok(Vec::new());
        }
        let count = directory.size as usize / DebugDirectory::SIZE;
        (0..count)
            .map(|i| {
                DebugDirectory::read(
                    self.data,
                    directory.virtual_address as usize + i * DebugDirectory::SIZE,
                )
            })
            .collect()
    }

    /// POGO record behind `debug`, or `None` for other debug types.
    pub fn pogo(&self, debug: &DebugDirectory) -> Result<Option<(PogoHeader, Vec<PogoEntry>)>> {
        if !debug.is_pogo() || debug.address_of_raw_data == 0 {
            return Ok(None);
        }
        parse_pogo(
            self.data,
            debug.address_of_raw_data as usize,
            debug.size_of_data as usize,
        )
        .map(Some)
    }

    /// All POGO entries reachable from the debug directory.
    pub fn pogo_entries(&self, directory: DataDirectory) -> Result<Vec<PogoEntry>> {
        let mut entries = Vec::new();
        for debug in self.debug_directories(directory)? {
            if let Some((_, mut found)) = self.pogo(&debug)? {
                entries.append(&mut found);
            }
        }
        Ok(entries)
    }
}
