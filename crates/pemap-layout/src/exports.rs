//! Export directory and lookup.
//!
//! Lookup by name walks the name-pointer table, maps the matched index
//! through the name-ordinal table and reads the function RVA at the result.

use std::cmp::Ordering;

use crate::bytes::{read_cstr, read_le16, read_le32};
use crate::records::DataDirectory;
use crate::{LayoutError, Result, Rva};

/// Export table header (`IMAGE_EXPORT_DIRECTORY`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// RVA of the module name.
    pub name: Rva,
    /// Ordinal of the first function-table entry.
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: Rva,
    pub address_of_names: Rva,
    pub address_of_name_ordinals: Rva,
}

impl ExportDirectory {
    pub const SIZE: usize = 40;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            characteristics: read_le32(data, offset)?,
            time_date_stamp: read_le32(data, offset + 4)?,
            major_version: read_le16(data, offset + 8)?,
            minor_version: read_le16(data, offset + 10)?,
            name: read_le32(data, offset + 12)?,
            base: read_le32(data, offset + 16)?,
            number_of_functions: read_le32(data, offset + 20)?,
            number_of_names: read_le32(data, offset + 24)?,
            address_of_functions: read_le32(data, offset + 28)?,
            address_of_names: read_le32(data, offset + 32)?,
            address_of_name_ordinals: read_le32(data, offset + 36)?,
        })
    }

    /// Consumers index the function table with name ordinals, so there can
    /// never be more names than functions.
    pub const fn check_counts(&self) -> Result<()> {
        if self.number_of_names > self.number_of_functions {
            return Err(LayoutError::InconsistentExportCounts {
                names: self.number_of_names,
                functions: self.number_of_functions,
            });
        }
        Ok(())
    }
}

/// Where an export points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Code or data inside this image.
    Rva(Rva),
    /// `"MODULE.Symbol"` string; the export lives in another module.
    Forwarder(Vec<u8>),
}

/// Resolved view over an image's export table.
pub struct ExportTable<'a> {
    data: &'a [u8],
    directory: ExportDirectory,
    range: DataDirectory,
}

impl<'a> ExportTable<'a> {
    pub(crate) fn new(data: &'a [u8], range: DataDirectory) -> Result<Self> {
        let directory = ExportDirectory::read(data, range.virtual_address as usize)?;
        directory.check_counts()?;
        Ok(Self {
            data,
            directory,
            range,
        })
    }

    #[must_use]
    pub const fn directory(&self) -> &ExportDirectory {
        &self.directory
    }

    /// Module name recorded in the export directory.
    pub fn module_name(&self) -> Result<&'a [u8]> {
        read_cstr(self.data, self.directory.name as usize)
    }

    /// Name at position `index` of the name-pointer table.
    pub fn name_at(&self, index: u32) -> Result<&'a [u8]> {
        let ptr = self.directory.address_of_names as usize + index as usize * 4;
        let rva = read_le32(self.data, ptr)?;
        read_cstr(self.data, rva as usize)
    }

    fn ordinal_index_at(&self, index: u32) -> Result<u32> {
        let ptr = self.directory.address_of_name_ordinals as usize + index as usize * 2;
        read_le16(self.data, ptr).map(u32::from)
    }

    /// Function-table entry at `function_index`; `None` for an empty slot.
    pub fn target_at(&self, function_index: u32) -> Result<Option<ExportTarget>> {
        if function_index >= self.directory.number_of_functions {
            return Ok(None);
        }
        let ptr = self.directory.address_of_functions as usize + function_index as usize * 4;
        let rva = read_le32(self.data, ptr)?;
        if rva == 0 {
            return Ok(None);
        }
        if self.range.contains(rva) {
            let forwarder = read_cstr(self.data, rva as usize)?;
            return Ok(Some(ExportTarget::Forwarder(forwarder.to_vec())));
        }
        Ok(Some(ExportTarget::Rva(rva)))
    }

    /// Look up an export by name.
    ///
    /// Binary search assumes the linker sorted the name table; if that
    /// misses, a linear scan covers images that were not sorted.
    pub fn find(&self, name: &[u8]) -> Result<Option<ExportTarget>> {
        let count = self.directory.number_of_names;

        let (mut lo, mut hi) = (0u32, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.name_at(mid)?.cmp(name) {
                Ordering::Equal => return self.target_at(self.ordinal_index_at(mid)?),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }

        for index in 0..count {
            if self.name_at(index)? == name {
                return self.target_at(self.ordinal_index_at(index)?);
            }
        }
        Ok(None)
    }

    /// Look up an export by its biased ordinal.
    pub fn find_ordinal(&self, ordinal: u16) -> Result<Option<ExportTarget>> {
        match u32::from(ordinal).checked_sub(self.directory.base) {
            Some(index) => self.target_at(index),
            None => Ok(None),
        }
    }

    /// Biased ordinal of the function at `function_index`.
    pub const fn ordinal(&self, function_index: u32) -> Result<u32> {
        match self.directory.base.checked_add(function_index) {
            Some(ordinal) => Ok(ordinal),
            None => Err(LayoutError::OrdinalOverflow {
                base: self.directory.base,
                index: function_index,
            }),
        }
    }

    /// All named exports in table order, each with its unbiased
    /// function-table index.
    pub fn names(&self) -> Result<Vec<(Vec<u8>, u32)>> {
        (0..self.directory.number_of_names)
            .map(|i| Ok((self.name_at(i)?.to_vec(), self.ordinal_index_at(i)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out an export table at 0x100 with functions at 0x1000 + i*0x10.
    fn build(names: &[&[u8]], ordinal_indices: &[u16], functions: &[u32]) -> (Vec<u8>, DataDirectory) {
        build_with_base(1, names, ordinal_indices, functions)
    }

    fn build_with_base(
        base: u32,
        names: &[&[u8]],
        ordinal_indices: &[u16],
        functions: &[u32],
    ) -> (Vec<u8>, DataDirectory) {
        let mut data = vec![0u8; 0x800];
        let dir = 0x100usize;
        let funcs = 0x200usize;
        let name_ptrs = 0x300usize;
        let ordinals = 0x380usize;
        let mut strings = 0x400usize;

        let w32 = |d: &mut Vec<u8>, at: usize, v: u32| d[at..at + 4].copy_from_slice(&v.to_le_bytes());

        w32(&mut data, dir + 16, base);
        w32(&mut data, dir + 20, functions.len() as u32);
        w32(&mut data, dir + 24, names.len() as u32);
        w32(&mut data, dir + 28, funcs as u32);
        w32(&mut data, dir + 32, name_ptrs as u32);
        w32(&mut data, dir + 36, ordinals as u32);

        for (i, f) in functions.iter().enumerate() {
            w32(&mut data, funcs + i * 4, *f);
        }
        for (i, name) in names.iter().enumerate() {
            w32(&mut data, name_ptrs + i * 4, strings as u32);
            data[strings..strings + name.len()].copy_from_slice(name);
            strings += name.len() + 1;
            data[ordinals + i * 2..ordinals + i * 2 + 2]
                .copy_from_slice(&ordinal_indices[i].to_le_bytes());
        }
        (data, DataDirectory { virtual_address: dir as u32, size: 0x80 })
    }

    #[test]
    fn test_export_directory_layout() {
        assert_eq!(std::mem::size_of::<ExportDirectory>(), ExportDirectory::SIZE);
    }

    #[test]
    fn test_find_sorted() {
        let (data, range) = build(&[b"Alpha", b"Beta", b"Gamma"], &[2, 0, 1], &[0x1000, 0x1010, 0x1020]);
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(table.find(b"Alpha").unwrap(), Some(ExportTarget::Rva(0x1020)));
        assert_eq!(table.find(b"Beta").unwrap(), Some(ExportTarget::Rva(0x1000)));
        assert_eq!(table.find(b"Gamma").unwrap(), Some(ExportTarget::Rva(0x1010)));
        assert_eq!(table.find(b"Delta").unwrap(), None);
    }

    #[test]
    fn test_find_unsorted_falls_back_to_scan() {
        let (data, range) = build(&[b"Zeta", b"Alpha"], &[0, 1], &[0x1000, 0x1010]);
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(table.find(b"Alpha").unwrap(), Some(ExportTarget::Rva(0x1010)));
        assert_eq!(table.find(b"Zeta").unwrap(), Some(ExportTarget::Rva(0x1000)));
    }

    #[test]
    fn test_find_ordinal_is_biased() {
        let (data, range) = build(&[b"A"], &[0], &[0x1000, 0x1010]);
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(table.find_ordinal(2).unwrap(), Some(ExportTarget::Rva(0x1010)));
        assert_eq!(table.find_ordinal(0).unwrap(), None);
        assert_eq!(table.find_ordinal(3).unwrap(), None);
        assert_eq!(table.names().unwrap(), vec![(b"A".to_vec(), 0)]);
        assert_eq!(table.ordinal(0).unwrap(), 1);
    }

    #[test]
    fn test_ordinal_base_zero() {
        let (data, range) = build_with_base(0, &[b"A", b"B"], &[1, 0], &[0x1000, 0x1010]);
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(table.find_ordinal(0).unwrap(), Some(ExportTarget::Rva(0x1000)));
        assert_eq!(table.find_ordinal(1).unwrap(), Some(ExportTarget::Rva(0x1010)));
        assert_eq!(table.find_ordinal(2).unwrap(), None);
        assert_eq!(
            table.names().unwrap(),
            vec![(b"A".to_vec(), 1), (b"B".to_vec(), 0)]
        );
        assert_eq!(table.ordinal(1).unwrap(), 1);
    }

    #[test]
    fn test_large_ordinal_base_keeps_named_exports() {
        let (data, range) = build_with_base(0x1_0000, &[b"A", b"B"], &[0, 1], &[0x1000, 0x1010]);
        let table = ExportTable::new(&data, range).unwrap();
        // No 16-bit ordinal reaches a base above 0xFFFF.
        assert_eq!(table.find_ordinal(0).unwrap(), None);
        assert_eq!(table.find_ordinal(u16::MAX).unwrap(), None);

        let names = table.names().unwrap();
        assert_eq!(names, vec![(b"A".to_vec(), 0), (b"B".to_vec(), 1)]);
        let resolved: Vec<_> = names
            .iter()
            .map(|(_, index)| (table.ordinal(*index).unwrap(), table.target_at(*index).unwrap()))
            .collect();
        assert_eq!(
            resolved,
            vec![
                (0x1_0000, Some(ExportTarget::Rva(0x1000))),
                (0x1_0001, Some(ExportTarget::Rva(0x1010))),
            ]
        );
    }

    #[test]
    fn test_ordinal_base_overflow_is_error() {
        let (data, range) = build_with_base(u32::MAX, &[b"A", b"B"], &[0, 1], &[0x1000, 0x1010]);
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(table.names().unwrap().len(), 2);
        assert_eq!(table.ordinal(0).unwrap(), u32::MAX);
        assert_eq!(
            table.ordinal(1).unwrap_err(),
            LayoutError::OrdinalOverflow { base: u32::MAX, index: 1 }
        );
        assert_eq!(table.find(b"B").unwrap(), Some(ExportTarget::Rva(0x1010)));
    }

    #[test]
    fn test_forwarder_inside_directory() {
        let (mut data, range) = build(&[b"Fwd"], &[0], &[0x160]);
        data[0x160..0x16B].copy_from_slice(b"NTDLL.Sleep");
        let table = ExportTable::new(&data, range).unwrap();
        assert_eq!(
            table.find(b"Fwd").unwrap(),
            Some(ExportTarget::Forwarder(b"NTDLL.Sleep".to_vec()))
        );
    }

    #[test]
    fn test_more_names_than_functions_is_error() {
        let (data, range) = build(&[b"A", b"B"], &[0, 0], &[0x1000]);
        assert!(matches!(
            ExportTable::new(&data, range),
            Err(LayoutError::InconsistentExportCounts { names: 2, functions: 1 })
        ));
    }
}
