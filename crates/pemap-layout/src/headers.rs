//! Minimal header locator.
//!
//! Reads only what mapping needs: image geometry, entry point, data
//! directories and the section table.

use crate::bytes::{read_bytes, read_le16, read_le32, read_le64};
use crate::constants::*;
use crate::records::DataDirectory;
use crate::thunk::PointerWidth;
use crate::{LayoutError, Result, Rva};

/// Section table entry (`IMAGE_SECTION_HEADER`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: Rva,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub const SIZE: usize = 40;

    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        let mut name = [0u8; 8];
        name.copy_from_slice(read_bytes(data, offset, 8)?);
        Ok(Self {
            name,
            virtual_size: read_le32(data, offset + 8)?,
            virtual_address: read_le32(data, offset + 12)?,
            size_of_raw_data: read_le32(data, offset + 16)?,
            pointer_to_raw_data: read_le32(data, offset + 20)?,
            characteristics: read_le32(data, offset + 36)?,
        })
    }

    /// Section name without NUL padding.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Bytes to copy from the file.
    ///
    /// Raw data beyond the virtual size is alignment padding and is not
    /// mapped.
    #[must_use]
    pub const fn copy_size(&self) -> u32 {
        if self.virtual_size != 0 && self.virtual_size < self.size_of_raw_data {
            self.virtual_size
        } else {
            self.size_of_raw_data
        }
    }

    #[must_use]
    pub const fn is_executable(&self) -> bool {
        self.characteristics & SCN_MEM_EXECUTE != 0
    }
}

/// Parsed PE headers.
#[derive(Clone, Debug)]
pub struct ImageHeaders {
    pub machine: u16,
    pub characteristics: u16,
    pub width: PointerWidth,
    /// Preferred load address.
    pub image_base: u64,
    pub entry_point: Rva,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub directories: Vec<DataDirectory>,
    pub sections: Vec<SectionHeader>,
}

impl ImageHeaders {
    /// Parse headers from raw file bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if read_le16(data, 0)? != DOS_MAGIC {
            return Err(LayoutError::InvalidDosMagic);
        }

        let nt = read_le32(data, DOS_LFANEW_OFFSET)? as usize;
        if read_le32(data, nt)? != NT_SIGNATURE {
            return Err(LayoutError::InvalidNtSignature);
        }

        let file = nt + 4;
        let machine = read_le16(data, file)?;
        let number_of_sections = read_le16(data, file + 2)? as usize;
        let size_of_optional = read_le16(data, file + 16)? as usize;
        let characteristics = read_le16(data, file + 18)?;

        if number_of_sections > MAX_SECTIONS {
            return Err(LayoutError::TooManySections(number_of_sections));
        }

        let opt = file + FILE_HEADER_SIZE;
        let (width, image_base, dir_count_offset) = match read_le16(data, opt)? {
            OPTIONAL_MAGIC_PE32 => (PointerWidth::Pe32, u64::from(read_le32(data, opt + 28)?), 92),
            OPTIONAL_MAGIC_PE32_PLUS => (PointerWidth::Pe32Plus, read_le64(data, opt + 24)?, 108),
            other => return Err(LayoutError::UnsupportedOptionalMagic(other)),
        };

        let dir_count = (read_le32(data, opt + dir_count_offset)? as usize)
            .min(NUMBER_OF_DIRECTORY_ENTRIES);
        let dirs = opt + dir_count_offset + 4;
        let directories = (0..dir_count)
            .map(|i| DataDirectory::read(data, dirs + i * DataDirectory::SIZE))
            .collect::<Result<Vec<_>>>()?;

        let table = opt + size_of_optional;
        let sections = (0..number_of_sections)
            .map(|i| SectionHeader::read(data, table + i * SectionHeader::SIZE))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            machine,
            characteristics,
            width,
            image_base,
            entry_point: read_le32(data, opt + 16)?,
            section_alignment: read_le32(data, opt + 32)?,
            file_alignment: read_le32(data, opt + 36)?,
            size_of_image: read_le32(data, opt + 56)?,
            size_of_headers: read_le32(data, opt + 60)?,
            directories,
            sections,
        })
    }

    /// Data directory `index`, or an empty one when the image has fewer.
    #[must_use]
    pub fn directory(&self, index: usize) -> DataDirectory {
        self.directories.get(index).copied().unwrap_or_default()
    }

    #[must_use]
    pub const fn is_dll(&self) -> bool {
        self.characteristics & FILE_DLL != 0
    }

    #[must_use]
    pub const fn relocations_stripped(&self) -> bool {
        self.characteristics & FILE_RELOCS_STRIPPED != 0
    }

    /// File range holding the headers, clamped to the file.
    #[must_use]
    pub fn header_bytes<'a>(&self, file: &'a [u8]) -> &'a [u8] {
        let len = (self.size_of_headers as usize).min(file.len()).min(self.size_of_image as usize);
        &file[..len]
    }

    /// File bytes of `section` that get mapped.
    pub fn section_bytes<'a>(&self, file: &'a [u8], section: &SectionHeader) -> Result<&'a [u8]> {
        read_bytes(
            file,
            section.pointer_to_raw_data as usize,
            section.copy_size() as usize,
        )
    }

    /// Lay the file out the way it appears once mapped: headers at 0, each
    /// section at its RVA, everything else zero.
    ///
    /// Images larger than [`MAX_IMAGE_SIZE`] are refused before anything is
    /// allocated.
    pub fn layout(&self, file: &[u8]) -> Result<Vec<u8>> {
        if self.size_of_image > MAX_IMAGE_SIZE {
            return Err(LayoutError::ImageTooLarge(self.size_of_image));
        }
        let mut image = vec![0u8; self.size_of_image as usize];
        let headers = self.header_bytes(file);
        image[..headers.len()].copy_from_slice(headers);

        for section in &self.sections {
            let bytes = self.section_bytes(file, section)?;
            let start = section.virtual_address as usize;
            let dest = start
                .checked_add(bytes.len())
                .and_then(|end| image.get_mut(start..end))
                .ok_or(LayoutError::OutOfBounds {
                    offset: start,
                    len: bytes.len(),
                })?;
            dest.copy_from_slice(bytes);
        }
        Ok(image)
    }
}
