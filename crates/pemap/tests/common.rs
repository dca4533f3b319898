//! Synthetic PE32+ images for tests.
//!
//! Images are built directly in mapped layout with file alignment equal to
//! section alignment, so file offsets and RVAs coincide.

#![allow(dead_code)]

use pemap_layout::{
    DIRECTORY_ENTRY_BASERELOC, DIRECTORY_ENTRY_DEBUG, DIRECTORY_ENTRY_EXPORT,
    DIRECTORY_ENTRY_IMPORT, DOS_MAGIC, FILE_DLL, MACHINE_AMD64, NT_SIGNATURE, ORDINAL_FLAG64,
    OPTIONAL_MAGIC_PE32_PLUS, RelocationEntry, SCN_CNT_CODE, SCN_CNT_INITIALIZED_DATA,
    SCN_MEM_EXECUTE, SCN_MEM_READ, SCN_MEM_WRITE,
};

pub const IMAGE_BASE: u64 = 0x1_8000_0000;
pub const SIZE_OF_IMAGE: u32 = 0x5000;
pub const TEXT: u32 = 0x1000;
pub const IMPORTS: u32 = 0x2000;
pub const EXPORTS: u32 = 0x3000;
pub const RELOC: u32 = 0x4000;

const NT: usize = 0x80;
const OPT: usize = NT + 4 + 20;
const DIRS: usize = OPT + 112;
const SECTIONS: usize = OPT + 240;

/// File offset of `SizeOfImage`, for patching built images.
pub const SIZE_OF_IMAGE_OFFSET: usize = OPT + 56;

/// One unbound import.
#[derive(Clone, Copy, Debug)]
pub enum Import<'a> {
    Ordinal(u16),
    Name(&'a str),
}

/// Where a built export points.
#[derive(Clone, Copy, Debug)]
pub enum Export<'a> {
    Rva(u32),
    Forward(&'a str),
}

pub struct PeBuilder {
    image: Vec<u8>,
    image_base: u64,
    entry_point: u32,
    characteristics: u16,
    directories: [(u32, u32); 16],
    descriptors: u32,
    import_cursor: u32,
    reloc_cursor: u32,
}

impl Default for PeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PeBuilder {
    pub fn new() -> Self {
        Self {
            image: vec![0u8; SIZE_OF_IMAGE as usize],
            image_base: IMAGE_BASE,
            entry_point: TEXT,
            characteristics: FILE_DLL,
            directories: [(0, 0); 16],
            descriptors: 0,
            // Descriptor table first, tables and names after it.
            import_cursor: IMPORTS + 0x200,
            reloc_cursor: RELOC,
        }
    }

    pub fn image_base(mut self, base: u64) -> Self {
        self.image_base = base;
        self
    }

    pub fn entry_point(mut self, rva: u32) -> Self {
        self.entry_point = rva;
        self
    }

    pub fn characteristics(mut self, characteristics: u16) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn put_bytes(&mut self, rva: u32, bytes: &[u8]) {
        let at = rva as usize;
        self.image[at..at + bytes.len()].copy_from_slice(bytes);
    }

    pub fn put_u16(&mut self, rva: u32, value: u16) {
        self.put_bytes(rva, &value.to_le_bytes());
    }

    pub fn put_u32(&mut self, rva: u32, value: u32) {
        self.put_bytes(rva, &value.to_le_bytes());
    }

    pub fn put_u64(&mut self, rva: u32, value: u64) {
        self.put_bytes(rva, &value.to_le_bytes());
    }

    pub fn u32_at(&self, rva: u32) -> u32 {
        let at = rva as usize;
        u32::from_le_bytes(self.image[at..at + 4].try_into().unwrap())
    }

    /// Append one relocation block for the page at `page`.
    pub fn relocation_block(&mut self, page: u32, entries: &[RelocationEntry]) {
        let size = 8 + 2 * entries.len() as u32;
        let at = self.reloc_cursor;
        self.put_u32(at, page);
        self.put_u32(at + 4, size);
        for (i, entry) in entries.iter().enumerate() {
            self.put_u16(at + 8 + 2 * i as u32, entry.raw());
        }
        self.reloc_cursor += size;
        self.directories[DIRECTORY_ENTRY_BASERELOC] = (RELOC, self.reloc_cursor - RELOC);
    }

    /// Raw relocation directory bytes, for malformed blocks.
    pub fn raw_relocations(&mut self, bytes: &[u8]) {
        self.put_bytes(RELOC, bytes);
        self.directories[DIRECTORY_ENTRY_BASERELOC] = (RELOC, bytes.len() as u32);
    }

    fn alloc_import(&mut self, len: u32, align: u32) -> u32 {
        let at = self.import_cursor.next_multiple_of(align);
        self.import_cursor = at + len;
        at
    }

    fn import_string(&mut self, s: &str) -> u32 {
        let at = self.alloc_import(s.len() as u32 + 1, 2);
        self.put_bytes(at, s.as_bytes());
        at
    }

    /// Add an import descriptor and return the RVA of its address table.
    pub fn import(&mut self, library: &str, symbols: &[Import<'_>]) -> u32 {
        let table_len = 8 * (symbols.len() as u32 + 1);
        let lookup = self.alloc_import(table_len, 8);
        let address = self.alloc_import(table_len, 8);

        for (i, symbol) in symbols.iter().enumerate() {
            let value = match *symbol {
                Import::Ordinal(ordinal) => ORDINAL_FLAG64 | u64::from(ordinal),
                Import::Name(name) => {
                    let record = self.alloc_import(2 + name.len() as u32 + 1, 2);
                    self.put_u16(record, i as u16);
                    self.put_bytes(record + 2, name.as_bytes());
                    u64::from(record)
                }
            };
            self.put_u64(lookup + 8 * i as u32, value);
            self.put_u64(address + 8 * i as u32, value);
        }

        let name = self.import_string(library);
        let descriptor = IMPORTS + 20 * self.descriptors;
        self.put_u32(descriptor, lookup);
        self.put_u32(descriptor + 12, name);
        self.put_u32(descriptor + 16, address);
        self.descriptors += 1;
        self.directories[DIRECTORY_ENTRY_IMPORT] = (IMPORTS, 20 * (self.descriptors + 1));
        address
    }

    fn put_string(&mut self, cursor: &mut u32, s: &str) -> u32 {
        let at = *cursor;
        self.put_bytes(at, s.as_bytes());
        *cursor += s.len() as u32 + 1;
        at
    }

    /// Export table with ordinal base 1; `exports` must be sorted by name.
    pub fn exports(&mut self, module: &str, exports: &[(&str, Export<'_>)]) {
        let count = exports.len() as u32;
        let functions = EXPORTS + 40;
        let names = functions + 4 * count;
        let ordinals = names + 4 * count;
        let mut cursor = ordinals + 2 * count;

        let module_name = self.put_string(&mut cursor, module);
        for (i, (name, target)) in exports.iter().enumerate() {
            let i = i as u32;
            let rva = match *target {
                Export::Rva(rva) => rva,
                Export::Forward(forwarder) => self.put_string(&mut cursor, forwarder),
            };
            let name_rva = self.put_string(&mut cursor, name);
            self.put_u32(functions + 4 * i, rva);
            self.put_u32(names + 4 * i, name_rva);
            self.put_u16(ordinals + 2 * i, i as u16);
        }

        self.put_u32(EXPORTS + 12, module_name);
        self.put_u32(EXPORTS + 16, 1);
        self.put_u32(EXPORTS + 20, count);
        self.put_u32(EXPORTS + 24, count);
        self.put_u32(EXPORTS + 28, functions);
        self.put_u32(EXPORTS + 32, names);
        self.put_u32(EXPORTS + 36, ordinals);
        self.directories[DIRECTORY_ENTRY_EXPORT] = (EXPORTS, cursor - EXPORTS);
    }

    /// Override the ordinal base written by [`Self::exports`].
    pub fn export_base(&mut self, base: u32) {
        self.put_u32(EXPORTS + 16, base);
    }

    /// One POGO debug record at the end of the export section.
    pub fn pogo(&mut self, entries: &[(u32, u32, &str)]) {
        let debug = EXPORTS + 0xC00;
        let data = debug + 28;
        let mut at = data + 4;
        self.put_u32(data, pemap_layout::POGO_SIGNATURE_LTCG);
        for (start, size, name) in entries {
            self.put_u32(at, *start);
            self.put_u32(at + 4, *size);
            self.put_bytes(at + 8, name.as_bytes());
            at += 8 + (name.len() as u32 + 1).next_multiple_of(4);
        }
        self.put_u32(debug + 12, pemap_layout::DEBUG_TYPE_POGO);
        self.put_u32(debug + 16, at - data);
        self.put_u32(debug + 20, data);
        self.directories[DIRECTORY_ENTRY_DEBUG] = (debug, 28);
    }

    /// Write the headers and return the file bytes.
    pub fn build(mut self) -> Vec<u8> {
        self.put_u16(0, DOS_MAGIC);
        self.put_u32(0x3C, NT as u32);
        self.put_u32(NT as u32, NT_SIGNATURE);

        let file = NT as u32 + 4;
        self.put_u16(file, MACHINE_AMD64);
        self.put_u16(file + 2, 4);
        self.put_u16(file + 16, 240);
        self.put_u16(file + 18, self.characteristics);

        let opt = OPT as u32;
        self.put_u16(opt, OPTIONAL_MAGIC_PE32_PLUS);
        self.put_u32(opt + 16, self.entry_point);
        self.put_u64(opt + 24, self.image_base);
        self.put_u32(opt + 32, 0x1000);
        self.put_u32(opt + 36, 0x1000);
        self.put_u32(opt + 56, SIZE_OF_IMAGE);
        self.put_u32(opt + 60, 0x400);
        self.put_u32(opt + 108, 16);
        for (i, (rva, size)) in self.directories.into_iter().enumerate() {
            self.put_u32(DIRS as u32 + 8 * i as u32, rva);
            self.put_u32(DIRS as u32 + 8 * i as u32 + 4, size);
        }

        let sections = [
            (b".text\0\0\0", TEXT, SCN_CNT_CODE | SCN_MEM_EXECUTE | SCN_MEM_READ),
            (b".idata\0\0", IMPORTS, SCN_CNT_INITIALIZED_DATA | SCN_MEM_READ | SCN_MEM_WRITE),
            (b".rdata\0\0", EXPORTS, SCN_CNT_INITIALIZED_DATA | SCN_MEM_READ),
            (b".reloc\0\0", RELOC, SCN_CNT_INITIALIZED_DATA | SCN_MEM_READ),
        ];
        for (i, (name, rva, flags)) in sections.into_iter().enumerate() {
            let at = SECTIONS as u32 + 40 * i as u32;
            self.put_bytes(at, name);
            self.put_u32(at + 8, 0x1000);
            self.put_u32(at + 12, rva);
            self.put_u32(at + 16, 0x1000);
            self.put_u32(at + 20, rva);
            self.put_u32(at + 36, flags);
        }

        self.image
    }
}
