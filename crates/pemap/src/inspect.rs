//! Static report over an image file, without mapping it.

use std::collections::BTreeMap;

use pemap_layout::{
    DIRECTORY_ENTRY_BASERELOC, DIRECTORY_ENTRY_DEBUG, DIRECTORY_ENTRY_EXPORT,
    DIRECTORY_ENTRY_IMPORT, ExportTarget, ImageHeaders, ImageView, ImportByName, PogoEntry,
    RelocationKind, ThunkKind,
};

use crate::Result;
use crate::imports::ImportSymbol;

/// Imports of one library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryImports {
    pub library: String,
    pub symbols: Vec<ImportSymbol>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    pub name: String,
    pub ordinal: u32,
    pub target: ExportTarget,
}

/// Relocation entry counts by type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelocationSummary {
    pub blocks: usize,
    pub by_kind: BTreeMap<String, usize>,
}

/// Everything `pemap inspect` prints.
#[derive(Clone, Debug)]
pub struct ImageReport {
    pub headers: ImageHeaders,
    pub relocations: RelocationSummary,
    pub imports: Vec<LibraryImports>,
    pub exports: Vec<ExportEntry>,
    pub pogo: Vec<PogoEntry>,
}

/// Decode headers, relocations, imports, exports and POGO records.
///
/// # Errors
///
/// Any layout error in the headers or the tables.
pub fn inspect(file: &[u8]) -> Result<ImageReport> {
    let headers = ImageHeaders::parse(file)?;
    let image = headers.layout(file)?;
    let view = ImageView::new(&image, headers.width);

    let mut relocations = RelocationSummary::default();
    for block in view.relocation_blocks(headers.directory(DIRECTORY_ENTRY_BASERELOC)) {
        let (_, entries) = block?;
        relocations.blocks += 1;
        for entry in entries {
            *relocations.by_kind.entry(kind_name(entry.kind())).or_default() += 1;
        }
    }

    let mut imports = Vec::new();
    for descriptor in view.import_descriptors(headers.directory(DIRECTORY_ENTRY_IMPORT))? {
        let library = String::from_utf8_lossy(view.c_str(descriptor.name)?).into_owned();
        let symbols = view
            .thunks(descriptor.lookup_table())?
            .iter()
            .map(|thunk| {
                Ok(match thunk.decode()? {
                    ThunkKind::Ordinal(ordinal) => ImportSymbol::Ordinal(ordinal),
                    ThunkKind::Name(rva) => ImportSymbol::Name {
                        hint: view.import_by_name(rva)?.hint,
                        name: view.c_str(ImportByName::name_rva(rva))?.to_vec(),
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        imports.push(LibraryImports { library, symbols });
    }

    let mut exports = Vec::new();
    if let Some(table) = view.exports(headers.directory(DIRECTORY_ENTRY_EXPORT))? {
        for (name, index) in table.names()? {
            if let Some(target) = table.target_at(index)? {
                exports.push(ExportEntry {
                    name: String::from_utf8_lossy(&name).into_owned(),
                    ordinal: table.ordinal(index)?,
                    target,
                });
            }
        }
    }

    let pogo = view.pogo_entries(headers.directory(DIRECTORY_ENTRY_DEBUG))?;

    Ok(ImageReport {
        headers,
        relocations,
        imports,
        exports,
        pogo,
    })
}

fn kind_name(kind: RelocationKind) -> String {
    match kind {
        RelocationKind::Absolute => "ABSOLUTE".into(),
        RelocationKind::High => "HIGH".into(),
        RelocationKind::Low => "LOW".into(),
        RelocationKind::HighLow => "HIGHLOW".into(),
        RelocationKind::HighAdj => "HIGHADJ".into(),
        RelocationKind::Dir64 => "DIR64".into(),
        RelocationKind::Other(raw) => format!("TYPE{raw}"),
    }
}
