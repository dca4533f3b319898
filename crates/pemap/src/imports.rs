//! Import binding.

use std::fmt;

use pemap_layout::{Address, DataDirectory, ImageView, ImportByName, LayoutError, Rva, ThunkKind};
use pemap_sys::{MemoryRegion, Platform, SymbolRef};
use tracing::{debug, trace};

use crate::Result;

/// How an import names its target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportSymbol {
    Ordinal(u16),
    Name { hint: u16, name: Vec<u8> },
}

impl ImportSymbol {
    #[must_use]
    pub fn as_symbol_ref(&self) -> SymbolRef<'_> {
        match self {
            Self::Ordinal(ordinal) => SymbolRef::Ordinal(*ordinal),
            Self::Name { name, .. } => SymbolRef::Name(name),
        }
    }
}

impl fmt::Display for ImportSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_symbol_ref(), f)
    }
}

/// One bound address-table slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundImport {
    pub library: String,
    pub symbol: ImportSymbol,
    /// RVA of the address-table slot that was written.
    pub slot: Rva,
    pub address: Address,
}

/// Result of binding: the libraries opened and every slot written.
///
/// The libraries must stay open for as long as the image may run.
#[derive(Debug)]
pub struct BoundImports<L> {
    pub libraries: Vec<(String, L)>,
    pub bound: Vec<BoundImport>,
}

impl<L> Default for BoundImports<L> {
    fn default() -> Self {
        Self {
            libraries: Vec::new(),
            bound: Vec::new(),
        }
    }
}

/// Bind every import in `directory` for the image mapped in `region`.
///
/// For each descriptor the library name is read from mapped memory and the
/// library opened through `platform`. The lookup table is walked in order;
/// every thunk is resolved by ordinal or by name and the address written
/// into the matching slot of the address table at the image's pointer
/// width.
///
/// Strings are checked for a terminator in `view` before they are read
/// from mapped memory, so `view` must hold the same bytes as `region`.
///
/// # Errors
///
/// Layout errors for malformed tables, [`pemap_sys::PlatformError`] for
/// libraries or symbols that cannot be resolved.
pub fn bind_imports<P: Platform>(
    platform: &P,
    region: &P::Region,
    view: &ImageView<'_>,
    directory: DataDirectory,
) -> Result<BoundImports<P::Library>> {
    let mut imports = BoundImports::default();
    let base = region.base();
    let width = view.width();

    for descriptor in view.import_descriptors(directory)? {
        let library_name = mapped_c_string(platform, region, view, descriptor.name)?;
        let library_name = String::from_utf8_lossy(&library_name).into_owned();
        let library = platform.open_library(&library_name)?;
        debug!(library = %library_name, "binding imports");

        let thunks = view.thunks(descriptor.lookup_table())?;
        for (index, thunk) in thunks.iter().enumerate() {
            let symbol = match thunk.decode()? {
                ThunkKind::Ordinal(ordinal) => ImportSymbol::Ordinal(ordinal),
                ThunkKind::Name(rva) => ImportSymbol::Name {
                    hint: view.import_by_name(rva)?.hint,
                    name: mapped_c_string(platform, region, view, ImportByName::name_rva(rva))?,
                },
            };
            let address = platform.resolve_symbol(&library, symbol.as_symbol_ref())?;

            let slot = slot_rva(descriptor.first_thunk, index, width.size())?;
            let target = base.offset(slot);
            if !region.contains(target, width.size()) {
                return Err(LayoutError::OutOfBounds {
                    offset: slot as usize,
                    len: width.size(),
                }
                .into());
            }
            // Slot is inside the region, checked above.
            unsafe { platform.copy_memory(&width.encode(address.get() as u64), target) };
            trace!(%symbol, %address, slot = format!("{slot:#x}"), "bound");

            imports.bound.push(BoundImport {
                library: library_name.clone(),
                symbol,
                slot,
                address,
            });
        }

        imports.libraries.push((library_name, library));
    }

    Ok(imports)
}

fn slot_rva(first_thunk: Rva, index: usize, size: usize) -> Result<Rva> {
    index
        .checked_mul(size)
        .and_then(|offset| u32::try_from(offset).ok())
        .and_then(|offset| first_thunk.checked_add(offset))
        .ok_or_else(|| {
            LayoutError::OutOfBounds {
                offset: first_thunk as usize,
                len: index.saturating_mul(size),
            }
            .into()
        })
}

/// Read the string at `rva` out of mapped memory once `view` has shown it
/// is terminated inside the image.
fn mapped_c_string<P: Platform>(
    platform: &P,
    region: &P::Region,
    view: &ImageView<'_>,
    rva: Rva,
) -> Result<Vec<u8>> {
    let len = view.c_str(rva)?.len();
    let address = region.base().offset(rva);
    if !region.contains(address, len + 1) {
        return Err(LayoutError::OutOfBounds {
            offset: rva as usize,
            len: len + 1,
        }
        .into());
    }
    Ok(unsafe { platform.read_c_string(address) })
}
