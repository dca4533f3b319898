//! Mapping pipeline: allocate, copy, relocate, bind, flush, run.

use pemap_layout::{
    Address, DIRECTORY_ENTRY_BASERELOC, DIRECTORY_ENTRY_EXPORT, DIRECTORY_ENTRY_IMPORT,
    ExportTarget, ImageHeaders, ImageView, LayoutError, PointerWidth, Rva,
};
use pemap_sys::{MemoryRegion, Platform, SymbolRef, check_allocation_size};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::imports::{BoundImport, BoundImports, bind_imports};
use crate::relocate::{RelocationStats, relocate};
use crate::{LoadError, Result};

/// Maps PE images into memory obtained from a [`Platform`].
///
/// All writes into an image happen on the calling thread.
pub struct Loader<'p, P: Platform> {
    platform: &'p P,
    config: LoaderConfig,
}

impl<'p, P: Platform> Loader<'p, P> {
    #[must_use]
    pub const fn new(platform: &'p P, config: LoaderConfig) -> Self {
        Self { platform, config }
    }

    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Map `file` and make it ready to run, without running it.
    ///
    /// On error everything allocated or opened so far is released.
    ///
    /// # Errors
    ///
    /// Header, relocation and import errors, and any capability failure.
    pub fn map(&self, file: &[u8]) -> Result<MappedModule<'p, P>> {
        let headers = ImageHeaders::parse(file)?;
        if file.len() < headers.size_of_headers as usize {
            return Err(LoadError::ImageTooSmall {
                required: headers.size_of_headers as usize,
                actual: file.len(),
            });
        }
        if headers.width != PointerWidth::host() {
            return Err(LoadError::UnsupportedWidth(headers.width));
        }

        check_allocation_size(headers.size_of_image as usize)?;

        // Driver-side copy in mapped layout; tables are decoded from here.
        let image = headers.layout(file)?;
        let view = ImageView::new(&image, headers.width);

        let region = self.platform.allocate_executable(image.len())?;
        let base = region.base();
        info!(
            base = %base,
            size = format!("{:#x}", image.len()),
            sections = headers.sections.len(),
            "mapping image"
        );

        self.copy_image(&region, &headers, file)?;

        let delta = (base.get() as u64).wrapping_sub(headers.image_base);
        let reloc_dir = headers.directory(DIRECTORY_ENTRY_BASERELOC);
        let relocations = if delta == 0 {
            RelocationStats::default()
        } else if reloc_dir.is_present() && !headers.relocations_stripped() {
            relocate(self.platform, &region, &view, reloc_dir, delta)?
        } else if self.config.allow_relocation_skip {
            warn!(
                preferred = format!("{:#x}", headers.image_base),
                actual = %base,
                "image has no relocations, mapping away from preferred base anyway"
            );
            RelocationStats::default()
        } else {
            return Err(LoadError::RelocationsStripped);
        };
        debug!(
            delta = format!("{delta:#x}"),
            blocks = relocations.blocks,
            applied = relocations.applied,
            "relocated"
        );

        let imports = bind_imports(
            self.platform,
            &region,
            &view,
            headers.directory(DIRECTORY_ENTRY_IMPORT),
        )?;
        debug!(
            libraries = imports.libraries.len(),
            symbols = imports.bound.len(),
            "imports bound"
        );

        if self.config.flush_instruction_cache {
            self.platform.flush_instruction_cache(base, region.len())?;
        }

        Ok(MappedModule {
            platform: self.platform,
            region,
            headers,
            image,
            delta,
            relocations,
            imports,
        })
    }

    /// Map `file` and, if the config asks for it, run its entry point.
    ///
    /// # Safety
    ///
    /// With `execute_entry` set this runs code from `file` in the current
    /// process. See [`MappedModule::execute`].
    ///
    /// # Errors
    ///
    /// See [`Loader::map`] and [`MappedModule::execute`].
    pub unsafe fn load(&self, file: &[u8]) -> Result<MappedModule<'p, P>> {
        let module = self.map(file)?;
        if self.config.execute_entry {
            unsafe { module.execute()? };
        }
        Ok(module)
    }

    fn copy_image(&self, region: &P::Region, headers: &ImageHeaders, file: &[u8]) -> Result<()> {
        let base = region.base();
        let header_bytes = headers.header_bytes(file);
        // The region is at least size_of_image and header_bytes is clamped to it.
        unsafe { self.platform.copy_memory(header_bytes, base) };

        for section in &headers.sections {
            let bytes = headers.section_bytes(file, section)?;
            let target = base.offset(section.virtual_address);
            if !region.contains(target, bytes.len()) {
                return Err(LayoutError::OutOfBounds {
                    offset: section.virtual_address as usize,
                    len: bytes.len(),
                }
                .into());
            }
            debug!(
                section = %section.name(),
                rva = format!("{:#x}", section.virtual_address),
                size = format!("{:#x}", bytes.len()),
                "copy section"
            );
            // Bounds checked above; the rest of the section stays zero.
            unsafe { self.platform.copy_memory(bytes, target) };
        }
        Ok(())
    }
}

/// An image mapped into executable memory.
///
/// Dropping it releases the region and closes the libraries through their
/// own `Drop`; [`MappedModule::release`] does the same and reports errors.
pub struct MappedModule<'p, P: Platform> {
    platform: &'p P,
    region: P::Region,
    headers: ImageHeaders,
    image: Vec<u8>,
    delta: u64,
    relocations: RelocationStats,
    imports: BoundImports<P::Library>,
}

impl<P: Platform> MappedModule<'_, P> {
    #[must_use]
    pub fn base(&self) -> Address {
        self.region.base()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.region.len()
    }

    #[must_use]
    pub const fn headers(&self) -> &ImageHeaders {
        &self.headers
    }

    /// Actual base minus preferred base.
    #[must_use]
    pub const fn delta(&self) -> u64 {
        self.delta
    }

    #[must_use]
    pub const fn relocations(&self) -> RelocationStats {
        self.relocations
    }

    #[must_use]
    pub fn imports(&self) -> &[BoundImport] {
        &self.imports.bound
    }

    /// Absolute address of `rva` in the mapped image.
    #[must_use]
    pub fn address_of(&self, rva: Rva) -> Address {
        self.base().offset(rva)
    }

    /// Entry point, or `None` when the image has none.
    #[must_use]
    pub fn entry_point(&self) -> Option<Address> {
        (self.headers.entry_point != 0).then(|| self.address_of(self.headers.entry_point))
    }

    /// Address of the export named `name`.
    ///
    /// Forwarded exports are resolved through the platform; the library
    /// they point at stays open with the module.
    ///
    /// # Errors
    ///
    /// Layout errors for a malformed export table, platform errors for a
    /// forwarder that cannot be resolved.
    pub fn resolve_export(&mut self, name: &[u8]) -> Result<Option<Address>> {
        let view = ImageView::new(&self.image, self.headers.width);
        let target = view.find_export(self.headers.directory(DIRECTORY_ENTRY_EXPORT), name)?;
        match target {
            None => Ok(None),
            Some(ExportTarget::Rva(rva)) => Ok(Some(self.address_of(rva))),
            Some(ExportTarget::Forwarder(forwarder)) => self.resolve_forwarder(&forwarder).map(Some),
        }
    }

    fn resolve_forwarder(&mut self, forwarder: &[u8]) -> Result<Address> {
        let (module, symbol) = split_forwarder(forwarder)?;
        debug!(library = %module, "following export forwarder");
        let library = self.platform.open_library(&module)?;
        let symbol = match symbol.strip_prefix(b"#") {
            Some(digits) => SymbolRef::Ordinal(parse_ordinal(digits, forwarder)?),
            None => SymbolRef::Name(symbol),
        };
        let address = self.platform.resolve_symbol(&library, symbol)?;
        self.imports.libraries.push((module, library));
        Ok(address)
    }

    /// Run the entry point on a new thread and wait for it to return.
    ///
    /// # Safety
    ///
    /// Runs code from the image in this process with no arguments. The
    /// caller must trust the image and its entry point must follow the
    /// host calling convention for a no-argument function.
    ///
    /// # Errors
    ///
    /// [`LoadError::NoEntryPoint`], or thread creation, wait or handle
    /// failures from the platform.
    pub unsafe fn execute(&self) -> Result<()> {
        let entry = self.entry_point().ok_or(LoadError::NoEntryPoint)?;
        info!(%entry, "starting entry point");
        let thread = unsafe { self.platform.create_thread(entry)? };
        self.platform.wait_for_completion(&thread)?;
        self.platform.release_handle(thread)?;
        debug!(%entry, "entry point returned");
        Ok(())
    }

    /// Free the image memory, then close its libraries.
    ///
    /// # Errors
    ///
    /// [`pemap_sys::PlatformError::MemoryRelease`] if the OS refuses.
    pub fn release(self) -> Result<()> {
        let Self {
            platform,
            region,
            imports,
            ..
        } = self;
        platform.release_memory(region)?;
        drop(imports);
        Ok(())
    }
}

/// Split `"MODULE.Symbol"` into a library name and a symbol.
fn split_forwarder(forwarder: &[u8]) -> Result<(String, &[u8])> {
    let dot = forwarder
        .iter()
        .rposition(|&b| b == b'.')
        .ok_or_else(|| LoadError::MalformedForwarder(String::from_utf8_lossy(forwarder).into_owned()))?;
    let module = String::from_utf8_lossy(&forwarder[..dot]);
    let library = if module.contains('.') {
        module.into_owned()
    } else {
        format!("{module}.dll")
    };
    Ok((library, &forwarder[dot + 1..]))
}

fn parse_ordinal(digits: &[u8], forwarder: &[u8]) -> Result<u16> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| LoadError::MalformedForwarder(String::from_utf8_lossy(forwarder).into_owned()))
}
