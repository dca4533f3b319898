//! Unix backend: anonymous mmap, dlopen and std threads.

use std::ffi::c_void;
use std::io;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::thread::JoinHandle;

use libloading::os::unix::{Library, RTLD_NOW, Symbol};
use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, munmap};
use parking_lot::Mutex;
use pemap_layout::Address;
use tracing::warn;

use crate::platform::{MemoryRegion, SymbolRef};
use crate::{PlatformError, Result};

/// Read-write-execute anonymous mapping.
#[derive(Debug)]
pub struct NativeRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

impl MemoryRegion for NativeRegion {
    fn base(&self) -> Address {
        Address::from(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for NativeRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr, self.len);
        }
    }
}

// NativeRegion is Send but not Sync (contains raw pointer)
unsafe impl Send for NativeRegion {}

pub fn allocate_rwx(size: usize) -> Result<NativeRegion> {
    let len = NonZeroUsize::new(size).ok_or(PlatformError::InvalidSize(size))?;
    let ptr = unsafe {
        mmap_anonymous(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
            MapFlags::MAP_PRIVATE,
        )
    }
    .map_err(|errno| PlatformError::Allocation {
        size,
        source: io::Error::from(errno),
    })?;
    Ok(NativeRegion { ptr, len: size })
}

pub fn release_memory(region: NativeRegion) -> Result<()> {
    let region = std::mem::ManuallyDrop::new(region);
    unsafe { munmap(region.ptr, region.len) }
        .map_err(|errno| PlatformError::MemoryRelease(io::Error::from(errno)))
}

/// Library loaded with `RTLD_NOW`.
#[derive(Debug)]
pub struct NativeLibrary {
    lib: Library,
}

pub fn open_library(name: &str) -> Result<NativeLibrary> {
    // RTLD_NOW surfaces missing transitive symbols here instead of at first call.
    let lib = unsafe { Library::open(Some(name), RTLD_NOW) }.map_err(|e| {
        PlatformError::LibraryOpen {
            name: name.to_string(),
            source: Box::new(e),
        }
    })?;
    Ok(NativeLibrary { lib })
}

pub fn resolve_symbol(library: &NativeLibrary, symbol: SymbolRef<'_>) -> Result<Address> {
    let name = match symbol {
        SymbolRef::Name(name) => name,
        SymbolRef::Ordinal(ordinal) => return Err(PlatformError::OrdinalUnsupported(ordinal)),
    };

    unsafe {
        let sym: Symbol<*const c_void> = library.lib.get(name).map_err(|e| {
            PlatformError::SymbolResolve {
                symbol: symbol.to_string(),
                source: Box::new(e),
            }
        })?;
        Ok(Address::from(*sym))
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
unsafe extern "C" {
    fn __clear_cache(start: *mut std::ffi::c_char, end: *mut std::ffi::c_char);
}

#[allow(clippy::unnecessary_wraps)]
pub fn flush_instruction_cache(address: Address, len: usize) -> Result<()> {
    // x86 keeps instruction fetch coherent with stores; a fence is enough.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let _ = (address, len);
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    unsafe {
        let start = address.as_mut_ptr::<std::ffi::c_char>();
        __clear_cache(start, start.add(len));
    }
    Ok(())
}

/// Thread running mapped code.
#[derive(Debug)]
pub struct NativeThread {
    handle: Mutex<Option<JoinHandle<()>>>,
}

pub unsafe fn create_thread(entry: Address) -> Result<NativeThread> {
    let entry = entry.get();
    let handle = std::thread::Builder::new()
        .name("pemap-entry".into())
        .spawn(move || {
            let func = unsafe { std::mem::transmute::<usize, unsafe extern "C" fn()>(entry) };
            unsafe { func() };
        })
        .map_err(PlatformError::ThreadCreate)?;
    Ok(NativeThread {
        handle: Mutex::new(Some(handle)),
    })
}

pub fn wait_for_completion(thread: &NativeThread) -> Result<()> {
    let Some(handle) = thread.handle.lock().take() else {
        warn!("thread already joined");
        return Ok(());
    };
    handle
        .join()
        .map_err(|_| PlatformError::ThreadWait(io::Error::other("entry thread panicked")))
}

#[allow(clippy::unnecessary_wraps)]
pub fn release_handle(thread: NativeThread) -> Result<()> {
    // Dropping an unjoined JoinHandle detaches the thread.
    drop(thread);
    Ok(())
}
