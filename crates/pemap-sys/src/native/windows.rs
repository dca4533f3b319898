//! Windows backend: VirtualAlloc, LoadLibrary and CreateThread.

use std::io;
use std::mem::ManuallyDrop;
use std::ptr;

use libloading::os::windows::{Library, Symbol};
use pemap_layout::Address;
use winapi::shared::minwindef::{DWORD, LPVOID};
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::processthreadsapi::{CreateThread, FlushInstructionCache, GetCurrentProcess};
use winapi::um::synchapi::WaitForSingleObject;
use winapi::um::winbase::{INFINITE, WAIT_FAILED};
use winapi::um::winnt::{HANDLE, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE};

use crate::platform::{MemoryRegion, SymbolRef};
use crate::{PlatformError, Result};

type ThreadStart = unsafe extern "system" fn(LPVOID) -> DWORD;

/// `PAGE_EXECUTE_READWRITE` committed region.
#[derive(Debug)]
pub struct NativeRegion {
    ptr: LPVOID,
    len: usize,
}

impl MemoryRegion for NativeRegion {
    fn base(&self) -> Address {
        Address::from(self.ptr)
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for NativeRegion {
    fn drop(&mut self) {
        unsafe {
            VirtualFree(self.ptr, 0, MEM_RELEASE);
        }
    }
}

unsafe impl Send for NativeRegion {}

pub fn allocate_rwx(size: usize) -> Result<NativeRegion> {
    let ptr = unsafe {
        VirtualAlloc(
            ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        )
    };
    if ptr.is_null() {
        return Err(PlatformError::Allocation {
            size,
            source: io::Error::last_os_error(),
        });
    }
    Ok(NativeRegion { ptr, len: size })
}

pub fn release_memory(region: NativeRegion) -> Result<()> {
    let region = ManuallyDrop::new(region);
    if unsafe { VirtualFree(region.ptr, 0, MEM_RELEASE) } == 0 {
        return Err(PlatformError::MemoryRelease(io::Error::last_os_error()));
    }
    Ok(())
}

#[derive(Debug)]
pub struct NativeLibrary {
    lib: Library,
}

pub fn open_library(name: &str) -> Result<NativeLibrary> {
    let lib = unsafe { Library::new(name) }.map_err(|e| PlatformError::LibraryOpen {
        name: name.to_string(),
        source: Box::new(e),
    })?;
    Ok(NativeLibrary { lib })
}

pub fn resolve_symbol(library: &NativeLibrary, symbol: SymbolRef<'_>) -> Result<Address> {
    let resolved: std::result::Result<Symbol<*const u8>, libloading::Error> = unsafe {
        match symbol {
            SymbolRef::Name(name) => library.lib.get(name),
            SymbolRef::Ordinal(ordinal) => library.lib.get_ordinal(ordinal),
        }
    };
    let sym = resolved.map_err(|e| PlatformError::SymbolResolve {
        symbol: symbol.to_string(),
        source: Box::new(e),
    })?;
    Ok(Address::from(*sym))
}

pub fn flush_instruction_cache(address: Address, len: usize) -> Result<()> {
    let ok = unsafe { FlushInstructionCache(GetCurrentProcess(), address.as_ptr(), len) };
    if ok == 0 {
        return Err(PlatformError::FlushInstructionCache(io::Error::last_os_error()));
    }
    Ok(())
}

/// Owned thread handle, closed on drop.
#[derive(Debug)]
pub struct NativeThread {
    handle: HANDLE,
}

impl Drop for NativeThread {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

unsafe impl Send for NativeThread {}

pub unsafe fn create_thread(entry: Address) -> Result<NativeThread> {
    let start = unsafe { std::mem::transmute::<usize, ThreadStart>(entry.get()) };
    let handle = unsafe {
        CreateThread(
            ptr::null_mut(),
            0,
            Some(start),
            ptr::null_mut(),
            0,
            ptr::null_mut(),
        )
    };
    if handle.is_null() {
        return Err(PlatformError::ThreadCreate(io::Error::last_os_error()));
    }
    Ok(NativeThread { handle })
}

pub fn wait_for_completion(thread: &NativeThread) -> Result<()> {
    if unsafe { WaitForSingleObject(thread.handle, INFINITE) } == WAIT_FAILED {
        return Err(PlatformError::ThreadWait(io::Error::last_os_error()));
    }
    Ok(())
}

pub fn release_handle(thread: NativeThread) -> Result<()> {
    let thread = ManuallyDrop::new(thread);
    if unsafe { CloseHandle(thread.handle) } == 0 {
        return Err(PlatformError::HandleRelease(io::Error::last_os_error()));
    }
    Ok(())
}
