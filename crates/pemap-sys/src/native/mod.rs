//! Capabilities backed by the host OS.
//!
//! Raw memory operations are the same everywhere; allocation, libraries,
//! cache maintenance and threads come from the per-OS module.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

pub use sys::{NativeLibrary, NativeRegion, NativeThread};

use pemap_layout::Address;
use tracing::{debug, trace};

use crate::platform::{MemoryRegion, Platform, SymbolRef, check_allocation_size};
use crate::Result;

/// The real host.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativePlatform;

impl NativePlatform {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Platform for NativePlatform {
    type Region = NativeRegion;
    type Library = NativeLibrary;
    type Thread = NativeThread;

    fn allocate_executable(&self, size: usize) -> Result<NativeRegion> {
        check_allocation_size(size)?;
        let region = sys::allocate_rwx(size)?;
        debug!(base = %region.base(), size = format!("{size:#x}"), "allocated executable memory");
        Ok(region)
    }

    unsafe fn copy_memory(&self, source: &[u8], destination: Address) {
        trace!(dest = %destination, len = source.len(), "copy");
        unsafe {
            std::ptr::copy_nonoverlapping(
                source.as_ptr(),
                destination.as_mut_ptr::<u8>(),
                source.len(),
            );
        }
    }

    unsafe fn increment_u16(&self, address: Address, value: u16) {
        let ptr = address.as_mut_ptr::<u16>();
        unsafe { ptr.write_unaligned(ptr.read_unaligned().wrapping_add(value)) };
    }

    unsafe fn increment_u32(&self, address: Address, value: u32) {
        let ptr = address.as_mut_ptr::<u32>();
        unsafe { ptr.write_unaligned(ptr.read_unaligned().wrapping_add(value)) };
    }

    unsafe fn increment_u64(&self, address: Address, value: u64) {
        let ptr = address.as_mut_ptr::<u64>();
        unsafe { ptr.write_unaligned(ptr.read_unaligned().wrapping_add(value)) };
    }

    unsafe fn read_c_string(&self, address: Address) -> Vec<u8> {
        let mut ptr = address.as_ptr::<u8>();
        let mut out = Vec::new();
        loop {
            let byte = unsafe { ptr.read() };
            if byte == 0 {
                break;
            }
            out.push(byte);
            ptr = unsafe { ptr.add(1) };
        }
        out
    }

    fn open_library(&self, name: &str) -> Result<NativeLibrary> {
        debug!(library = name, "opening library");
        sys::open_library(name)
    }

    fn resolve_symbol(&self, library: &NativeLibrary, symbol: SymbolRef<'_>) -> Result<Address> {
        let address = sys::resolve_symbol(library, symbol)?;
        trace!(%symbol, %address, "resolved symbol");
        Ok(address)
    }

    fn flush_instruction_cache(&self, address: Address, len: usize) -> Result<()> {
        sys::flush_instruction_cache(address, len)
    }

    unsafe fn create_thread(&self, entry: Address) -> Result<NativeThread> {
        debug!(%entry, "starting thread");
        unsafe { sys::create_thread(entry) }
    }

    fn wait_for_completion(&self, thread: &NativeThread) -> Result<()> {
        sys::wait_for_completion(thread)
    }

    fn release_handle(&self, thread: NativeThread) -> Result<()> {
        sys::release_handle(thread)
    }

    fn release_memory(&self, region: NativeRegion) -> Result<()> {
        sys::release_memory(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlatformError;

    #[test]
    fn test_allocate_rejects_bad_sizes() {
        let platform = NativePlatform::new();
        assert!(matches!(
            platform.allocate_executable(0),
            Err(PlatformError::InvalidSize(0))
        ));
        assert!(matches!(
            platform.allocate_executable(usize::MAX),
            Err(PlatformError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_copy_increment_and_read() {
        let platform = NativePlatform::new();
        let region = platform
            .allocate_executable(4096)
            .expect("allocation should succeed");
        assert!(!region.base().is_null());
        assert_eq!(region.len(), 4096);

        let base = region.base();
        unsafe {
            platform.copy_memory(&0x1234_5678u32.to_le_bytes(), base);
            platform.copy_memory(b"abc\0", base.byte_add(16));
            platform.increment_u32(base, 0x2000);
            platform.increment_u16(base.byte_add(8), 0xFFFF);
            platform.increment_u64(base.byte_add(24), 7);

            assert_eq!(base.as_ptr::<u32>().read_unaligned(), 0x1234_7678);
            assert_eq!(base.byte_add(8).as_ptr::<u16>().read_unaligned(), 0xFFFF);
            assert_eq!(base.byte_add(24).as_ptr::<u64>().read_unaligned(), 7);
            assert_eq!(platform.read_c_string(base.byte_add(16)), b"abc");
            assert_eq!(platform.read_c_string(base.byte_add(19)), b"");
        }

        platform.flush_instruction_cache(base, 4096).unwrap();
        platform.release_memory(region).unwrap();
    }

    #[test]
    fn test_open_missing_library() {
        let platform = NativePlatform::new();
        let err = platform
            .open_library("pemap-definitely-missing-library")
            .unwrap_err();
        assert!(err.is_resolution_failure());
    }
}
