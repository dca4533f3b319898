//! In-memory platform for tests.
//!
//! Regions live in a synthetic address space backed by `Vec<u8>`, libraries
//! are registered export tables, and threads only record their entry point.
//! Every call is counted so tests can check that handles were released.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use pemap_layout::Address;
use tracing::trace;

use crate::platform::{MemoryRegion, Platform, SymbolRef, check_allocation_size};
use crate::{PlatformError, Result};

/// First address handed out by the fake allocator.
pub const FAKE_BASE: usize = 0x1_4000_0000;

/// Exports of a registered fake library.
#[derive(Clone, Debug, Default)]
pub struct FakeLibrary {
    names: HashMap<Vec<u8>, Address>,
    ordinals: HashMap<u16, Address>,
}

impl FakeLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_export(mut self, name: &str, address: usize) -> Self {
        self.names.insert(name.as_bytes().to_vec(), Address::new(address));
        self
    }

    #[must_use]
    pub fn with_ordinal(mut self, ordinal: u16, address: usize) -> Self {
        self.ordinals.insert(ordinal, Address::new(address));
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    regions: BTreeMap<usize, Vec<u8>>,
    next_base: usize,
    libraries: HashMap<String, FakeLibrary>,
    open_libraries: usize,
    threads_started: Vec<Address>,
    open_threads: usize,
    flushes: Vec<(Address, usize)>,
    fail_allocation: bool,
}

impl FakeState {
    /// Region bytes covering `[address, address + len)`.
    fn bytes_mut(&mut self, address: Address, len: usize) -> &mut [u8] {
        let addr = address.get();
        let Some((&base, bytes)) = self.regions.range_mut(..=addr).next_back() else {
            panic!("fake access at {address} outside any region");
        };
        let start = addr - base;
        assert!(
            start + len <= bytes.len(),
            "fake access of {len} bytes at {address} overruns region at {base:#x}"
        );
        &mut bytes[start..start + len]
    }
}

/// Test double for [`Platform`].
///
/// # Panics
///
/// Memory operations panic when they touch bytes outside a live region.
#[derive(Clone, Debug)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_base: FAKE_BASE,
                ..FakeState::default()
            })),
        }
    }

    /// Make `name` loadable.
    pub fn register_library(&self, name: &str, library: FakeLibrary) {
        self.state
            .lock()
            .libraries
            .insert(name.to_ascii_lowercase(), library);
    }

    /// Make subsequent allocations fail as if the OS refused.
    pub fn fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocation = fail;
    }

    /// Copy of `len` bytes at `address`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside an allocated region.
    #[must_use]
    pub fn read(&self, address: Address, len: usize) -> Vec<u8> {
        self.state.lock().bytes_mut(address, len).to_vec()
    }

    #[must_use]
    pub fn read_u32(&self, address: Address) -> u32 {
        let bytes = self.read(address, 4);
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[must_use]
    pub fn read_u64(&self, address: Address) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.read(address, 8));
        u64::from_le_bytes(buf)
    }

    #[must_use]
    pub fn live_regions(&self) -> usize {
        self.state.lock().regions.len()
    }

    #[must_use]
    pub fn open_libraries(&self) -> usize {
        self.state.lock().open_libraries
    }

    #[must_use]
    pub fn open_threads(&self) -> usize {
        self.state.lock().open_threads
    }

    /// Entry addresses of every thread started, in order.
    #[must_use]
    pub fn threads_started(&self) -> Vec<Address> {
        self.state.lock().threads_started.clone()
    }

    /// Every instruction-cache flush, in order.
    #[must_use]
    pub fn flushes(&self) -> Vec<(Address, usize)> {
        self.state.lock().flushes.clone()
    }
}

/// Region in the fake address space. Freed on drop.
#[derive(Debug)]
pub struct FakeRegion {
    base: Address,
    len: usize,
    state: Arc<Mutex<FakeState>>,
}

impl MemoryRegion for FakeRegion {
    fn base(&self) -> Address {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for FakeRegion {
    fn drop(&mut self) {
        self.state.lock().regions.remove(&self.base.get());
    }
}

/// Handle to a registered library. Counted until dropped.
#[derive(Debug)]
pub struct FakeLibraryHandle {
    name: String,
    exports: FakeLibrary,
    state: Arc<Mutex<FakeState>>,
}

impl FakeLibraryHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FakeLibraryHandle {
    fn drop(&mut self) {
        self.state.lock().open_libraries -= 1;
    }
}

/// Recorded thread. The entry point is never executed.
#[derive(Debug)]
pub struct FakeThread {
    entry: Address,
    state: Arc<Mutex<FakeState>>,
}

impl FakeThread {
    #[must_use]
    pub const fn entry(&self) -> Address {
        self.entry
    }
}

impl Drop for FakeThread {
    fn drop(&mut self) {
        self.state.lock().open_threads -= 1;
    }
}

impl Platform for FakePlatform {
    type Region = FakeRegion;
    type Library = FakeLibraryHandle;
    type Thread = FakeThread;

    fn allocate_executable(&self, size: usize) -> Result<FakeRegion> {
        check_allocation_size(size)?;
        let mut state = self.state.lock();
        if state.fail_allocation {
            return Err(PlatformError::Allocation {
                size,
                source: io::Error::from(io::ErrorKind::OutOfMemory),
            });
        }

        let base = state.next_base;
        // Leave a page gap so adjacent regions never look contiguous.
        state.next_base = base + size.next_multiple_of(0x1000) + 0x1000;
        state.regions.insert(base, vec![0u8; size]);
        trace!(base = format!("{base:#x}"), size, "fake allocation");

        Ok(FakeRegion {
            base: Address::new(base),
            len: size,
            state: Arc::clone(&self.state),
        })
    }

    unsafe fn copy_memory(&self, source: &[u8], destination: Address) {
        self.state
            .lock()
            .bytes_mut(destination, source.len())
            .copy_from_slice(source);
    }

    unsafe fn increment_u16(&self, address: Address, value: u16) {
        let mut state = self.state.lock();
        let bytes = state.bytes_mut(address, 2);
        let old = u16::from_le_bytes([bytes[0], bytes[1]]);
        bytes.copy_from_slice(&old.wrapping_add(value).to_le_bytes());
    }

    unsafe fn increment_u32(&self, address: Address, value: u32) {
        let mut state = self.state.lock();
        let bytes = state.bytes_mut(address, 4);
        let old = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        bytes.copy_from_slice(&old.wrapping_add(value).to_le_bytes());
    }

    unsafe fn increment_u64(&self, address: Address, value: u64) {
        let mut state = self.state.lock();
        let bytes = state.bytes_mut(address, 8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        bytes.copy_from_slice(&u64::from_le_bytes(buf).wrapping_add(value).to_le_bytes());
    }

    unsafe fn read_c_string(&self, address: Address) -> Vec<u8> {
        let mut state = self.state.lock();
        let mut out = Vec::new();
        let mut cursor = address;
        loop {
            let byte = state.bytes_mut(cursor, 1)[0];
            if byte == 0 {
                return out;
            }
            out.push(byte);
            cursor = cursor.byte_add(1);
        }
    }

    fn open_library(&self, name: &str) -> Result<FakeLibraryHandle> {
        let mut state = self.state.lock();
        let Some(exports) = state.libraries.get(&name.to_ascii_lowercase()).cloned() else {
            return Err(PlatformError::LibraryOpen {
                name: name.to_string(),
                source: Box::new(io::Error::from(io::ErrorKind::NotFound)),
            });
        };
        state.open_libraries += 1;
        Ok(FakeLibraryHandle {
            name: name.to_string(),
            exports,
            state: Arc::clone(&self.state),
        })
    }

    fn resolve_symbol(&self, library: &FakeLibraryHandle, symbol: SymbolRef<'_>) -> Result<Address> {
        let found = match symbol {
            SymbolRef::Name(name) => library.exports.names.get(name),
            SymbolRef::Ordinal(ordinal) => library.exports.ordinals.get(&ordinal),
        };
        found.copied().ok_or_else(|| PlatformError::SymbolResolve {
            symbol: format!("{}!{symbol}", library.name),
            source: Box::new(io::Error::from(io::ErrorKind::NotFound)),
        })
    }

    fn flush_instruction_cache(&self, address: Address, len: usize) -> Result<()> {
        self.state.lock().flushes.push((address, len));
        Ok(())
    }

    unsafe fn create_thread(&self, entry: Address) -> Result<FakeThread> {
        let mut state = self.state.lock();
        state.threads_started.push(entry);
        state.open_threads += 1;
        Ok(FakeThread {
            entry,
            state: Arc::clone(&self.state),
        })
    }

    fn wait_for_completion(&self, _thread: &FakeThread) -> Result<()> {
        Ok(())
    }

    fn release_handle(&self, thread: FakeThread) -> Result<()> {
        drop(thread);
        Ok(())
    }

    fn release_memory(&self, region: FakeRegion) -> Result<()> {
        drop(region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zero_fails() {
        let platform = FakePlatform::new();
        assert!(matches!(
            platform.allocate_executable(0),
            Err(PlatformError::InvalidSize(0))
        ));
        assert!(platform.allocate_executable(usize::MAX).is_err());
        assert_eq!(platform.live_regions(), 0);
    }

    #[test]
    fn test_refused_allocation_reports_status() {
        let platform = FakePlatform::new();
        platform.fail_allocations(true);
        let err = platform.allocate_executable(0x1000).unwrap_err();
        assert!(matches!(err, PlatformError::Allocation { size: 0x1000, .. }));
        assert!(!err.is_resolution_failure());
    }

    #[test]
    fn test_read_c_string() {
        let platform = FakePlatform::new();
        let region = platform.allocate_executable(0x100).unwrap();
        let base = region.base();
        unsafe {
            platform.copy_memory(b"abc\0\0", base);
            assert_eq!(platform.read_c_string(base), b"abc");
            assert_eq!(platform.read_c_string(base.byte_add(3)), b"");
        }
    }

    #[test]
    fn test_highlow_identity_and_additivity() {
        let platform = FakePlatform::new();
        let region = platform.allocate_executable(0x100).unwrap();
        let a = region.base();
        let b = region.base().byte_add(0x10);
        unsafe {
            platform.copy_memory(&0x0040_1000u32.to_le_bytes(), a);
            platform.copy_memory(&0x0040_1000u32.to_le_bytes(), b);

            platform.increment_u32(a, 0);
            assert_eq!(platform.read_u32(a), 0x0040_1000);

            platform.increment_u32(a, 0x1234);
            platform.increment_u32(a, 0xFFFF_0000);
            platform.increment_u32(b, 0x1234u32.wrapping_add(0xFFFF_0000));
        }
        assert_eq!(platform.read_u32(a), platform.read_u32(b));
    }

    #[test]
    fn test_increment_widths_touch_only_their_bytes() {
        let platform = FakePlatform::new();
        let region = platform.allocate_executable(0x20).unwrap();
        let base = region.base();
        unsafe {
            platform.copy_memory(&[0xFF; 0x20], base);
            platform.increment_u16(base, 1);
            platform.increment_u64(base.byte_add(8), 1);
        }
        let bytes = platform.read(base, 0x20);
        assert_eq!(&bytes[0..2], &[0, 0]);
        assert_eq!(bytes[2], 0xFF);
        assert_eq!(&bytes[8..16], &[0; 8]);
        assert_eq!(bytes[16], 0xFF);
    }

    #[test]
    fn test_libraries_and_symbols() {
        let platform = FakePlatform::new();
        platform.register_library(
            "KERNEL32.dll",
            FakeLibrary::new()
                .with_export("Sleep", 0x7FF0_1000)
                .with_ordinal(5, 0x7FF0_2000),
        );

        let lib = platform.open_library("kernel32.DLL").unwrap();
        assert_eq!(platform.open_libraries(), 1);
        assert_eq!(
            platform.resolve_symbol(&lib, SymbolRef::Name(b"Sleep")).unwrap(),
            Address::new(0x7FF0_1000)
        );
        assert_eq!(
            platform.resolve_symbol(&lib, SymbolRef::Ordinal(5)).unwrap(),
            Address::new(0x7FF0_2000)
        );
        assert!(platform.resolve_symbol(&lib, SymbolRef::Ordinal(6)).is_err());
        drop(lib);
        assert_eq!(platform.open_libraries(), 0);

        let err = platform.open_library("missing.dll").unwrap_err();
        assert!(err.is_resolution_failure());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_thread_lifecycle() {
        let platform = FakePlatform::new();
        let thread = unsafe { platform.create_thread(Address::new(0x1000)).unwrap() };
        assert_eq!(platform.open_threads(), 1);
        platform.wait_for_completion(&thread).unwrap();
        platform.release_handle(thread).unwrap();
        assert_eq!(platform.open_threads(), 0);
        assert_eq!(platform.threads_started(), vec![Address::new(0x1000)]);
    }

    #[test]
    fn test_region_released_on_drop() {
        let platform = FakePlatform::new();
        let first = platform.allocate_executable(0x1000).unwrap();
        let second = platform.allocate_executable(0x1000).unwrap();
        assert!(second.base().get() >= first.base().get() + 0x2000);
        assert_eq!(platform.live_regions(), 2);
        platform.release_memory(first).unwrap();
        drop(second);
        assert_eq!(platform.live_regions(), 0);
    }
}
