//! The capability interface.
//!
//! Every native interaction the loader performs goes through [`Platform`]:
//! raw memory writes, library loads and thread starts.

use std::fmt;

use pemap_layout::Address;

use crate::{PlatformError, Result};

/// Largest executable allocation accepted (1 GiB).
pub const MAX_ALLOCATION: usize = 1 << 30;

/// Reject zero and absurd sizes before asking the OS.
pub const fn check_allocation_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_ALLOCATION {
        return Err(PlatformError::InvalidSize(size));
    }
    Ok(())
}

/// Symbol to resolve in a library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolRef<'a> {
    /// Exported name, without terminator.
    Name(&'a [u8]),
    Ordinal(u16),
}

impl fmt::Display for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", String::from_utf8_lossy(name)),
            Self::Ordinal(ordinal) => write!(f, "#{ordinal}"),
        }
    }
}

/// Executable memory owned by the caller.
pub trait MemoryRegion {
    /// First byte of the region.
    fn base(&self) -> Address;

    /// Size in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `[address, address + len)` lies inside the region.
    fn contains(&self, address: Address, len: usize) -> bool {
        let start = self.base().get();
        address.get() >= start
            && address
                .get()
                .checked_add(len)
                .is_some_and(|end| end <= start + self.len())
    }
}

/// Host operating-system capabilities needed to map and run an image.
///
/// Handles are owned values: dropping a `Region` or `Thread` releases it,
/// and the explicit `release_*` operations do the same while reporting
/// failures.
pub trait Platform {
    type Region: MemoryRegion;
    type Library;
    type Thread;

    /// Allocate read-write-execute memory.
    ///
    /// # Errors
    ///
    /// [`PlatformError::InvalidSize`] for a zero or absurd size,
    /// [`PlatformError::Allocation`] when the OS refuses.
    fn allocate_executable(&self, size: usize) -> Result<Self::Region>;

    /// Copy `source` to `destination`, front to back.
    ///
    /// # Safety
    ///
    /// `destination..destination + source.len()` must be writable and must
    /// not overlap `source`.
    unsafe fn copy_memory(&self, source: &[u8], destination: Address);

    /// Add `value` to the u16 stored at `address`, wrapping.
    ///
    /// # Safety
    ///
    /// `address` must point to two writable bytes. The width must match the
    /// relocation being applied; a mismatch corrupts neighbouring bytes.
    unsafe fn increment_u16(&self, address: Address, value: u16);

    /// Add `value` to the u32 stored at `address`, wrapping.
    ///
    /// # Safety
    ///
    /// `address` must point to four writable bytes.
    unsafe fn increment_u32(&self, address: Address, value: u32);

    /// Add `value` to the u64 stored at `address`, wrapping.
    ///
    /// # Safety
    ///
    /// `address` must point to eight writable bytes.
    unsafe fn increment_u64(&self, address: Address, value: u64);

    /// Bytes from `address` up to, not including, the next NUL.
    ///
    /// # Safety
    ///
    /// There is no length bound. The caller must only point this at memory
    /// known to hold a terminated string, such as import or export names
    /// inside an image it has validated; anything else reads past the end.
    unsafe fn read_c_string(&self, address: Address) -> Vec<u8>;

    /// Load a dynamic library by name.
    ///
    /// # Errors
    ///
    /// [`PlatformError::LibraryOpen`] with the OS cause.
    fn open_library(&self, name: &str) -> Result<Self::Library>;

    /// Address of `symbol` in `library`.
    ///
    /// # Errors
    ///
    /// [`PlatformError::SymbolResolve`] with the OS cause, or
    /// [`PlatformError::OrdinalUnsupported`] when the host has no ordinals.
    fn resolve_symbol(&self, library: &Self::Library, symbol: SymbolRef<'_>) -> Result<Address>;

    /// Invalidate instruction caches for freshly written code.
    ///
    /// # Errors
    ///
    /// [`PlatformError::FlushInstructionCache`] with the OS cause.
    fn flush_instruction_cache(&self, address: Address, len: usize) -> Result<()>;

    /// Start a native thread at `entry` with no arguments.
    ///
    /// # Safety
    ///
    /// `entry` must be the address of executable code taking no arguments,
    /// and the memory it touches must stay mapped while the thread runs.
    ///
    /// # Errors
    ///
    /// [`PlatformError::ThreadCreate`] with the OS cause.
    unsafe fn create_thread(&self, entry: Address) -> Result<Self::Thread>;

    /// Block until `thread` exits. There is no timeout.
    ///
    /// # Errors
    ///
    /// [`PlatformError::ThreadWait`] with the OS cause.
    fn wait_for_completion(&self, thread: &Self::Thread) -> Result<()>;

    /// Close the thread handle.
    ///
    /// # Errors
    ///
    /// [`PlatformError::HandleRelease`] with the OS cause.
    fn release_handle(&self, thread: Self::Thread) -> Result<()>;

    /// Return executable memory to the OS.
    ///
    /// # Errors
    ///
    /// [`PlatformError::MemoryRelease`] with the OS cause.
    fn release_memory(&self, region: Self::Region) -> Result<()>;
}
