//! Host capabilities for mapping and running a PE image from memory.
//!
//! [`Platform`] is the only place native calls happen. [`NativePlatform`]
//! talks to the real OS; [`FakePlatform`] keeps an address space in plain
//! vectors so the loader can be tested anywhere.

mod error;
pub mod fake;
mod native;
mod platform;

pub use error::{Cause, PlatformError, Result};
pub use fake::{FakeLibrary, FakePlatform};
pub use native::{NativeLibrary, NativePlatform, NativeRegion, NativeThread};
pub use platform::{MAX_ALLOCATION, MemoryRegion, Platform, SymbolRef, check_allocation_size};
