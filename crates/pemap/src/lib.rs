//! pemap - map and run PE images from memory
//!
//! Parses a PE file, copies it into executable memory from a
//! [`pemap_sys::Platform`], applies base relocations, binds imports and
//! optionally runs the entry point.
//!
//! # Example
//!
//! ```ignore
//! use pemap::{Loader, LoaderConfig};
//! use pemap_sys::NativePlatform;
//!
//! let platform = NativePlatform::new();
//! let module = Loader::new(&platform, LoaderConfig::default()).map(&bytes)?;
//! unsafe { module.execute()? };
//! module.release()?;
//! ```

mod config;
mod error;
mod imports;
mod inspect;
mod loader;
mod relocate;

pub use config::LoaderConfig;
pub use error::{LoadError, Result};
pub use imports::{BoundImport, BoundImports, ImportSymbol, bind_imports};
pub use inspect::{ExportEntry, ImageReport, LibraryImports, RelocationSummary, inspect};
pub use loader::{Loader, MappedModule};
pub use relocate::{RelocationStats, relocate};
