use pemap_layout::{LayoutError, PointerWidth, RelocationKind, Rva};
use pemap_sys::PlatformError;
use thiserror::Error;

/// Loader errors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported relocation type {kind:?} at rva {rva:#x}")]
    UnsupportedRelocation { kind: RelocationKind, rva: Rva },
    #[error("image is {actual:#x} bytes, headers need {required:#x}")]
    ImageTooSmall { required: usize, actual: usize },
    #[error("image has no entry point")]
    NoEntryPoint,
    #[error("image must be relocated but has no relocation directory")]
    RelocationsStripped,
    #[error("{0:?} image cannot run on this host")]
    UnsupportedWidth(PointerWidth),
    #[error("malformed export forwarder '{0}'")]
    MalformedForwarder(String),
}

impl LoadError {
    /// Whether a dependency library or symbol could not be found.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        match self {
            Self::Platform(e) => e.is_resolution_failure(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
