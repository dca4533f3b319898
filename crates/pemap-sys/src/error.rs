//! Capability error types.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Boxed underlying cause (an OS error or a `libloading` error).
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Capability failure carrying the underlying OS status.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid allocation size: {0:#x}")]
    InvalidSize(usize),

    #[error("executable allocation of {size:#x} bytes failed: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to open library '{name}': {source}")]
    LibraryOpen {
        name: String,
        #[source]
        source: Cause,
    },

    #[error("failed to resolve symbol '{symbol}': {source}")]
    SymbolResolve {
        symbol: String,
        #[source]
        source: Cause,
    },

    #[error("ordinal imports are not supported on this host (ordinal {0})")]
    OrdinalUnsupported(u16),

    #[error("instruction cache flush failed: {0}")]
    FlushInstructionCache(#[source] io::Error),

    #[error("thread creation failed: {0}")]
    ThreadCreate(#[source] io::Error),

    #[error("waiting for thread failed: {0}")]
    ThreadWait(#[source] io::Error),

    #[error("closing thread handle failed: {0}")]
    HandleRelease(#[source] io::Error),

    #[error("releasing memory failed: {0}")]
    MemoryRelease(#[source] io::Error),
}

impl PlatformError {
    /// Library-open or symbol-resolve failure.
    ///
    /// These may be recoverable by trying another dependency path, unlike
    /// allocation or thread failures.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::LibraryOpen { .. } | Self::SymbolResolve { .. } | Self::OrdinalUnsupported(_)
        )
    }

    /// Raw OS error code from the first `io::Error` in the cause chain.
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        let mut cause: Option<&(dyn StdError + 'static)> = StdError::source(self);
        while let Some(err) = cause {
            if let Some(code) = err.downcast_ref::<io::Error>().and_then(io::Error::raw_os_error) {
                return Some(code);
            }
            cause = err.source();
        }
        None
    }

    /// Whether the cause chain reports a missing file or symbol.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        let mut cause: Option<&(dyn StdError + 'static)> = StdError::source(self);
        while let Some(err) = cause {
            if err
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
            {
                return true;
            }
            cause = err.source();
        }
        false
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
