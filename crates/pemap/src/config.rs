//! Loader configuration.

/// Options for [`crate::Loader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Flush the instruction cache over the image after patching.
    pub flush_instruction_cache: bool,
    /// Start the entry point as part of loading.
    pub execute_entry: bool,
    /// Map an image with no relocation directory away from its preferred
    /// base anyway. Absolute addresses inside it will be wrong.
    pub allow_relocation_skip: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            flush_instruction_cache: true,
            execute_entry: false,
            allow_relocation_skip: false,
        }
    }
}

impl LoaderConfig {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_flush_instruction_cache(mut self, enabled: bool) -> Self {
        self.flush_instruction_cache = enabled;
        self
    }

    /// Run the entry point once mapping finishes.
    #[must_use]
    pub const fn with_execute_entry(mut self, enabled: bool) -> Self {
        self.execute_entry = enabled;
        self
    }

    #[must_use]
    pub const fn with_allow_relocation_skip(mut self, enabled: bool) -> Self {
        self.allow_relocation_skip = enabled;
        self
    }
}
