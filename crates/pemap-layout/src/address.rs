//! Absolute addresses and image-relative offsets.

use std::fmt;
use std::ops::Add;

/// Relative virtual address: an offset from the start of the mapped image.
pub type Rva = u32;

/// Absolute address in the target address space.
///
/// Only the capability layer turns an `Address` into a pointer; everything
/// else treats it as an opaque integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Address(pub usize);

impl Address {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address of `rva` inside an image mapped at `self`.
    #[must_use]
    pub const fn offset(self, rva: Rva) -> Self {
        Self(self.0.wrapping_add(rva as usize))
    }

    #[must_use]
    pub const fn byte_add(self, bytes: usize) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    #[must_use]
    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[must_use]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl Add<Rva> for Address {
    type Output = Self;

    fn add(self, rva: Rva) -> Self {
        self.offset(rva)
    }
}

impl<T> From<*const T> for Address {
    fn from(ptr: *const T) -> Self {
        Self(ptr as usize)
    }
}

impl<T> From<*mut T> for Address {
    fn from(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
