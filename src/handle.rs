//! Opaque integer handles for boxed objects lent to the runtime.

use static_assertions;
use std::mem;
use std::ptr::NonNull;

static_assertions::const_assert!(mem::size_of::<u64>() >= mem::size_of::<*mut u8>());

pub(crate) const NO_HANDLE: u64 = 0;

pub(crate) fn into_handle<T>(b: Box<T>) -> u64 {
    Box::into_raw(b) as usize as u64
}

/// Takes back ownership of a handle made by [`into_handle`].
///
/// # Safety
///
/// `handle` must come from `into_handle::<T>` and must not be used again.
pub(crate) unsafe fn from_handle<T>(handle: u64) -> Option<Box<T>> {
    match handle {
        NO_HANDLE => None,
        _ => Some(Box::from_raw(handle as usize as *mut T)),
    }
}

/// Borrowed view of a live handle.
pub(crate) struct HandleRef<T> {
    inner: NonNull<T>,
}

impl<T> HandleRef<T> {
    /// # Safety
    ///
    /// `handle` must be a live handle made by `into_handle::<T>`, and no other
    /// `HandleRef` to it may be alive at the same time.
    pub(crate) unsafe fn from_handle(handle: u64) -> Option<Self> {
        NonNull::new(handle as usize as *mut T).map(|inner| Self { inner })
    }
}

impl<T> std::ops::Deref for HandleRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { self.inner.as_ref() }
    }
}

impl<T> std::ops::DerefMut for HandleRef<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.inner.as_mut() }
    }
}
