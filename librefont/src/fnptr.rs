//! Typed wrapper around raw function pointers.
//!
//! The hook machinery moves function addresses around as `*mut c_void` but
//! hands them back to callers as properly typed function pointers. `FnPtr`
//! is the single place where that transmute happens, guarded by a size
//! check so it can never be instantiated with a non-pointer-sized type.

use std::{
    ffi::c_void,
    marker::PhantomData,
    sync::atomic::{AtomicPtr, Ordering},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FnPtrError {
    #[error("function pointer is NULL")]
    Null,

    #[error("type is not pointer sized and cannot be a function pointer")]
    NotPointerSized,
}

pub type FnPtrResult<T> = std::result::Result<T, FnPtrError>;

/// Thread-safe holder for a function pointer of type `T`.
///
/// `T` must be a function pointer type, e.g. `extern "system" fn(..) -> ..`.
/// The pointee must stay valid for the lifetime of the `FnPtr`; for hook
/// targets and trampolines that is the process lifetime.
#[derive(Debug)]
pub struct FnPtr<T: Copy + 'static> {
    raw: AtomicPtr<c_void>,
    _marker: PhantomData<T>,
}

// Safety: the address itself is atomic; calling through it is the caller's
// unsafe contract, same as for any raw function pointer.
unsafe impl<T: Copy + 'static> Send for FnPtr<T> {}
unsafe impl<T: Copy + 'static> Sync for FnPtr<T> {}

impl<T: Copy + 'static> FnPtr<T> {
    fn check_layout() -> FnPtrResult<()> {
        if size_of::<T>() != size_of::<usize>() {
            return Err(FnPtrError::NotPointerSized);
        }
        Ok(())
    }

    /// Wraps a raw address.
    ///
    /// # Safety
    /// `raw` must point to a function matching the signature `T`.
    pub unsafe fn from_raw(raw: *mut c_void) -> FnPtrResult<Self> {
        Self::check_layout()?;

        if raw.is_null() {
            return Err(FnPtrError::Null);
        }

        Ok(Self {
            raw: AtomicPtr::new(raw),
            _marker: PhantomData,
        })
    }

    /// Wraps a function pointer value.
    ///
    /// # Safety
    /// `T` must actually be a function pointer type; the size check rejects
    /// everything else, but cannot tell a function pointer from e.g. `usize`.
    pub unsafe fn from_fn(function: T) -> FnPtrResult<Self> {
        Self::check_layout()?;

        // Safety: check_layout proved T is pointer sized.
        let addr = unsafe { std::mem::transmute_copy::<T, usize>(&function) };

        unsafe { Self::from_raw(addr as *mut c_void) }
    }

    /// Returns the stored address as a callable function pointer.
    ///
    /// # Safety
    /// The stored address must point to a live function with signature `T`.
    pub unsafe fn as_fn(&self) -> T {
        let addr = self.as_raw_ptr() as usize;

        // Safety: constructors guarantee the address is non-null and T is
        // pointer sized.
        unsafe { std::mem::transmute_copy::<usize, T>(&addr) }
    }

    /// Returns the stored address.
    pub fn as_raw_ptr(&self) -> *mut c_void {
        self.raw.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn forty_two() -> i32 {
        42
    }

    #[test]
    fn round_trips_a_function_pointer() {
        type Fn42 = extern "C" fn() -> i32;

        let ptr = unsafe { FnPtr::<Fn42>::from_fn(forty_two) }.unwrap();
        let back = unsafe { ptr.as_fn() };

        assert_eq!(back(), 42);
        assert_eq!(ptr.as_raw_ptr() as usize, forty_two as usize);
    }

    #[test]
    fn rejects_null() {
        type Fn42 = extern "C" fn() -> i32;

        let err = unsafe { FnPtr::<Fn42>::from_raw(std::ptr::null_mut()) };
        assert!(matches!(err, Err(FnPtrError::Null)));
    }

    #[test]
    fn rejects_non_pointer_sized_types() {
        let err = unsafe { FnPtr::<[usize; 2]>::from_raw(8 as *mut c_void) };
        assert!(matches!(err, Err(FnPtrError::NotPointerSized)));
    }
}
