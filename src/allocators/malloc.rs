//! A multithreaded memory allocator.

use crate::allocators::{BlockInfo, DoubleFree, RawMalloc};
use crate::fit::Fit;
use crate::growers::Grower;
use crate::stats::{Report, Stats};

use core::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A multithreaded memory allocator.
///
/// This allocator is just a `Mutex` wrapper over [`RawMalloc`] so that it can be shared,
/// for example as a `static`, every call holds the lock for its whole duration.
pub struct Malloc<T: Grower> {
    inner: Mutex<RawMalloc<T>>,
}

impl<T: Grower> Malloc<T> {
    /// # Safety
    /// Callers must make sure that the provided grower will be the only object
    /// managing it's underlying buffer for the lifetime of the returned allocator.
    pub const unsafe fn with_grower(grower: T) -> Self {
        Malloc {
            inner: Mutex::new(RawMalloc::with_grower(grower)),
        }
    }

    /// # Safety
    /// See [`with_grower`](Malloc::with_grower).
    pub const unsafe fn with_fit(grower: T, fit: Fit) -> Self {
        Malloc {
            inner: Mutex::new(RawMalloc::with_fit(grower, fit)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RawMalloc<T>> {
        // Double frees panic after the guard is dropped, nothing else panics halfway through
        // a heap update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`RawMalloc::malloc`].
    pub fn malloc(&self, size: usize) -> *mut u8 {
        self.lock().malloc(size)
    }

    /// See [`RawMalloc::free`].
    ///
    /// # Panics
    /// Panics if the allocation was already released, the lock is released first.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if let Err(err) = self.try_free(ptr) {
            panic!("{err}");
        }
    }

    /// See [`RawMalloc::try_free`].
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn try_free(&self, ptr: *mut u8) -> Result<(), DoubleFree> {
        self.lock().try_free(ptr)
    }

    /// See [`RawMalloc::calloc`].
    pub fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        self.lock().calloc(count, size)
    }

    /// See [`RawMalloc::realloc`].
    ///
    /// # Panics
    /// Panics if the allocation was already released, the lock is released first.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        match self.try_realloc(ptr, size) {
            Ok(ptr) => ptr,
            Err(err) => panic!("{err}"),
        }
    }

    /// See [`RawMalloc::try_realloc`].
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn try_realloc(&self, ptr: *mut u8, size: usize) -> Result<*mut u8, DoubleFree> {
        self.lock().try_realloc(ptr, size)
    }

    /// See [`RawMalloc::usable_size`].
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator and not yet released.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        self.lock().usable_size(ptr)
    }

    pub fn fit(&self) -> Fit {
        self.lock().fit()
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats()
    }

    pub fn report(&self) -> Report {
        self.lock().report()
    }

    /// Collects every block on the heap in address order, see [`RawMalloc::blocks`].
    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.lock().blocks().collect()
    }
}
