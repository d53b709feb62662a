//! A singlethreaded memory allocator.
//!
// For a general view of the allocator's operational semantics see the [`crate`] level documentation.
//
// # Additional implementation notes
// ## Size alignment
// Every request is rounded up to a multiple of [`ALIGN_UNIT`] before anything else happens,
// so every block content size on the heap is word aligned, and since [`HEADER_SIZE`] is too,
// every block starts on a word boundary.
//
// ## Double frees
// Releasing a free block is detected before anything on the heap changes and comes back
// as a [`DoubleFree`] from the `try_` functions. `free` and `realloc` turn it into a panic,
// [`Malloc`](crate::Malloc) does so only after dropping its lock.
//
// ## Statistics
// `frees` only counts releases requested by callers, the release of the old block
// during a moving `realloc` is not counted while the merges it causes are.

use crate::directory::Directory;
use crate::fit::Fit;
use crate::growers::Grower;
use crate::header::{align_size, Block, ALIGN_UNIT, HEADER_SIZE};
use crate::stats::{Report, Stats};
use crate::util::raw_ptr;

use core::ptr::{copy_nonoverlapping, null_mut, NonNull};
use std::fmt::{self, Debug};

use tracing::{debug, error, instrument, Level};

/// What a single block on the heap looks like from the outside.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// The first content byte, this is what `malloc` returned for the block.
    pub payload: *mut u8,
    /// Content size, excluding the header.
    pub size: usize,
    pub free: bool,
}

/// Returned when a block is released while it is already free.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DoubleFree {
    pub payload: NonNull<u8>,
}

impl fmt::Display for DoubleFree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "double free of the block at {:?}", self.payload)
    }
}

/// A single threaded memory allocator.
pub struct RawMalloc<T: Grower> {
    directory: Directory,
    grower: T,
    fit: Fit,
    stats: Stats,
}

impl<T: Grower> Debug for RawMalloc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMalloc")
            .field("fit", &self.fit)
            .field("directory", &self.directory)
            .field("stats", &self.stats)
            .finish()
    }
}

// The allocator exclusively owns the blocks its directory points to.
unsafe impl<T: Grower + Send> Send for RawMalloc<T> {}

impl<T: Grower> RawMalloc<T> {
    /// Creates an allocator instance with the specified grower
    /// and the fit strategy selected at build time.
    ///
    /// # Safety
    /// Callers must make sure that the provided grower will be the only object
    /// managing it's underlying buffer for the lifetime of the returned allocator.
    pub const unsafe fn with_grower(grower: T) -> Self {
        RawMalloc::with_fit(grower, Fit::CONFIGURED)
    }

    /// Creates an allocator instance with the specified grower and fit strategy.
    ///
    /// # Safety
    /// See [`with_grower`](RawMalloc::with_grower).
    pub const unsafe fn with_fit(grower: T, fit: Fit) -> Self {
        RawMalloc {
            directory: Directory::new(),
            grower,
            fit,
            stats: Stats::new(),
        }
    }

    /// Returns the placement strategy this allocator was built with.
    #[inline]
    pub fn fit(&self) -> Fit {
        self.fit
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Takes a [`Report`] of the current heap state.
    pub fn report(&self) -> Report {
        let free_sizes = self
            .directory
            .iter()
            .filter(|block| block.is_free())
            .map(|block| block.size());
        Report::new(self.stats, free_sizes)
    }

    /// Walks every block on the heap in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.directory.iter().map(|block| {
            let header = block.header();
            BlockInfo {
                payload: block.payload().as_ptr(),
                size: header.size,
                free: header.free,
            }
        })
    }

    /// Allocates at least `size` bytes.
    /// Returns a null pointer if `size` is 0 or the heap can not grow any more.
    pub fn malloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return null_mut();
        }
        raw_ptr(self.__alloc(size).ok())
    }

    /// Releases the allocation at `ptr`, null pointers are ignored.
    ///
    /// # Panics
    /// Panics if the allocation was already released.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if let Err(err) = self.try_free(ptr) {
            panic!("{err}");
        }
    }

    /// Like [`free`](RawMalloc::free) but reports a double free instead of panicking.
    /// The heap is left untouched when it does.
    ///
    /// # Safety
    /// See [`free`](RawMalloc::free).
    pub unsafe fn try_free(&mut self, ptr: *mut u8) -> Result<(), DoubleFree> {
        let Some(payload) = NonNull::new(ptr) else {
            return Ok(());
        };
        self.release(Block::from_payload(payload))?;
        self.stats.frees += 1;
        Ok(())
    }

    /// Allocates zeroed memory for `count` elements of `size` bytes each.
    /// Returns a null pointer if the total size is 0, does not fit in a `usize`,
    /// or the heap can not grow any more.
    pub fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            error!(count, size, "Total size overflows.");
            return null_mut();
        };
        let ptr = self.malloc(total);
        if !ptr.is_null() {
            unsafe { ptr.write_bytes(0, total) };
        }
        ptr
    }

    /// Resizes the allocation at `ptr` to hold at least `size` bytes.
    ///
    /// A null `ptr` behaves like [`malloc`](RawMalloc::malloc) and a `size` of 0 like
    /// [`free`](RawMalloc::free) followed by returning a null pointer.
    /// On failure a null pointer is returned and the old allocation is left untouched.
    ///
    /// # Panics
    /// Panics if the allocation was already released.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by this allocator.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        match self.try_realloc(ptr, size) {
            Ok(ptr) => ptr,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`realloc`](RawMalloc::realloc) but reports a double free instead of panicking.
    ///
    /// # Safety
    /// See [`realloc`](RawMalloc::realloc).
    pub unsafe fn try_realloc(&mut self, ptr: *mut u8, size: usize) -> Result<*mut u8, DoubleFree> {
        let Some(payload) = NonNull::new(ptr) else {
            return Ok(self.malloc(size));
        };
        if size == 0 {
            self.try_free(ptr)?;
            return Ok(null_mut());
        }
        if Block::from_payload(payload).is_free() {
            return Err(DoubleFree { payload });
        }
        Ok(raw_ptr(self.__realloc(payload, size).ok()))
    }

    /// Returns how many bytes the allocation at `ptr` can hold,
    /// this is never less than what was asked for.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator and not yet released.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        let block = Block::from_payload(ptr);
        debug_assert!(!block.is_free(), "Objects should be preceded by occupied headers.");
        block.size()
    }

    #[instrument(level = "info", skip(self), ret(level = Level::INFO), err(Debug, level = Level::ERROR))]
    fn __alloc(&mut self, size: usize) -> Result<NonNull<u8>, ()> {
        let size = align_size(size).ok_or(())?;
        debug!(aligned_size = size, "Size aligned.");
        debug_assert!(size >= ALIGN_UNIT);

        let mut last = None;
        let block = match self.fit.find(&mut self.directory, size, &mut last) {
            Some(block) => {
                debug!(block = ?block.as_ptr(), block_size = block.size(), "Found free block to reuse.");
                if unsafe { self.directory.split(block, size) }.is_some() {
                    self.stats.splits += 1;
                    self.stats.blocks += 1;
                }
                block.set_free(false);
                self.stats.reuses += 1;
                block
            }
            None => {
                debug!(?last, "Couldn't find free block, requesting heap growth.");
                debug_assert!(self.fit == Fit::Next || last == self.directory.tail());
                self.grow_heap(size)?
            }
        };

        self.stats.mallocs += 1;
        self.stats.requested += size;
        self.record_extent();
        Ok(block.payload())
    }

    #[instrument(level = "info", skip(self), ret(level = Level::INFO), err(Debug, level = Level::ERROR))]
    unsafe fn __realloc(&mut self, payload: NonNull<u8>, size: usize) -> Result<NonNull<u8>, ()> {
        let block = Block::from_payload(payload);
        debug_assert!(!block.is_free(), "Objects should be preceded by occupied headers.");

        let capacity = block.size();
        if capacity >= size {
            debug!(capacity, "Block is already large enough.");
            return Ok(payload);
        }

        debug!("Moving object to a new block.");
        let new_payload = self.__alloc(size)?;
        copy_nonoverlapping(payload.as_ptr(), new_payload.as_ptr(), capacity.min(size));
        let released = self.release(block);
        debug_assert!(released.is_ok());
        Ok(new_payload)
    }

    /// Grows the heap by a block with content size `size`, the new block is occupied.
    /// Returns `Err(())` if the grower refused to grow.
    #[instrument(level = "debug", skip(self), err(Debug, level = Level::ERROR))]
    fn grow_heap(&mut self, size: usize) -> Result<Block, ()> {
        let Some(growth_amount) = size.checked_add(HEADER_SIZE) else {
            error!("Growth failure, block is too big.");
            return Err(());
        };

        let (start, grown) = unsafe { self.grower.grow(growth_amount) }
            .inspect_err(|_| error!(growth_amount, "Growth failure, no memory."))?;
        debug_assert_eq!(grown, growth_amount, "Growers should grow by the exact amount.");

        let block = unsafe { self.directory.append(start, size) };
        self.stats.grows += 1;
        self.stats.blocks += 1;
        self.record_extent();
        Ok(block)
    }

    /// Marks `block` as free and merges it with its free neighbours,
    /// first the one before it, then the one after it.
    /// Fails without touching the heap if `block` is already free.
    ///
    /// # Safety
    /// `block` must belong to this allocator's directory.
    #[instrument(level = "debug", skip(self), err(Display, level = Level::ERROR))]
    unsafe fn release(&mut self, block: Block) -> Result<(), DoubleFree> {
        if block.is_free() {
            return Err(DoubleFree {
                payload: block.payload(),
            });
        }
        block.set_free(true);

        let mut block = block;
        if let Some(prev) = block.prev().filter(|prev| prev.is_free()) {
            debug!(?prev, "Coalescing with preceding block.");
            self.directory.merge(prev, block);
            self.stats.coalesces += 1;
            self.stats.blocks -= 1;
            block = prev;
        }
        if let Some(next) = block.next().filter(|next| next.is_free()) {
            debug!(?next, "Coalescing with successive block.");
            self.directory.merge(block, next);
            self.stats.coalesces += 1;
            self.stats.blocks -= 1;
        }
        Ok(())
    }

    #[inline]
    fn record_extent(&mut self) {
        self.stats.max_heap = self.stats.max_heap.max(self.directory.extent());
    }
}

#[cfg(test)]
mod tests;
