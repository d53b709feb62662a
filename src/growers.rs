//! Sources of raw heap memory.
//!
//! Allocators never ask for memory anywhere else than the end of what they already
//! have, so all they need is something that can extend a single region: a [`Grower`].

use crate::header::ALIGN_UNIT;
use crate::util::{checked_add, find_aligned};

use core::marker::PhantomData;
use core::ptr::NonNull;

use libc::{brk, sbrk};
use tracing::{debug, error};

/// A contiguous region of memory that can be extended at its end.
///
/// # Safety
/// * the region must stay where it is for as long as the grower lives,
///   moving or copying the grower itself must not move it.
/// * every successful growth must start exactly where the previous one ended
///   and must be exactly as large as requested.
pub unsafe trait Grower {
    /// Extends the region by `size` bytes.
    /// On success returns where the new bytes start and how many there are.
    ///
    /// # Safety
    /// Implementors must make `grow(0)` a query of the current end that extends nothing.
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()>;
}

#[derive(Debug)]
/// Extends the data segment of the process by moving the program break.
/// The first growth starts at the break found by `sbrk(0)`, rounded up to [`ALIGN_UNIT`].
/// Growth is refused once anything else has moved the break.
pub struct BrkGrower {
    heap_end: Option<NonNull<u8>>,
}

impl BrkGrower {
    #[inline(always)]
    pub const fn new() -> Self {
        BrkGrower { heap_end: None }
    }

    /// Reads the current program break, this is where the heap starts.
    ///
    /// # Safety
    /// Nothing else may move the program break once the grower owns it.
    unsafe fn try_init(&mut self) -> Result<NonNull<u8>, ()> {
        debug_assert!(self.heap_end.is_none());
        let heap_end = unsafe { sbrk(0) };
        if heap_end as isize == -1 {
            return Err(());
        }
        let heap_end = find_aligned(heap_end.cast::<u8>(), ALIGN_UNIT).ok_or(())? as *mut u8;
        let heap_end = NonNull::new(heap_end).ok_or(())?;
        debug!(heap_start = ?heap_end.as_ptr(), "Initialized program break grower.");
        self.heap_end = Some(heap_end);
        Ok(heap_end)
    }
}

impl Default for BrkGrower {
    fn default() -> Self {
        BrkGrower::new()
    }
}

unsafe impl Grower for BrkGrower {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        let heap_end = match self.heap_end {
            Some(end) if unsafe { sbrk(0) }.cast::<u8>() != end.as_ptr() => {
                error!(heap_end = ?end.as_ptr(), "Program break was moved by someone else.");
                return Err(());
            }
            Some(end) => end,
            None => unsafe { self.try_init()? },
        };
        if size == 0 {
            return Ok((heap_end, 0));
        }
        let new_heap_end: *mut u8 = checked_add(heap_end.as_ptr(), size).ok_or(())? as _;
        if unsafe { brk(new_heap_end.cast()) == -1 } {
            return Err(());
        }
        self.heap_end = unsafe { Some(NonNull::new_unchecked(new_heap_end)) };
        Ok((heap_end, size))
    }
}

// The grower is the only one moving the program break it tracks.
unsafe impl Send for BrkGrower {}

/// A grower that hands out a caller-provided buffer piece by piece
/// and refuses to grow past its end.
#[derive(Debug)]
pub struct ArenaGrower<'a> {
    heap_end: NonNull<u8>,
    arena_end: NonNull<u8>,
    _buf: PhantomData<&'a mut [u8]>,
}

impl<'a> ArenaGrower<'a> {
    /// Creates a grower that operates on `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let range = buf.as_mut_ptr_range();
        // Slice pointers are never null, even for empty slices.
        unsafe {
            ArenaGrower {
                heap_end: NonNull::new_unchecked(range.start),
                arena_end: NonNull::new_unchecked(range.end),
                _buf: PhantomData,
            }
        }
    }

    /// Returns how many bytes can still be handed out.
    pub fn remaining(&self) -> usize {
        self.arena_end.as_ptr() as usize - self.heap_end.as_ptr() as usize
    }
}

unsafe impl Grower for ArenaGrower<'_> {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        let heap_end = self.heap_end;
        if size == 0 {
            return Ok((heap_end, 0));
        }
        if size > self.remaining() {
            return Err(());
        }
        self.heap_end = NonNull::new_unchecked(heap_end.as_ptr().add(size));
        Ok((heap_end, size))
    }
}

// The arena exclusively borrows its buffer.
unsafe impl Send for ArenaGrower<'_> {}

unsafe impl<T: Grower + ?Sized> Grower for &mut T {
    unsafe fn grow(&mut self, size: usize) -> Result<(NonNull<u8>, usize), ()> {
        (*self).grow(size)
    }
}
