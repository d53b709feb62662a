//! Defines the [`Header`] struct, the [`Block`] handle and associated constants and functions.

use core::mem::size_of;
use core::ptr::{addr_of, addr_of_mut, null_mut, NonNull};

use static_assertions::const_assert;

/// The word boundary every block content size is rounded to.
pub const ALIGN_UNIT: usize = 4;

pub const HEADER_SIZE: usize = size_of::<Header>();

// Blocks are laid back to back, so headers must keep the content word-aligned.
const_assert!(HEADER_SIZE % ALIGN_UNIT == 0);
const_assert!(ALIGN_UNIT.is_power_of_two());

/// Metadata placed in front of every block on the heap.
///
/// Blocks only guarantee [`ALIGN_UNIT`] alignment, which is smaller than the natural
/// alignment of this struct, so it is never accessed through references.
/// All reads and writes go through [`Block`] which uses unaligned accesses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Header {
    /// Size of the block content, excluding the header itself.
    pub size: usize,
    /// The block that follows this one in memory.
    pub next: *mut Header,
    /// The block that precedes this one in memory.
    pub prev: *mut Header,
    pub free: bool,
}

impl Header {
    #[inline]
    pub const fn new(size: usize, free: bool) -> Header {
        Header {
            size,
            next: null_mut(),
            prev: null_mut(),
            free,
        }
    }
}

/// Rounds `size` up to the next multiple of [`ALIGN_UNIT`]
/// or returns `None` if the result would not fit in a `usize`.
#[inline]
pub fn align_size(size: usize) -> Option<usize> {
    Some(size.checked_add(ALIGN_UNIT - 1)? & !(ALIGN_UNIT - 1))
}

/// A handle to a block header living somewhere on the managed heap.
///
/// This is the only place in the crate where header memory is touched.
/// Constructing a handle is unsafe, using one is not.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Block(NonNull<Header>);

impl Block {
    /// Writes `header` at `start` and returns a handle to it.
    ///
    /// # Safety
    /// `start` must be valid for writes of [`HEADER_SIZE`] bytes and must not overlap any
    /// live block.
    #[inline]
    pub unsafe fn init(start: NonNull<u8>, header: Header) -> Block {
        let ptr = start.cast::<Header>();
        ptr.as_ptr().write_unaligned(header);
        Block(ptr)
    }

    /// Returns the block whose content starts at `payload`.
    ///
    /// # Safety
    /// `payload` must be a pointer previously handed out for a block of the same heap.
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> Block {
        Block(NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE)).cast())
    }

    #[inline]
    fn from_link(link: *mut Header) -> Option<Block> {
        NonNull::new(link).map(Block)
    }

    #[inline(always)]
    pub fn as_ptr(self) -> *mut Header {
        self.0.as_ptr()
    }

    #[inline(always)]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Returns a pointer to the first content byte.
    #[inline]
    pub fn payload(self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.0.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
    }

    /// Returns the address right past the block content,
    /// which is where the next block in memory starts.
    #[inline]
    pub fn end(self) -> usize {
        self.addr() + HEADER_SIZE + self.size()
    }

    #[inline]
    pub fn header(self) -> Header {
        unsafe { self.0.as_ptr().read_unaligned() }
    }

    #[inline]
    pub fn size(self) -> usize {
        unsafe { addr_of!((*self.0.as_ptr()).size).read_unaligned() }
    }

    #[inline]
    pub fn set_size(self, size: usize) {
        debug_assert_eq!(size % ALIGN_UNIT, 0, "size should be word aligned.");
        unsafe { addr_of_mut!((*self.0.as_ptr()).size).write_unaligned(size) }
    }

    #[inline]
    pub fn is_free(self) -> bool {
        unsafe { addr_of!((*self.0.as_ptr()).free).read_unaligned() }
    }

    #[inline]
    pub fn set_free(self, free: bool) {
        unsafe { addr_of_mut!((*self.0.as_ptr()).free).write_unaligned(free) }
    }

    #[inline]
    pub fn next(self) -> Option<Block> {
        Block::from_link(unsafe { addr_of!((*self.0.as_ptr()).next).read_unaligned() })
    }

    #[inline]
    pub fn set_next(self, next: Option<Block>) {
        let link = next.map_or(null_mut(), Block::as_ptr);
        unsafe { addr_of_mut!((*self.0.as_ptr()).next).write_unaligned(link) }
    }

    #[inline]
    pub fn prev(self) -> Option<Block> {
        Block::from_link(unsafe { addr_of!((*self.0.as_ptr()).prev).read_unaligned() })
    }

    #[inline]
    pub fn set_prev(self, prev: Option<Block>) {
        let link = prev.map_or(null_mut(), Block::as_ptr);
        unsafe { addr_of_mut!((*self.0.as_ptr()).prev).write_unaligned(link) }
    }
}
