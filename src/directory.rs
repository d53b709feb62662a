//! Defines the [`Directory`], the address-ordered list of every block on the heap.

use core::ptr::NonNull;

use tracing::debug;

use crate::header::{Block, Header, ALIGN_UNIT, HEADER_SIZE};

/// Leftover space a block must have before it is worth splitting.
pub const SPLIT_THRESHOLD: usize = HEADER_SIZE + ALIGN_UNIT;

/// A doubly-linked list of blocks whose link order is the address order.
///
/// For every pair of neighbours `a -> b` the list keeps `a.end() == b.addr()`,
/// so "next in the list" always means "physically adjacent".
/// The list only grows, blocks are recycled but never handed back.
#[derive(Debug)]
pub struct Directory {
    head: Option<Block>,
    tail: Option<Block>,
    /// Where the next fit search resumes from.
    cursor: Option<Block>,
    extent: usize,
}

impl Directory {
    /// Creates an empty Directory.
    #[inline]
    pub const fn new() -> Self {
        Directory {
            head: None,
            tail: None,
            cursor: None,
            extent: 0,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<Block> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<Block> {
        self.tail
    }

    #[inline]
    pub fn cursor(&self) -> Option<Block> {
        self.cursor
    }

    #[inline]
    pub fn set_cursor(&mut self, block: Block) {
        self.cursor = Some(block);
    }

    /// Returns the sum of the header and content sizes of every block.
    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn iter(&self) -> Iter {
        Iter { curr: self.head }
    }

    /// Creates an occupied block with content size `size` at `start` and links it after the tail.
    /// This operation has a time complexity of *O*(1).
    ///
    /// # Safety
    /// `start` must point to `HEADER_SIZE + size` fresh bytes which begin exactly where the
    /// current tail ends.
    pub unsafe fn append(&mut self, start: NonNull<u8>, size: usize) -> Block {
        debug_assert!(size > 0 && size % ALIGN_UNIT == 0);

        let block = Block::init(start, Header::new(size, false));
        match self.tail {
            Some(tail) => {
                debug_assert_eq!(tail.end(), block.addr(), "Heap growth should be contiguous.");
                tail.set_next(Some(block));
                block.set_prev(Some(tail));
            }
            None => self.head = Some(block),
        }
        self.tail = Some(block);
        self.extent += HEADER_SIZE + size;

        debug!(block = ?block.as_ptr(), size, "Appended block.");
        block
    }

    /// Shrinks `block` to `size` and turns the leftover space into a new free block
    /// placed right after it. Returns the new block, or `None` without touching anything
    /// if the leftover is smaller than [`SPLIT_THRESHOLD`].
    ///
    /// # Safety
    /// `block` must belong to this directory and `size` must be word aligned and no larger
    /// than the block content.
    pub unsafe fn split(&mut self, block: Block, size: usize) -> Option<Block> {
        let block_size = block.size();
        debug_assert!(size <= block_size);

        let leftover = block_size - size;
        if leftover < SPLIT_THRESHOLD {
            return None;
        }

        let start = NonNull::new_unchecked(block.payload().as_ptr().add(size));
        let remainder = Block::init(start, Header::new(leftover - HEADER_SIZE, true));
        let next = block.next();

        remainder.set_prev(Some(block));
        remainder.set_next(next);
        match next {
            Some(next) => next.set_prev(Some(remainder)),
            None => self.tail = Some(remainder),
        }
        block.set_size(size);
        block.set_next(Some(remainder));

        debug!(
            block = ?block.as_ptr(),
            remainder = ?remainder.as_ptr(),
            remainder_size = remainder.size(),
            "Split block."
        );
        Some(remainder)
    }

    /// Absorbs `b` into `a`, `b` must directly follow `a` and both must be free.
    /// This operation has a time complexity of *O*(1).
    ///
    /// # Safety
    /// Both blocks must belong to this directory.
    pub unsafe fn merge(&mut self, a: Block, b: Block) {
        debug_assert_eq!(a.next(), Some(b));
        debug_assert!(a.is_free() && b.is_free(), "Only free blocks can be merged.");

        let next = b.next();
        a.set_size(a.size() + HEADER_SIZE + b.size());
        a.set_next(next);
        match next {
            Some(next) => next.set_prev(Some(a)),
            None => self.tail = Some(a),
        }
        if self.cursor == Some(b) {
            self.cursor = Some(a);
        }

        debug!(block = ?a.as_ptr(), size = a.size(), "Merged blocks.");
    }
}

/// An address-ordered walk over the blocks of a [`Directory`].
pub struct Iter {
    curr: Option<Block>,
}

impl Iterator for Iter {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let curr = self.curr?;
        self.curr = curr.next();
        Some(curr)
    }
}
