//! A `brk`-backed free-list memory allocator with pluggable placement strategies.
//!
//! The crate implements the classic `malloc`, `free`, `calloc` and `realloc` quartet on top
//! of a single contiguous region that only ever grows. It is meant to be easy to follow,
//! so the heap is kept as one address-ordered list of blocks and every operation is a walk,
//! a split or a merge on that list.
//!
//! # Usage
//! ```
//! use fitmalloc::growers::ArenaGrower;
//! use fitmalloc::{Fit, RawMalloc};
//!
//! let mut buf = vec![0_u8; 4096];
//! let mut allocator = unsafe { RawMalloc::with_fit(ArenaGrower::new(&mut buf), Fit::Best) };
//!
//! let p = allocator.calloc(4, 25);
//! assert!(!p.is_null());
//! unsafe { allocator.free(p) };
//!
//! println!("{}", allocator.report());
//! ```
//!
//! To replace the allocator of a C program, build the `fitmalloc-preload` crate of this
//! workspace and `LD_PRELOAD` it, it prints the heap report when the process exits.
//!
//! # Allocators
//! Two allocators are exported by this crate - [`RawMalloc`] and [`Malloc`].
//! [`RawMalloc`] is single-threaded and works through `&mut self`,
//! [`Malloc`] is just a `Mutex` wrapper over it so that it can be shared.
//!
//! # Mode of operation
//! - When an allocation is requested its size is rounded up to [`ALIGN_UNIT`] and the
//!   [directory](#directory) is searched for a free block that is large enough.
//!   Which block wins is decided by the allocator's [`Fit`].
//! - If a block is found and it is large enough to hold the allocation plus another
//!   header and at least [`ALIGN_UNIT`] bytes, it is split in two and the tail end is kept
//!   free. Otherwise the whole block is handed out.
//! - If no block is found a request is dispatched to the allocator's underlying
//!   [grower](#growers) for exactly one header plus the requested size.
//!   That request is made once, if it fails the allocation fails.
//! - On deallocation the block is marked free and merged with the block right before it
//!   and then with the block right after it, whenever those are free too.
//!
//! Below is a list of the abstractions used by the allocators for operating on the heap:
//!
//! ## Blocks
//! The heap is divided into blocks laid out back to back. Each block has a header
//! followed by its content. The header holds the content size, whether the block is
//! free, and links to the blocks right before and after it in memory.
//!
//! ## Directory
//! The headers form a doubly-linked list, the directory, whose order is the address
//! order of the blocks. This means the list neighbours of a block are also its physical
//! neighbours, which is what makes splitting and merging cheap. Blocks are never given
//! back to the grower so the directory never shrinks.
//!
//! ## Fit strategies
//! - [`Fit::First`] takes the first large enough block from the start of the heap.
//! - [`Fit::Best`] takes the smallest large enough block.
//! - [`Fit::Worst`] takes the largest one.
//! - [`Fit::Next`] behaves like first fit but resumes where the previous search stopped.
//!
//! The strategy can not change during the lifetime of an allocator.
//! [`RawMalloc::with_grower`] uses the one selected at build time through the
//! `best-fit`, `worst-fit` or `next-fit` features, first fit being the default.
//!
//! ## Growers
//! A grower is the allocator's internal storage buffer.
//! The allocators are generic over their growers, anything that implements [`Grower`]
//! (aka anything that acts a contiguous buffer which can grow) can be used.
//! [`BrkGrower`] moves the program break, [`ArenaGrower`] hands out a fixed buffer.
//!
//! ## Statistics
//! Allocators count what they do in a [`Stats`] struct and can produce a [`Report`]
//! which adds the amount of free memory and a fragmentation ratio.
//!
//! [`Grower`]: growers::Grower
//! [`BrkGrower`]: growers::BrkGrower
//! [`ArenaGrower`]: growers::ArenaGrower

pub use crate::allocators::{BlockInfo, DoubleFree, Malloc, RawMalloc};
pub use crate::fit::Fit;
pub use crate::header::{ALIGN_UNIT, HEADER_SIZE};
pub use crate::stats::{Report, Stats};

pub mod allocators;
mod directory;
mod fit;
pub mod growers;
mod header;
mod stats;
mod util;
