//! The [`RawMalloc`] and [`Malloc`] allocators.

pub mod malloc;
pub mod raw_malloc;

pub use malloc::Malloc;
pub use raw_malloc::{BlockInfo, DoubleFree, RawMalloc};
