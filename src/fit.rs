//! Free block placement strategies.
//!
//! A strategy is fixed for the whole lifetime of an allocator. The one picked by
//! [`RawMalloc::with_grower`](crate::RawMalloc::with_grower) is chosen at build time
//! through the `best-fit`, `worst-fit` and `next-fit` cargo features, first fit being
//! the default. If more than one of them is enabled `next-fit` wins over `worst-fit`
//! which wins over `best-fit`.

use crate::directory::Directory;
use crate::header::Block;

/// Which free block gets picked to hold an allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fit {
    /// The first free block, from the lowest address, that is large enough.
    First,
    /// The smallest free block that is large enough.
    Best,
    /// The largest free block that is large enough.
    Worst,
    /// Like [`Fit::First`] but the scan resumes after the last block it returned
    /// and wraps around the end of the heap.
    Next,
}

impl Fit {
    /// The strategy selected by the enabled cargo features.
    pub const CONFIGURED: Fit = if cfg!(feature = "next-fit") {
        Fit::Next
    } else if cfg!(feature = "worst-fit") {
        Fit::Worst
    } else if cfg!(feature = "best-fit") {
        Fit::Best
    } else {
        Fit::First
    };

    /// Looks for a free block with content size of at least `size`.
    ///
    /// `last` is left pointing to the last block visited by the scan.
    /// For every strategy but [`Fit::Next`] a failed search leaves it at the tail.
    pub(crate) fn find(self, dir: &mut Directory, size: usize, last: &mut Option<Block>) -> Option<Block> {
        match self {
            Fit::First => first_fit(dir, size, last),
            Fit::Best => extreme_fit(dir, size, last, |candidate, chosen| candidate < chosen),
            Fit::Worst => extreme_fit(dir, size, last, |candidate, chosen| candidate > chosen),
            Fit::Next => next_fit(dir, size, last),
        }
    }
}

#[inline]
fn fits(block: Block, size: usize) -> bool {
    block.is_free() && block.size() >= size
}

fn first_fit(dir: &Directory, size: usize, last: &mut Option<Block>) -> Option<Block> {
    for block in dir.iter() {
        if fits(block, size) {
            return Some(block);
        }
        *last = Some(block);
    }
    None
}

/// Scans the whole directory and keeps the fitting block `better` prefers.
/// `better` must be strict so that ties go to the lowest address.
fn extreme_fit(
    dir: &Directory,
    size: usize,
    last: &mut Option<Block>,
    better: impl Fn(usize, usize) -> bool,
) -> Option<Block> {
    let mut chosen: Option<Block> = None;
    for block in dir.iter() {
        if fits(block, size) && chosen.map_or(true, |c| better(block.size(), c.size())) {
            chosen = Some(block);
        }
        *last = Some(block);
    }
    chosen
}

fn next_fit(dir: &mut Directory, size: usize, last: &mut Option<Block>) -> Option<Block> {
    let head = dir.head()?;
    let start = dir.cursor().and_then(Block::next).unwrap_or(head);

    let mut curr = start;
    loop {
        if fits(curr, size) {
            dir.set_cursor(curr);
            return Some(curr);
        }
        *last = Some(curr);
        curr = curr.next().unwrap_or(head);
        if curr == start {
            return None;
        }
    }
}
