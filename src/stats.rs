//! Allocator lifecycle counters and the heap report built from them.

use core::fmt;

/// Counters describing what an allocator has been doing.
/// They are never consulted when placing allocations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Successful allocations, including the ones made on behalf of `calloc` and `realloc`.
    pub mallocs: usize,
    /// Blocks released by callers.
    pub frees: usize,
    /// Allocations served by a block that was already on the heap.
    pub reuses: usize,
    /// Times the heap was extended.
    pub grows: usize,
    pub splits: usize,
    pub coalesces: usize,
    /// Blocks currently on the heap, free or not.
    pub blocks: usize,
    /// Sum of all allocation sizes after word alignment.
    pub requested: usize,
    /// Largest heap extent seen, headers included.
    pub max_heap: usize,
}

impl Stats {
    pub const fn new() -> Self {
        Stats {
            mallocs: 0,
            frees: 0,
            reuses: 0,
            grows: 0,
            splits: 0,
            coalesces: 0,
            blocks: 0,
            requested: 0,
            max_heap: 0,
        }
    }
}

/// A snapshot of the [`Stats`] plus free space figures computed from the heap.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Report {
    pub stats: Stats,
    /// Content bytes held by free blocks.
    pub total_free: usize,
    pub largest_free: usize,
}

impl Report {
    /// Builds a report out of the content sizes of the free blocks.
    pub fn new(stats: Stats, free_sizes: impl IntoIterator<Item = usize>) -> Self {
        let (total_free, largest_free) = free_sizes
            .into_iter()
            .fold((0, 0), |(total, largest), size| (total + size, largest.max(size)));
        Report {
            stats,
            total_free,
            largest_free,
        }
    }

    /// Returns `1 - largest_free / total_free`, or `0` when nothing is free.
    ///
    /// A value of 0 means all free space is in a single block,
    /// values closer to 1 mean it is scattered over many small ones.
    pub fn fragmentation(&self) -> f64 {
        if self.total_free == 0 {
            return 0.0;
        }
        1.0 - self.largest_free as f64 / self.total_free as f64
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "heap management statistics")?;
        writeln!(f, "mallocs:\t{}", s.mallocs)?;
        writeln!(f, "frees:\t\t{}", s.frees)?;
        writeln!(f, "reuses:\t\t{}", s.reuses)?;
        writeln!(f, "grows:\t\t{}", s.grows)?;
        writeln!(f, "splits:\t\t{}", s.splits)?;
        writeln!(f, "coalesces:\t{}", s.coalesces)?;
        writeln!(f, "blocks:\t\t{}", s.blocks)?;
        writeln!(f, "requested:\t{}", s.requested)?;
        writeln!(f, "max heap:\t{}", s.max_heap)?;
        writeln!(f)?;
        writeln!(f, "free memory:\t{} bytes", self.total_free)?;
        writeln!(f, "largest free:\t{} bytes", self.largest_free)?;
        writeln!(f, "fragmentation:\t{:.2}%", self.fragmentation() * 100.0)
    }
}
