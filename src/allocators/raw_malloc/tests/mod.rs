use crate::growers::ArenaGrower;

use self::format::init_logging;

use super::*;


const ALL_FITS: [Fit; 4] = [Fit::First, Fit::Best, Fit::Worst, Fit::Next];

fn allocator(buf: &mut [u8], fit: Fit) -> RawMalloc<ArenaGrower<'_>> {
    init_logging();
    unsafe { RawMalloc::with_fit(ArenaGrower::new(buf), fit) }
}

/// Checks the directory layout and the counters that can be derived from it.
fn check_heap<T: Grower>(allocator: &RawMalloc<T>) {
    let blocks: Vec<BlockInfo> = allocator.blocks().collect();
    let stats = allocator.stats();

    for b in &blocks {
        assert!(b.size > 0);
        assert_eq!(b.size % ALIGN_UNIT, 0);
    }
    for w in blocks.windows(2) {
        assert_eq!(
            w[0].payload as usize + w[0].size + HEADER_SIZE,
            w[1].payload as usize,
            "Blocks should be laid out back to back."
        );
        assert!(!(w[0].free && w[1].free), "Free neighbours should be merged.");
    }

    let extent: usize = blocks.iter().map(|b| HEADER_SIZE + b.size).sum();
    assert_eq!(stats.blocks, blocks.len());
    assert_eq!(stats.max_heap, extent);
}

fn free_blocks<T: Grower>(allocator: &RawMalloc<T>) -> Vec<BlockInfo> {
    allocator.blocks().filter(|b| b.free).collect()
}

#[test]
fn test_zero_size() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    assert!(allocator.malloc(0).is_null());
    assert_eq!(allocator.blocks().count(), 0);
    assert_eq!(allocator.stats(), Stats::default());
}

#[test]
fn test_capacity() {
    let mut buf = vec![0_u8; 64 * 1024];
    for fit in ALL_FITS {
        let mut allocator = allocator(&mut buf, fit);
        for size in 1..150 {
            let p = allocator.malloc(size);
            assert!(!p.is_null());
            unsafe {
                let capacity = allocator.usable_size(NonNull::new(p).unwrap());
                assert!(capacity >= size);
                assert_eq!(capacity % ALIGN_UNIT, 0);
                p.write_bytes(0xAB, capacity);
            }
        }
        check_heap(&allocator);
        assert_eq!(allocator.stats().grows, 149);
        assert_eq!(allocator.stats().mallocs, 149);
    }
}

#[test]
fn test_requested_is_aligned() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    allocator.malloc(1);
    allocator.malloc(6);
    allocator.malloc(12);
    assert_eq!(allocator.stats().requested, 4 + 8 + 12);
}

#[test]
fn test_out_of_memory() {
    const BUF_SIZE: usize = 8 * HEADER_SIZE;
    let mut buf = [0_u8; BUF_SIZE];
    let mut allocator = allocator(&mut buf, Fit::First);

    assert!(allocator.malloc(BUF_SIZE).is_null());
    assert_eq!(allocator.stats().grows, 0);
    assert_eq!(allocator.stats().mallocs, 0);

    let p = allocator.malloc(BUF_SIZE - HEADER_SIZE);
    assert!(!p.is_null());
    assert!(allocator.malloc(1).is_null());
    assert!(allocator.malloc(usize::MAX).is_null());
    assert_eq!(allocator.stats().grows, 1);

    unsafe { allocator.free(p) };
    assert_eq!(allocator.malloc(1), p, "Freed memory should be usable again.");
    check_heap(&allocator);
}

#[test]
fn test_reuse() {
    let mut buf = vec![0_u8; 4096];
    for fit in ALL_FITS {
        let mut allocator = allocator(&mut buf, fit);

        let p1 = allocator.malloc(100);
        let _guard = allocator.malloc(8);
        unsafe { allocator.free(p1) };

        let before = allocator.stats();
        let p2 = allocator.malloc(100);
        let after = allocator.stats();
        assert_eq!(p1, p2);
        assert_eq!(after.reuses, before.reuses + 1);
        assert_eq!(after.grows, before.grows);

        unsafe { allocator.free(p2) };
        let p3 = allocator.malloc(60);
        assert_eq!(p1, p3, "A smaller request should reuse the block too.");
        assert_eq!(allocator.stats().reuses, 2);
        assert_eq!(allocator.stats().grows, 2);
        check_heap(&allocator);
    }
}

#[test]
fn test_coalesce_in_any_order() {
    const SIZES: [usize; 3] = [40, 100, 64];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let mut buf = vec![0_u8; 4096];
        let mut allocator = allocator(&mut buf, Fit::First);

        let _front = allocator.malloc(16);
        let ptrs: Vec<*mut u8> = SIZES.iter().map(|&size| allocator.malloc(size)).collect();
        let _back = allocator.malloc(16);
        let before = allocator.stats();

        for i in order {
            unsafe { allocator.free(ptrs[i]) };
            check_heap(&allocator);
        }

        let free = free_blocks(&allocator);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].payload, ptrs[0]);
        assert_eq!(free[0].size, SIZES.iter().sum::<usize>() + 2 * HEADER_SIZE);

        let after = allocator.stats();
        assert_eq!(after.blocks, before.blocks - 2);
        assert_eq!(after.coalesces, 2);
        assert_eq!(after.frees, 3);
    }
}

#[test]
fn test_coalesce_on_both_sides_at_once() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::First);

    let p1 = allocator.malloc(32);
    let p2 = allocator.malloc(32);
    let p3 = allocator.malloc(32);
    unsafe {
        allocator.free(p1);
        allocator.free(p3);
        assert_eq!(allocator.stats().coalesces, 0);

        allocator.free(p2);
    }
    assert_eq!(allocator.stats().coalesces, 2);
    assert_eq!(allocator.stats().blocks, 1);
    assert_eq!(free_blocks(&allocator)[0].size, 3 * 32 + 2 * HEADER_SIZE);
}

#[test]
fn test_split() {
    const S: usize = 64;
    let mut buf = vec![0_u8; 4096];

    for k in [0, ALIGN_UNIT, 40] {
        let mut allocator = allocator(&mut buf, Fit::First);

        let big = allocator.malloc(S + HEADER_SIZE + ALIGN_UNIT + k);
        let _guard = allocator.malloc(4);
        unsafe { allocator.free(big) };

        let p = allocator.malloc(S);
        assert_eq!(p, big);
        assert_eq!(allocator.stats().splits, 1);

        let blocks: Vec<BlockInfo> = allocator.blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].size, S);
        assert!(!blocks[0].free);
        assert_eq!(blocks[1].size, ALIGN_UNIT + k);
        assert!(blocks[1].free);
        check_heap(&allocator);
    }
}

#[test]
fn test_no_split_below_threshold() {
    const S: usize = 64;
    let mut buf = vec![0_u8; 4096];

    for leftover in (0..HEADER_SIZE + ALIGN_UNIT).step_by(ALIGN_UNIT) {
        let mut allocator = allocator(&mut buf, Fit::First);

        let big = allocator.malloc(S + leftover);
        let _guard = allocator.malloc(4);
        unsafe { allocator.free(big) };

        let p = allocator.malloc(S);
        assert_eq!(p, big);
        assert_eq!(allocator.stats().splits, 0);
        assert_eq!(unsafe { allocator.usable_size(NonNull::new(p).unwrap()) }, S + leftover);
        check_heap(&allocator);
    }
}

#[test]
fn test_calloc() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::First);

    let p = allocator.malloc(400);
    unsafe {
        p.write_bytes(0xFF, 400);
        allocator.free(p);
    }

    let q = allocator.calloc(25, 16);
    assert_eq!(q, p, "The dirty block should be reused.");
    assert!((0..400).all(|i| unsafe { *q.add(i) } == 0));

    assert!(allocator.calloc(0, 16).is_null());
    assert!(allocator.calloc(16, 0).is_null());
    assert!(allocator.calloc(usize::MAX / 2, 3).is_null());
    assert_eq!(allocator.stats().mallocs, 2);
}

#[test]
fn test_realloc() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::First);

    unsafe {
        let p = allocator.realloc(null_mut(), 20);
        assert!(!p.is_null());
        for i in 0..20 {
            *p.add(i) = i as u8;
        }

        // Shrinking or growing within capacity keeps the block.
        assert_eq!(allocator.realloc(p, 8), p);
        assert_eq!(allocator.realloc(p, 20), p);

        let _guard = allocator.malloc(4);
        let q = allocator.realloc(p, 200);
        assert_ne!(q, p);
        assert!((0..20).all(|i| *q.add(i) == i as u8));
        assert_eq!(free_blocks(&allocator)[0].payload, p);
        // The old block is released but not counted as a caller free.
        assert_eq!(allocator.stats().frees, 0);

        assert!(allocator.realloc(q, 0).is_null());
        assert_eq!(allocator.stats().frees, 1);
        check_heap(&allocator);
    }
}

#[test]
fn test_realloc_failure_keeps_block() {
    let mut buf = vec![0_u8; 4 * HEADER_SIZE + 64];
    let mut allocator = allocator(&mut buf, Fit::First);

    unsafe {
        let p = allocator.malloc(32);
        p.write_bytes(7, 32);

        assert!(allocator.realloc(p, 1024).is_null());
        assert_eq!(allocator.usable_size(NonNull::new(p).unwrap()), 32);
        assert!((0..32).all(|i| *p.add(i) == 7));
        assert_eq!(free_blocks(&allocator).len(), 0);
        allocator.free(p);
    }
}

#[test]
#[should_panic]
fn test_double_free() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    let p = allocator.malloc(16);
    unsafe {
        allocator.free(p);
        allocator.free(p);
    }
}

#[test]
fn test_double_free_leaves_heap_untouched() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    let p1 = allocator.malloc(16);
    let p2 = allocator.malloc(16);
    unsafe {
        allocator.free(p1);
        let before = allocator.stats();

        let err = DoubleFree {
            payload: NonNull::new(p1).unwrap(),
        };
        assert_eq!(allocator.try_free(p1), Err(err));
        assert_eq!(allocator.try_realloc(p1, 64), Err(err));
        assert_eq!(allocator.try_realloc(p1, 0), Err(err));
        assert_eq!(allocator.stats(), before);
        check_heap(&allocator);

        assert_eq!(allocator.try_free(p2), Ok(()));
        assert_eq!(allocator.try_free(null_mut()), Ok(()));
        assert_eq!(allocator.stats().blocks, 1);
    }
}

#[test]
#[should_panic]
fn test_realloc_after_free() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    let p = allocator.malloc(16);
    unsafe {
        allocator.free(p);
        allocator.realloc(p, 32);
    }
}

#[test]
fn test_free_null() {
    let mut buf = vec![0_u8; 1024];
    let mut allocator = allocator(&mut buf, Fit::First);

    unsafe { allocator.free(null_mut()) };
    assert_eq!(allocator.stats().frees, 0);
}

/// Runs the classic split scenario: four allocations, two frees, two allocations
/// that fit in the freed space. Returns the allocator's pointers in request order.
fn split_scenario<T: Grower>(allocator: &mut RawMalloc<T>) -> [*mut u8; 6] {
    let p1 = allocator.malloc(1000);
    let p2 = allocator.malloc(2000);
    let p3 = allocator.malloc(500);
    let p4 = allocator.malloc(1500);
    unsafe {
        allocator.free(p2);
        allocator.free(p4);
    }
    let p5 = allocator.malloc(1000);
    let p6 = allocator.malloc(500);
    [p1, p2, p3, p4, p5, p6]
}

#[test]
fn test_split_scenario() {
    let mut buf = vec![0_u8; 16 * 1024];

    for fit in ALL_FITS {
        let mut allocator = allocator(&mut buf, fit);
        let [p1, p2, p3, p4, p5, p6] = split_scenario(&mut allocator);

        let stats = allocator.stats();
        assert_eq!(stats.grows, 4, "{fit:?}");
        assert_eq!(stats.splits, 2, "{fit:?}");
        assert_eq!(stats.reuses, 2, "{fit:?}");
        assert_eq!(stats.requested, 1000 + 2000 + 500 + 1500 + 1000 + 500);
        assert_eq!(stats.max_heap, 5000 + 4 * HEADER_SIZE);

        let rest_of = |p: *mut u8| unsafe { p.add(1000 + HEADER_SIZE) };
        match fit {
            Fit::First | Fit::Next => {
                assert_eq!(p5, p2);
                assert_eq!(p6, rest_of(p2));
            }
            Fit::Best => {
                assert_eq!(p5, p4);
                assert_eq!(p6, p2);
            }
            Fit::Worst => {
                assert_eq!(p5, p2);
                assert_eq!(p6, p4);
            }
        }
        check_heap(&allocator);

        unsafe {
            for p in [p1, p3, p5, p6] {
                allocator.free(p);
            }
        }
        assert_eq!(allocator.stats().blocks, 1);
        assert_eq!(allocator.report().fragmentation(), 0.0);
        assert_eq!(allocator.report().total_free, 5000 + 3 * HEADER_SIZE);
    }
}

#[test]
fn test_next_fit_cursor_survives_merge() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::Next);

    let a = allocator.malloc(64);
    let b = allocator.malloc(64);
    let _c = allocator.malloc(64);
    let _d = allocator.malloc(64);

    unsafe {
        allocator.free(b);
        assert_eq!(allocator.malloc(64), b);
        allocator.free(a);
        // b gets absorbed by a while it is still the place to resume from.
        allocator.free(b);
    }

    assert_eq!(allocator.malloc(64), a);
    check_heap(&allocator);
}

#[test]
fn test_next_fit_resumes() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::Next);

    let ptrs: Vec<*mut u8> = (0..6).map(|_| allocator.malloc(32)).collect();
    unsafe {
        allocator.free(ptrs[1]);
        allocator.free(ptrs[4]);
    }

    assert_eq!(allocator.malloc(32), ptrs[1]);
    unsafe { allocator.free(ptrs[1]) };
    // First fit would go back to ptrs[1].
    assert_eq!(allocator.malloc(32), ptrs[4]);
    assert_eq!(allocator.malloc(32), ptrs[1]);
    assert_eq!(allocator.stats().grows, 6);
}

#[test]
fn test_report() {
    let mut buf = vec![0_u8; 4096];
    let mut allocator = allocator(&mut buf, Fit::First);

    let ptrs: Vec<*mut u8> = [300, 8, 100, 8].iter().map(|&s| allocator.malloc(s)).collect();
    unsafe {
        allocator.free(ptrs[0]);
        allocator.free(ptrs[2]);
    }

    let report = allocator.report();
    assert_eq!(report.total_free, 400);
    assert_eq!(report.largest_free, 300);
    assert!((report.fragmentation() - 0.25).abs() < 1e-9);
    assert_eq!(report.stats, allocator.stats());
}
