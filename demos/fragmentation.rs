//! Performance and heap fragmentation.
//!
//! Allocates a series of blocks of varying sizes, frees every third one and then
//! makes requests that fit into several of the holes, so that each strategy picks
//! differently. A last large request shows whether the heap had to grow for it.
//!
//! Run with `cargo run --example fragmentation -- [first|best|worst|next]`,
//! every strategy is run if none is given.

use std::env;
use std::process::ExitCode;
use std::ptr::null_mut;
use std::time::Instant;

use fitmalloc::growers::ArenaGrower;
use fitmalloc::{Fit, RawMalloc};
use tracing_subscriber::EnvFilter;

const NUM_ALLOCS: usize = 20;
const ALLOC_SIZES: [usize; 7] = [128, 256, 512, 1024, 2048, 4096, 8192];
const TEST_SIZES: [usize; 5] = [500, 2000, 1000, 3000, 6000];
const LARGE_SIZE: usize = 16000;

fn parse_fit(name: &str) -> Option<Fit> {
    match name {
        "first" => Some(Fit::First),
        "best" => Some(Fit::Best),
        "worst" => Some(Fit::Worst),
        "next" => Some(Fit::Next),
        _ => None,
    }
}

fn run(fit: Fit) -> Result<(), String> {
    let mut buf = vec![0_u8; 1 << 20];
    let mut allocator = unsafe { RawMalloc::with_fit(ArenaGrower::new(&mut buf), fit) };

    println!("Performance and heap fragmentation ({fit:?} fit)");
    let start = Instant::now();

    let mut allocs = [null_mut(); NUM_ALLOCS];
    for (i, p) in allocs.iter_mut().enumerate() {
        *p = allocator.malloc(ALLOC_SIZES[i % ALLOC_SIZES.len()]);
        if p.is_null() {
            return Err(format!("malloc failed at iteration {i}"));
        }
    }

    for p in allocs.iter_mut().skip(2).step_by(3) {
        unsafe { allocator.free(*p) };
        *p = null_mut();
    }

    let mut test_allocs = [null_mut(); TEST_SIZES.len()];
    for (i, p) in test_allocs.iter_mut().enumerate() {
        *p = allocator.malloc(TEST_SIZES[i]);
        if p.is_null() {
            return Err(format!("Test allocation failed at iteration {i}"));
        }
    }

    println!("Execution time: {:?}", start.elapsed());
    println!("Fragmentation before the large request: {:.2}%", allocator.report().fragmentation() * 100.0);

    let grows = allocator.stats().grows;
    let large = allocator.malloc(LARGE_SIZE);
    if large.is_null() {
        println!("Failed to allocate very large block due to fragmentation");
    } else {
        let how = if allocator.stats().grows > grows { "by growing the heap" } else { "from free space" };
        println!("Successfully allocated very large block {how}");
        unsafe { allocator.free(large) };
    }

    unsafe {
        for p in test_allocs.into_iter().chain(allocs) {
            allocator.free(p);
        }
    }

    println!("\n{}\n", allocator.report());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let fits = match env::args().nth(1) {
        Some(name) => match parse_fit(&name) {
            Some(fit) => vec![fit],
            None => {
                eprintln!("Unknown fit strategy `{name}`, expected first, best, worst or next.");
                return ExitCode::FAILURE;
            }
        },
        None => vec![Fit::First, Fit::Best, Fit::Worst, Fit::Next],
    };

    for fit in fits {
        if let Err(e) = run(fit) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
