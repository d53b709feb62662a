//! Splits, heap growth and max heap size.
//!
//! Four allocations grow the heap four times, freeing two of them and asking
//! for smaller blocks splits the freed space twice.
//!
//! Run with `cargo run --example splits -- [first|best|worst|next]`,
//! every strategy is run if none is given.

use std::env;
use std::time::Instant;

use fitmalloc::growers::ArenaGrower;
use fitmalloc::{Fit, RawMalloc};
use tracing_subscriber::EnvFilter;

fn parse_fit(name: &str) -> Option<Fit> {
    match name {
        "first" => Some(Fit::First),
        "best" => Some(Fit::Best),
        "worst" => Some(Fit::Worst),
        "next" => Some(Fit::Next),
        _ => None,
    }
}

fn run(fit: Fit) {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut allocator = unsafe { RawMalloc::with_fit(ArenaGrower::new(&mut buf), fit) };

    println!("Splits, heap growth and max heap size ({fit:?} fit)");
    let start = Instant::now();

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

    unsafe {
        for p in [p1, p3, p5, p6] {
            allocator.free(p);
        }
    }

    println!("Execution time: {:?}", start.elapsed());
    println!("\n{}\n", allocator.report());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match env::args().nth(1) {
        Some(name) => match parse_fit(&name) {
            Some(fit) => run(fit),
            None => eprintln!("Unknown fit strategy `{name}`, expected first, best, worst or next."),
        },
        None => [Fit::First, Fit::Best, Fit::Worst, Fit::Next]
            .into_iter()
            .for_each(run),
    }
}
