//! `malloc`, `free`, `calloc` and `realloc` exported with the C ABI so that
//! `LD_PRELOAD`-ing the library swaps out the allocator of a C program.
//!
//! The heap report is printed to standard output when the process exits.
//! A double free prints a message to standard error and aborts the process.
//! The fit strategy is picked with the `best-fit`, `worst-fit` and `next-fit` features.

use core::ffi::c_void;
use core::fmt::{self, Write};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use fitmalloc::growers::BrkGrower;
use fitmalloc::{DoubleFree, Malloc};

static ALLOCATOR: Malloc<BrkGrower> = unsafe { Malloc::with_grower(BrkGrower::new()) };

static REPORT_REGISTERED: AtomicBool = AtomicBool::new(false);

fn register_report() {
    if REPORT_REGISTERED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
    {
        unsafe { libc::atexit(print_report) };
    }
}

extern "C" fn print_report() {
    let mut out = StackWriter::new();
    // A report larger than the buffer is cut short rather than allocated for.
    let _ = write!(out, "\n{}", ALLOCATOR.report());
    out.flush(libc::STDOUT_FILENO);
}

/// Reports `err` and aborts, without panicking since the panic machinery allocates.
fn abort_on(err: DoubleFree) -> ! {
    let mut out = StackWriter::new();
    let _ = writeln!(out, "fitmalloc: {err}, aborting");
    out.flush(libc::STDERR_FILENO);
    unsafe { libc::abort() }
}

/// Formats into a fixed buffer, printing from here must not call back into the allocator.
struct StackWriter {
    buf: [u8; 1024],
    len: usize,
}

impl StackWriter {
    fn new() -> Self {
        StackWriter {
            buf: [0; 1024],
            len: 0,
        }
    }

    fn flush(&mut self, fd: libc::c_int) {
        let mut written = 0;
        while written < self.len {
            let rest = &self.buf[written..self.len];
            let n = unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) };
            if n <= 0 {
                break;
            }
            written += n as usize;
        }
        self.len = 0;
    }
}

impl Write for StackWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

#[no_mangle]
pub extern "C" fn malloc(size: usize) -> *mut c_void {
    register_report();
    ALLOCATOR.malloc(size).cast()
}

/// # Safety
/// `ptr` must be null or have been returned by this library.
#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if let Err(err) = ALLOCATOR.try_free(ptr.cast()) {
        abort_on(err);
    }
}

#[no_mangle]
pub extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
    register_report();
    ALLOCATOR.calloc(count, size).cast()
}

/// # Safety
/// `ptr` must be null or have been returned by this library.
#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    register_report();
    match ALLOCATOR.try_realloc(ptr.cast(), size) {
        Ok(ptr) => ptr.cast(),
        Err(err) => abort_on(err),
    }
}

/// # Safety
/// `ptr` must be null or have been returned by this library and not yet released.
#[no_mangle]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut c_void) -> usize {
    match NonNull::new(ptr.cast()) {
        Some(ptr) => ALLOCATOR.usable_size(ptr),
        None => 0,
    }
}
