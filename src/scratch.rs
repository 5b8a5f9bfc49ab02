//! Per-thread reusable read buffer.
//!
//! Pixel disk reads land in a thread-local buffer that grows to the
//! largest read seen on that thread and never shrinks. The buffer is only
//! ever exposed as a borrow inside [`with_scratch`]; callers that need to
//! keep the bytes must copy them into an owned buffer before returning.

use std::cell::RefCell;

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` over the first `len` bytes of this thread's scratch buffer.
///
/// The buffer is zero-extended to `len` when it is smaller. Nested calls
/// would alias the buffer, so `f` must not call back into `with_scratch`.
pub fn with_scratch<R>(len: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
    SCRATCH.with(|cell| {
        let mut buf = cell.borrow_mut();
        if buf.len() < len {
            buf.resize(len, 0);
        }
        f(&mut buf[..len])
    })
}

/// Current scratch buffer length for this thread.
#[cfg(test)]
fn scratch_len() -> usize {
    SCRATCH.with(|cell| cell.borrow().len())
}
