//! The real heap underneath the interposer.
//!
//! [`Interposer`](crate::Interposer) is generic over [`RawHeap`] so the budget
//! logic can be exercised against a recording heap in tests, and so callers
//! never depend on link-time symbol shadowing.

use std::ptr::NonNull;

/// Minimal C-style heap: sizes in, pointers out, `None` on exhaustion.
///
/// Returned blocks must be suitably aligned for any fundamental type, as with
/// `malloc`.
pub trait RawHeap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// `count * size` zeroed bytes. The caller has already ruled out overflow.
    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<NonNull<u8>>;

    /// Resize a block. On `None` the original block is untouched.
    ///
    /// # Safety
    /// `ptr` must be a live block obtained from this heap.
    unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `ptr` must be a live block obtained from this heap; it is dead afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>);
}

/// The C library heap.
///
/// Zero-byte requests are rounded up to one byte so a successful call always
/// yields a unique, releasable pointer and `realloc(p, 0)` never frees `p`
/// behind the interposer's back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHeap;

impl RawHeap for SystemHeap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc accepts any size and returns null on failure.
        NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast::<u8>())
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let (count, size) = if count == 0 || size == 0 { (1, 1) } else { (count, size) };
        // SAFETY: calloc checks its own multiplication and returns null on failure.
        NonNull::new(unsafe { libc::calloc(count, size) }.cast::<u8>())
    }

    unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        // SAFETY: caller guarantees `ptr` came from malloc/calloc/realloc. On
        // failure realloc leaves the block alone.
        NonNull::new(unsafe { libc::realloc(ptr.as_ptr().cast(), new_size.max(1)) }.cast::<u8>())
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is a live block from this heap.
        unsafe { libc::free(ptr.as_ptr().cast()) }
    }
}

/// Per-primitive call counts recorded by [`CountingHeap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapCalls {
    pub allocate: usize,
    pub allocate_zeroed: usize,
    pub resize: usize,
    pub release: usize,
}

impl HeapCalls {
    pub fn total(&self) -> usize {
        self.allocate + self.allocate_zeroed + self.resize + self.release
    }
}

/// Wraps another heap and counts how often each primitive reaches it.
///
/// Useful to show that a refused request never touched the real heap.
#[derive(Debug, Default)]
pub struct CountingHeap<H = SystemHeap> {
    inner: H,
    calls: HeapCalls,
}

impl<H: RawHeap> CountingHeap<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            calls: HeapCalls::default(),
        }
    }

    pub fn calls(&self) -> HeapCalls {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = HeapCalls::default();
    }
}

impl<H: RawHeap> RawHeap for CountingHeap<H> {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.calls.allocate += 1;
        self.inner.allocate(size)
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.calls.allocate_zeroed += 1;
        self.inner.allocate_zeroed(count, size)
    }

    unsafe fn resize(&mut self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        self.calls.resize += 1;
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.resize(ptr, new_size) }
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>) {
        self.calls.release += 1;
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(ptr) }
    }
}
