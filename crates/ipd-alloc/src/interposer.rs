//! The allocation interposer: budget checks and bookkeeping around a [`RawHeap`].
//!
//! Order inside every primitive is fixed: lazy init, budget check, heap call,
//! bookkeeping. A refused request returns before the heap is reached, which is
//! what makes failures reproducible run to run.
//!
//! Trace output per call is the call line, then a refusal line if the budget
//! said no. `resize` writes its call line after the heap call because the line
//! names the resulting address.

use std::ptr::NonNull;

use ipd_core::config::LimitConfig;

use crate::error::{Error, Result};
use crate::heap::{RawHeap, SystemHeap};
use crate::init::limits_from_env_or_exit;
use crate::ledger::AllocationRecord;
use crate::limiter::{LimitMode, Limiter};
use crate::trace::TraceSink;

/// Single-writer allocation context.
///
/// Created unconfigured: the first primitive call reads the limit and trace
/// variables from the environment. Calling any `set_*_limit` first skips the
/// limit lookup; [`Interposer::set_trace`] skips the trace lookup.
#[derive(Debug)]
pub struct Interposer<H: RawHeap = SystemHeap> {
    heap: H,
    limiter: Limiter,
    trace: Option<TraceSink>,
    trace_resolved: bool,
}

impl Default for Interposer<SystemHeap> {
    fn default() -> Self {
        Self::new(SystemHeap)
    }
}

impl<H: RawHeap> Interposer<H> {
    pub fn new(heap: H) -> Self {
        Self {
            heap,
            limiter: Limiter::new(),
            trace: None,
            trace_resolved: false,
        }
    }

    /// Create an interposer with an explicit limit and tracing disabled.
    /// Nothing is read from the environment.
    pub fn with_config(heap: H, config: LimitConfig) -> Self {
        let mut this = Self::new(heap);
        this.limiter.configure(config);
        this.trace_resolved = true;
        this
    }

    /// Replace the trace sink (or disable tracing with `None`).
    pub fn set_trace(&mut self, sink: Option<TraceSink>) {
        self.trace = sink;
        self.trace_resolved = true;
    }

    /// Resolve anything still unconfigured from the environment.
    ///
    /// Every primitive does this itself; call it directly to inspect the
    /// environment-derived limit before the first allocation.
    pub fn ensure_init(&mut self) {
        if !self.limiter.is_initialized() {
            self.limiter.configure(limits_from_env_or_exit());
        }
        if !self.trace_resolved {
            self.trace = TraceSink::from_env();
            self.trace_resolved = true;
        }
    }

    fn trace(&mut self, args: std::fmt::Arguments<'_>) {
        if let Some(sink) = self.trace.as_mut() {
            sink.line(args);
        }
    }

    fn trace_refusal<T>(&mut self, result: &Result<T>) {
        if let Err(Error::OutOfMemory { requested, remaining }) = result {
            self.trace(format_args!(
                "libipd_alloc: preventing allocation of {requested} bytes because remaining limit is {remaining}"
            ));
        }
    }

    // ----- limiter control -----

    pub fn set_no_limit(&mut self) {
        self.limiter.set_no_limit();
    }

    pub fn set_total_limit(&mut self, bytes: usize) {
        self.limiter.set_total_limit(bytes);
    }

    pub fn set_peak_limit(&mut self, bytes: usize) {
        self.limiter.set_peak_limit(bytes);
    }

    // ----- primitives -----

    /// `malloc`: `size` bytes, uninitialized.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.ensure_init();
        self.trace(format_args!("allocate({size})"));
        let result = self.allocate_quiet(size);
        self.trace_refusal(&result);
        result
    }

    fn allocate_quiet(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.limiter.check(size)?;
        let ptr = self
            .heap
            .allocate(size)
            .ok_or(Error::HeapExhausted { bytes: size })?;
        self.limiter.did_allocate(ptr.as_ptr() as usize, size);
        Ok(ptr)
    }

    /// `calloc`: `count * size` zeroed bytes.
    ///
    /// An overflowing product is refused before the budget is even consulted.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<NonNull<u8>> {
        self.ensure_init();
        self.trace(format_args!("allocate_zeroed({count}, {size})"));
        let result = self.allocate_zeroed_quiet(count, size);
        self.trace_refusal(&result);
        result
    }

    fn allocate_zeroed_quiet(&mut self, count: usize, size: usize) -> Result<NonNull<u8>> {
        let bytes = count
            .checked_mul(size)
            .ok_or(Error::SizeOverflow { count, size })?;
        self.limiter.check(bytes)?;
        let ptr = self
            .heap
            .allocate_zeroed(count, size)
            .ok_or(Error::HeapExhausted { bytes })?;
        self.limiter.did_allocate(ptr.as_ptr() as usize, bytes);
        Ok(ptr)
    }

    /// `realloc`: resize `ptr` to `new_size` bytes; `None` acts as [`Interposer::allocate`].
    ///
    /// On any error the original block is left exactly as it was.
    ///
    /// # Safety
    /// `ptr`, if present, must be a live block returned by this interposer.
    pub unsafe fn resize(&mut self, ptr: Option<NonNull<u8>>, new_size: usize) -> Result<NonNull<u8>> {
        self.ensure_init();
        let result = match ptr {
            None => self.allocate_quiet(new_size),
            // SAFETY: forwarded caller contract.
            Some(ptr) => unsafe { self.resize_quiet(ptr, new_size) },
        };
        let shown = result.as_ref().map_or(std::ptr::null(), |p| p.as_ptr() as *const u8);
        let old = ptr.map_or(std::ptr::null(), |p| p.as_ptr() as *const u8);
        self.trace(format_args!("resize({old:p}, {new_size}) -> {shown:p}"));
        self.trace_refusal(&result);
        result
    }

    unsafe fn resize_quiet(&mut self, ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>> {
        let plan = self.limiter.check_resize(ptr.as_ptr() as usize, new_size)?;
        // SAFETY: caller guarantees `ptr` is live and came from this heap.
        let moved = unsafe { self.heap.resize(ptr, new_size) }
            .ok_or(Error::HeapExhausted { bytes: new_size })?;
        self.limiter.did_resize(plan, moved.as_ptr() as usize);
        Ok(moved)
    }

    /// `reallocf`: like [`Interposer::resize`], but a failed resize releases
    /// the original block instead of leaving it to the caller.
    ///
    /// # Safety
    /// Same contract as [`Interposer::resize`]; after an error `ptr` is dead.
    pub unsafe fn resize_or_release(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Result<NonNull<u8>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.resize(ptr, new_size) };
        if result.is_err() {
            // SAFETY: the failed resize left `ptr` live and untouched.
            unsafe { self.release(ptr) };
        }
        result
    }

    /// `free`: no-op on `None`.
    ///
    /// # Safety
    /// `ptr`, if present, must be a live block returned by this interposer.
    pub unsafe fn release(&mut self, ptr: Option<NonNull<u8>>) {
        self.ensure_init();
        let shown = ptr.map_or(std::ptr::null(), |p| p.as_ptr() as *const u8);
        self.trace(format_args!("release({shown:p})"));

        let Some(ptr) = ptr else {
            return;
        };
        self.limiter.will_release(ptr.as_ptr() as usize);
        // SAFETY: forwarded caller contract.
        unsafe { self.heap.release(ptr) };
    }

    // ----- inspection -----

    pub fn mode(&self) -> LimitMode {
        self.limiter.mode()
    }

    /// Bytes still available under the current limit (0 without a limit).
    pub fn remaining(&self) -> usize {
        self.limiter.remaining()
    }

    /// Bytes held by live tracked blocks. Only peak mode tracks blocks.
    pub fn outstanding_bytes(&self) -> usize {
        self.limiter.ledger().outstanding()
    }

    /// Number of live tracked blocks; non-zero at exit means a leak.
    pub fn live_allocations(&self) -> usize {
        self.limiter.ledger().len()
    }

    pub fn live_records(&self) -> Vec<AllocationRecord> {
        self.limiter.ledger().records()
    }

    /// Largest outstanding total seen since the last reconfiguration.
    pub fn high_water(&self) -> usize {
        self.limiter.high_water()
    }

    pub fn heap(&self) -> &H {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut H {
        &mut self.heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::CountingHeap;

    fn peak(n: usize) -> Interposer<CountingHeap> {
        Interposer::with_config(CountingHeap::new(SystemHeap), LimitConfig::Peak(n))
    }

    fn total(n: usize) -> Interposer<CountingHeap> {
        Interposer::with_config(CountingHeap::new(SystemHeap), LimitConfig::Total(n))
    }

    #[test]
    fn test_refusal_does_not_reach_heap() {
        let mut alloc = peak(64);
        let err = alloc.allocate(65).unwrap_err();
        assert_eq!(err, Error::OutOfMemory { requested: 65, remaining: 64 });
        assert_eq!(alloc.heap().calls().total(), 0);
    }

    #[test]
    fn test_peak_release_restores_budget() {
        let mut alloc = peak(100);
        let a = alloc.allocate(70).unwrap();
        assert!(alloc.allocate(40).is_err());
        unsafe { alloc.release(Some(a)) };
        let b = alloc.allocate(100).unwrap();
        assert_eq!(alloc.remaining(), 0);
        unsafe { alloc.release(Some(b)) };
        assert_eq!(alloc.live_allocations(), 0);
    }

    #[test]
    fn test_total_release_does_not_restore_budget() {
        let mut alloc = total(100);
        let a = alloc.allocate(70).unwrap();
        unsafe { alloc.release(Some(a)) };
        assert!(alloc.allocate(40).unwrap_err().is_budget_refusal());
        assert_eq!(alloc.remaining(), 30);
    }

    #[test]
    fn test_zeroed_overflow_is_refused_before_budget() {
        let mut alloc = Interposer::with_config(CountingHeap::new(SystemHeap), LimitConfig::NoLimit);
        let err = alloc.allocate_zeroed(usize::MAX / 2, 3).unwrap_err();
        assert_eq!(err, Error::SizeOverflow { count: usize::MAX / 2, size: 3 });
        assert_eq!(err.raw_os_error(), libc::ENOMEM);
        assert_eq!(alloc.heap().calls().total(), 0);
    }

    #[test]
    fn test_zeroed_memory_is_zero_and_accounted() {
        let mut alloc = peak(64);
        let p = alloc.allocate_zeroed(4, 8).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(alloc.outstanding_bytes(), 32);
        unsafe { alloc.release(Some(p)) };
    }

    #[test]
    fn test_resize_of_none_allocates() {
        let mut alloc = peak(10);
        let p = unsafe { alloc.resize(None, 10) }.unwrap();
        assert_eq!(alloc.remaining(), 0);
        assert_eq!(alloc.heap().calls().allocate, 1);
        unsafe { alloc.release(Some(p)) };
    }

    #[test]
    fn test_refused_resize_keeps_block_intact() {
        let mut alloc = peak(16);
        let p = alloc.allocate(8).unwrap();
        unsafe { std::ptr::copy_nonoverlapping(b"abcdefgh".as_ptr(), p.as_ptr(), 8) };
        alloc.heap_mut().reset_calls();

        let err = unsafe { alloc.resize(Some(p), 32) }.unwrap_err();
        assert!(err.is_budget_refusal());
        assert_eq!(alloc.heap().calls().total(), 0);
        assert_eq!(alloc.live_records()[0].address, p.as_ptr() as usize);
        assert_eq!(alloc.live_records()[0].size, 8);
        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 8) };
        assert_eq!(bytes, b"abcdefgh");
        unsafe { alloc.release(Some(p)) };
    }

    #[test]
    fn test_peak_shrink_then_grow() {
        let mut alloc = peak(100);
        let p = alloc.allocate(100).unwrap();
        let p = unsafe { alloc.resize(Some(p), 40) }.unwrap();
        assert_eq!(alloc.remaining(), 60);
        let q = alloc.allocate(60).unwrap();
        assert!(unsafe { alloc.resize(Some(p), 41) }.is_err());
        assert_eq!(alloc.outstanding_bytes() + alloc.remaining(), 100);
        unsafe {
            alloc.release(Some(p));
            alloc.release(Some(q));
        }
        assert_eq!(alloc.high_water(), 100);
    }

    #[test]
    fn test_resize_or_release_frees_on_failure() {
        let mut alloc = peak(32);
        let p = alloc.allocate(16).unwrap();
        assert!(unsafe { alloc.resize_or_release(Some(p), 64) }.is_err());
        assert_eq!(alloc.live_allocations(), 0);
        assert_eq!(alloc.remaining(), 32);
        assert_eq!(alloc.heap().calls().release, 1);
    }

    #[test]
    fn test_release_none_is_noop() {
        let mut alloc = peak(8);
        unsafe { alloc.release(None) };
        assert_eq!(alloc.heap().calls().total(), 0);
    }

    #[test]
    fn test_trace_lines() {
        let mut file = tempfile::tempfile().unwrap();
        let mut alloc = peak(16);
        alloc.set_trace(Some(TraceSink::from_writer(file.try_clone().unwrap())));

        let p = alloc.allocate(8).unwrap();
        let _ = alloc.allocate(9);
        unsafe { alloc.release(Some(p)) };

        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "allocate(8)");
        assert_eq!(lines[1], "allocate(9)");
        assert_eq!(
            lines[2],
            "libipd_alloc: preventing allocation of 9 bytes because remaining limit is 8"
        );
        assert_eq!(lines[3], format!("release({:p})", p.as_ptr()));
    }

    #[test]
    fn test_refused_resize_traces_call_before_refusal() {
        let mut file = tempfile::tempfile().unwrap();
        let mut alloc = peak(16);
        alloc.set_trace(Some(TraceSink::from_writer(file.try_clone().unwrap())));

        let p = alloc.allocate(8).unwrap();
        assert!(unsafe { alloc.resize(Some(p), 32) }.is_err());
        unsafe { alloc.release(Some(p)) };

        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "allocate(8)".to_string(),
                format!("resize({:p}, 32) -> 0x0", p.as_ptr()),
                "libipd_alloc: preventing allocation of 24 bytes because remaining limit is 8"
                    .to_string(),
                format!("release({:p})", p.as_ptr()),
            ]
        );
    }
}
