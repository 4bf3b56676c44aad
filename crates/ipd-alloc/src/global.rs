//! Process-wide interposer for drop-in use.
//!
//! Student programs that do not want to thread an [`Interposer`] through their
//! code call these free functions instead. There is exactly one context per
//! process. The mutex only keeps the API sound; the limiter semantics assume a
//! single thread of control, and interleaving calls from several threads makes
//! the budget arithmetic meaningless.

use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::heap::SystemHeap;
use crate::interposer::Interposer;
use crate::limiter::LimitMode;

static GLOBAL: Lazy<Mutex<Interposer<SystemHeap>>> =
    Lazy::new(|| Mutex::new(Interposer::new(SystemHeap)));

fn with<R>(f: impl FnOnce(&mut Interposer<SystemHeap>) -> R) -> R {
    let mut guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

pub fn ensure_init() {
    with(|i| i.ensure_init())
}

pub fn allocate(size: usize) -> Result<NonNull<u8>> {
    with(|i| i.allocate(size))
}

pub fn allocate_zeroed(count: usize, size: usize) -> Result<NonNull<u8>> {
    with(|i| i.allocate_zeroed(count, size))
}

/// # Safety
/// `ptr`, if present, must be a live block returned by this module.
pub unsafe fn resize(ptr: Option<NonNull<u8>>, new_size: usize) -> Result<NonNull<u8>> {
    // SAFETY: forwarded caller contract.
    with(|i| unsafe { i.resize(ptr, new_size) })
}

/// # Safety
/// `ptr`, if present, must be a live block returned by this module.
pub unsafe fn resize_or_release(ptr: Option<NonNull<u8>>, new_size: usize) -> Result<NonNull<u8>> {
    // SAFETY: forwarded caller contract.
    with(|i| unsafe { i.resize_or_release(ptr, new_size) })
}

/// # Safety
/// `ptr`, if present, must be a live block returned by this module.
pub unsafe fn release(ptr: Option<NonNull<u8>>) {
    // SAFETY: forwarded caller contract.
    with(|i| unsafe { i.release(ptr) })
}

pub fn set_no_limit() {
    with(|i| i.set_no_limit())
}

pub fn set_peak_limit(bytes: usize) {
    with(|i| i.set_peak_limit(bytes))
}

pub fn set_total_limit(bytes: usize) {
    with(|i| i.set_total_limit(bytes))
}

pub fn mode() -> LimitMode {
    with(|i| i.mode())
}

pub fn remaining() -> usize {
    with(|i| i.remaining())
}

pub fn outstanding_bytes() -> usize {
    with(|i| i.outstanding_bytes())
}

pub fn live_allocations() -> usize {
    with(|i| i.live_allocations())
}
