//! ipd-alloc: deterministic allocation limiting and a ledger of live blocks.
//!
//! All heap traffic of the code under test should flow through an
//! [`Interposer`] so its budget is enforced before the real heap is touched.
//! The real heap is injected through [`RawHeap`]; [`SystemHeap`] forwards to
//! the C allocator.
//!
//! Two budget flavours exist:
//! - *peak*: caps bytes live at once; releases give budget back.
//! - *total*: caps bytes ever requested; releases give nothing back.
//!
//! The limiter is configured lazily from the environment on first use unless
//! a `set_*_limit` call comes first. See `ipd_core::config` for variable names.
//!
//! Not thread-safe by itself: an [`Interposer`] is a single-writer context.
//! The [`global`] module wraps one in a mutex for drop-in use.

pub mod error;
pub mod global;
pub mod heap;
pub mod init;
pub mod interposer;
pub mod ledger;
pub mod limiter;
pub mod trace;
pub mod tracking;

pub use error::{Error, Result};
pub use heap::{CountingHeap, HeapCalls, RawHeap, SystemHeap};
pub use interposer::Interposer;
pub use ledger::{AllocationRecord, Ledger, EXIT_LEDGER_FAILURE};
pub use limiter::{LimitMode, Limiter};
pub use trace::TraceSink;
pub use tracking::HighWater;
