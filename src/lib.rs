//! ipd: allocation limiting and black-box process checks.
//!
//! This crate re-exports the member crates under one name:
//! - [`config`]: limit and trace configuration resolved from the environment
//! - [`limit`]: the allocation interposer, ledger, and process-global facade
//! - [`exec`]: subprocess capture, comparison, and check reports
//!
//! Tests usually only need the [`prelude`].

pub use ipd_alloc as limit;
pub use ipd_core as config;
pub use ipd_exec as exec;

pub mod prelude {
    pub use ipd_alloc::{global, Interposer, LimitMode, RawHeap, SystemHeap};
    pub use ipd_core::{LimitConfig, TraceTarget};
    pub use ipd_exec::{
        check_command, check_exec, check_with, CheckOutcome, CheckReport, ExpectedExit,
        ExpectedOutcome, ExpectedOutput, ProcessRunner,
    };
}
