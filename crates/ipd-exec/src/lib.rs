//! ipd-exec: black-box checks of a program's stdout, stderr, and exit status.
//!
//! A check runs one child to completion with its stdio bound to anonymous
//! temp files, then compares what it captured against an [`ExpectedOutcome`].
//! Every discrepancy is reported, not just the first.
//!
//! ```no_run
//! use ipd_exec::{check_exec, ExpectedOutcome};
//!
//! let ok = check_exec(&["cat"], &ExpectedOutcome::new()
//!     .input("abc")
//!     .stdout("abc")
//!     .stderr("")
//!     .exit(0));
//! assert!(ok);
//! ```

pub mod capture;
pub mod check;
pub mod error;
pub mod escape;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod verify;

pub use capture::{CaptureSet, Stream};
pub use check::{check_command, check_exec, check_with, verify, Check};
pub use error::{ExecError, Result};
pub use report::{signal_name, CheckOutcome, CheckReport, Diagnostic};
pub use runner::{HarnessExit, ProcessRunner, RunOutput, Termination};
pub use verify::{ExpectedExit, ExpectedOutcome, ExpectedOutput, Mismatch};
