//! Tracing hooks for the harness.
//!
//! Compiled to no-ops without the `tracing` feature so the harness stays
//! usable from minimal test binaries.

use std::ffi::OsStr;

use crate::report::CheckOutcome;

#[cfg(feature = "tracing")]
pub fn record_spawn(program: &OsStr, argc: usize) {
    tracing::debug!(program = %program.to_string_lossy(), argc, "spawning check subject");
}

#[cfg(not(feature = "tracing"))]
pub fn record_spawn(_program: &OsStr, _argc: usize) { /* no-op */
}

#[cfg(feature = "tracing")]
pub fn record_outcome(context: &str, outcome: CheckOutcome, diagnostics: usize) {
    let span = tracing::span!(tracing::Level::TRACE, "ipd_check", context);
    let _enter = span.enter();
    match outcome {
        CheckOutcome::Passed => tracing::trace!(?outcome, "check finished"),
        _ => tracing::debug!(?outcome, diagnostics, "check finished"),
    }
}

#[cfg(not(feature = "tracing"))]
pub fn record_outcome(_context: &str, _outcome: CheckOutcome, _diagnostics: usize) { /* no-op */
}
