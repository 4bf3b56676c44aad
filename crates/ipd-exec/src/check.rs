//! Check entry points.
//!
//! [`check_exec`] and friends are the assertion-style API: run, compare,
//! print every discrepancy to stderr, return whether the check passed. They
//! never panic and never abort the caller, so one test can run many checks
//! and see all of their failures. [`Check`] and [`verify`] are the pieces
//! underneath, for callers that want the [`CheckReport`] itself.

use std::ffi::OsStr;
use std::panic::Location;

use crate::capture::Stream;
use crate::error::Result;
use crate::metrics;
use crate::report::{CheckReport, Diagnostic};
use crate::runner::{ProcessRunner, RunOutput, Termination};
use crate::verify::{compare_exit_code, compare_stream, ExpectedOutcome};

/// One pending check, tied to the source location that created it.
#[derive(Debug)]
pub struct Check {
    context: &'static str,
    location: &'static Location<'static>,
    runner: Result<ProcessRunner>,
}

impl Check {
    /// Check `argv` run directly (`argv[0]` resolved on `PATH`).
    #[track_caller]
    pub fn exec<S: AsRef<OsStr>>(argv: &[S]) -> Self {
        Self {
            context: "CHECK_EXEC",
            location: Location::caller(),
            runner: ProcessRunner::new(argv),
        }
    }

    /// Check a shell command line run through `/bin/sh -c`.
    #[track_caller]
    pub fn command(command: &str) -> Self {
        Self {
            context: "CHECK_COMMAND",
            location: Location::caller(),
            runner: Ok(ProcessRunner::shell(command)),
        }
    }

    #[track_caller]
    pub fn with_runner(runner: ProcessRunner) -> Self {
        Self {
            context: "CHECK_EXEC",
            location: Location::caller(),
            runner: Ok(runner),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Run the subject once and judge it. Harness failures end up in the
    /// report as errors rather than being returned.
    pub fn run(&self, expected: &ExpectedOutcome) -> CheckReport {
        let report = CheckReport::new(self.context, self.location.file(), self.location.line());
        let output = self
            .runner
            .as_ref()
            .map_err(|err| err.to_string())
            .and_then(|runner| {
                runner
                    .run(expected.input.as_deref())
                    .map_err(|err| err.to_string())
            });

        let report = match output {
            Ok(output) => verify(report, &output, expected),
            Err(message) => {
                let mut report = report;
                report.push(Diagnostic::SystemError { message });
                report
            }
        };
        metrics::record_outcome(self.context, report.outcome, report.diagnostics.len());
        report
    }
}

/// Compare one run against `expected`, adding every discrepancy to `report`.
///
/// A subject that never started gets no stream comparison. A signaled
/// subject still has its streams compared but has no exit code to check.
pub fn verify(mut report: CheckReport, output: &RunOutput, expected: &ExpectedOutcome) -> CheckReport {
    if let Termination::Unreachable { message, .. } = &output.termination {
        report.push(Diagnostic::HarnessFailure {
            message: message.clone(),
        });
        return report;
    }

    let streams = [
        (Stream::Stdout, &output.stdout, &expected.stdout),
        (Stream::Stderr, &output.stderr, &expected.stderr),
    ];
    for (stream, actual, want) in streams {
        if let Some(mismatch) = compare_stream(stream, actual, want) {
            report.push(Diagnostic::Mismatch(mismatch));
        }
    }

    match output.termination {
        Termination::Exited(code) => {
            if let Some(mismatch) = compare_exit_code(code, expected.exit) {
                report.push(Diagnostic::Mismatch(mismatch));
            }
        }
        Termination::Signaled(signal) => report.push(Diagnostic::Signaled { signal }),
        Termination::Unreachable { .. } => {}
    }
    report
}

/// Run `argv`, print any discrepancies, and return whether it passed.
#[track_caller]
pub fn check_exec<S: AsRef<OsStr>>(argv: &[S], expected: &ExpectedOutcome) -> bool {
    finish(Check::exec(argv).run(expected))
}

/// Like [`check_exec`] for a shell command line.
#[track_caller]
pub fn check_command(command: &str, expected: &ExpectedOutcome) -> bool {
    finish(Check::command(command).run(expected))
}

/// Like [`check_exec`] for a preconfigured runner (extra environment, etc).
#[track_caller]
pub fn check_with(runner: ProcessRunner, expected: &ExpectedOutcome) -> bool {
    finish(Check::with_runner(runner).run(expected))
}

fn finish(report: CheckReport) -> bool {
    report.emit();
    report.passed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CheckOutcome;
    use crate::runner::HarnessExit;
    use crate::verify::{ExpectedExit, Mismatch};

    fn output(termination: Termination, stdout: &[u8], stderr: &[u8]) -> RunOutput {
        RunOutput {
            termination,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        }
    }

    fn blank() -> CheckReport {
        CheckReport::new("CHECK_EXEC", "here.rs", 1)
    }

    #[test]
    fn test_all_mismatches_are_collected() {
        let expected = ExpectedOutcome::new().stdout("a").stderr("b").exit(0);
        let report = verify(blank(), &output(Termination::Exited(2), b"x", b"y"), &expected);
        assert_eq!(report.outcome, CheckOutcome::Failed);
        assert_eq!(report.diagnostics.len(), 3);
    }

    #[test]
    fn test_unreachable_skips_stream_comparison() {
        let expected = ExpectedOutcome::new().stdout("a").exit(0);
        let termination = Termination::Unreachable {
            cause: HarnessExit::CouldNotExec,
            message: "nope".into(),
        };
        let report = verify(blank(), &output(termination, b"", b""), &expected);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::HarnessFailure {
                message: "nope".into()
            }]
        );
    }

    #[test]
    fn test_signal_keeps_stream_checks_and_skips_exit() {
        let expected = ExpectedOutcome::new().stdout("a").exit(ExpectedExit::AnyNonZero);
        let report = verify(blank(), &output(Termination::Signaled(9), b"b", b""), &expected);
        assert_eq!(report.outcome, CheckOutcome::Errored);
        assert!(matches!(
            report.diagnostics[0],
            Diagnostic::Mismatch(Mismatch::Stream { stream: Stream::Stdout, .. })
        ));
        assert_eq!(report.diagnostics[1], Diagnostic::Signaled { signal: 9 });
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn test_location_is_the_caller() {
        let line = line!() + 1;
        let check = Check::command("true");
        assert_eq!(check.location().line(), line);
        assert!(check.location().file().ends_with("check.rs"));
    }

    #[test]
    fn test_empty_argv_is_an_error_not_a_panic() {
        let argv: [&str; 0] = [];
        let report = Check::exec(&argv).run(&ExpectedOutcome::new());
        assert_eq!(report.outcome, CheckOutcome::Errored);
    }

    #[test]
    fn test_cat_round_trip() {
        let expected = ExpectedOutcome::new().input("abc").stdout("abc").stderr("").exit(0);
        assert!(check_exec(&["cat"], &expected));
    }
}
