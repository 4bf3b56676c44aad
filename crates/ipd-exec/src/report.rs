//! Check results and their human-readable rendering.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::verify::Mismatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Passed,
    /// The subject ran but did not behave as expected.
    Failed,
    /// The subject could not be run or judged (harness failure, signal).
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Mismatch(Mismatch),
    /// The subject never started.
    HarnessFailure { message: String },
    Signaled { signal: i32 },
    /// The harness's own system calls failed.
    SystemError { message: String },
}

impl Diagnostic {
    fn is_error(&self) -> bool {
        !matches!(self, Diagnostic::Mismatch(_))
    }
}

/// `SIGKILL (9)`, or `signal 64 (64)` for numbers nix does not know.
pub fn signal_name(signal: i32) -> String {
    match nix::sys::signal::Signal::try_from(signal) {
        Ok(sig) => format!("{} ({signal})", sig.as_str()),
        Err(_) => format!("signal {signal} ({signal})"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Name of the entry point, e.g. `CHECK_EXEC`.
    pub context: String,
    pub file: String,
    pub line: u32,
    pub outcome: CheckOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckReport {
    pub fn new(context: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            context: context.into(),
            file: file.into(),
            line,
            outcome: CheckOutcome::Passed,
            diagnostics: Vec::new(),
        }
    }

    /// Add a diagnostic. An error outranks a mismatch in the overall outcome.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.outcome = match (self.outcome, diagnostic.is_error()) {
            (_, true) | (CheckOutcome::Errored, _) => CheckOutcome::Errored,
            _ => CheckOutcome::Failed,
        };
        self.diagnostics.push(diagnostic);
    }

    pub fn passed(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }

    /// Write one block per diagnostic. Nothing is written for a pass.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let at = format!("{}:{}", self.file, self.line);
        for diag in &self.diagnostics {
            match diag {
                Diagnostic::Mismatch(Mismatch::Stream { stream, have, want }) => {
                    writeln!(out, "\nCheck failed ({at}):")?;
                    writeln!(out, "  reason: {} had mismatch in {stream}", self.context)?;
                    writeln!(out, "  have: {have}")?;
                    writeln!(out, "  want: {want}")?;
                }
                Diagnostic::Mismatch(Mismatch::ExitCode { have, want }) => {
                    writeln!(out, "\nCheck failed ({at}):")?;
                    writeln!(out, "  reason: exit code mismatch")?;
                    writeln!(out, "  have: {have}")?;
                    writeln!(out, "  want: {want}")?;
                }
                Diagnostic::HarnessFailure { message } | Diagnostic::SystemError { message } => {
                    writeln!(out, "\nError in {} ({at}):", self.context)?;
                    writeln!(out, "  reason: {message}")?;
                }
                Diagnostic::Signaled { signal } => {
                    writeln!(out, "\nError in {} ({at}):", self.context)?;
                    writeln!(out, "  reason: killed by signal")?;
                    writeln!(out, "  signal: {}", signal_name(*signal))?;
                }
            }
        }
        Ok(())
    }

    pub fn render_to_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.render(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render to stderr. Failures writing stderr are ignored.
    pub fn emit(&self) {
        if self.diagnostics.is_empty() {
            return;
        }
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        let _ = self.render(&mut lock);
        let _ = lock.flush();
    }
}
