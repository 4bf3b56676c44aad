//! Expectations and the comparisons that check them.

use serde::{Deserialize, Serialize};

use crate::capture::Stream;
use crate::escape::render_literal;

/// Expected bytes on one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedOutput {
    /// Not checked.
    #[default]
    Any,
    Exactly(Vec<u8>),
}

impl From<&str> for ExpectedOutput {
    fn from(s: &str) -> Self {
        ExpectedOutput::Exactly(s.as_bytes().to_vec())
    }
}

impl From<String> for ExpectedOutput {
    fn from(s: String) -> Self {
        ExpectedOutput::Exactly(s.into_bytes())
    }
}

impl From<&[u8]> for ExpectedOutput {
    fn from(b: &[u8]) -> Self {
        ExpectedOutput::Exactly(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for ExpectedOutput {
    fn from(b: &[u8; N]) -> Self {
        ExpectedOutput::Exactly(b.to_vec())
    }
}

impl From<Vec<u8>> for ExpectedOutput {
    fn from(b: Vec<u8>) -> Self {
        ExpectedOutput::Exactly(b)
    }
}

/// Expected exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedExit {
    Code(i32),
    #[default]
    Any,
    AnyNonZero,
}

impl ExpectedExit {
    pub fn accepts(self, code: i32) -> bool {
        match self {
            ExpectedExit::Code(want) => code == want,
            ExpectedExit::Any => true,
            ExpectedExit::AnyNonZero => code != 0,
        }
    }

    /// Text for the `want:` line of an exit-code mismatch.
    pub fn describe(self) -> String {
        match self {
            ExpectedExit::Code(want) => want.to_string(),
            ExpectedExit::Any => "any".to_string(),
            ExpectedExit::AnyNonZero => "non-zero".to_string(),
        }
    }
}

impl From<i32> for ExpectedExit {
    fn from(code: i32) -> Self {
        ExpectedExit::Code(code)
    }
}

/// What one check expects. Everything defaults to "not checked" and no input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutcome {
    pub input: Option<Vec<u8>>,
    pub stdout: ExpectedOutput,
    pub stderr: ExpectedOutput,
    pub exit: ExpectedExit,
}

impl ExpectedOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.input = Some(bytes.as_ref().to_vec());
        self
    }

    pub fn stdout(mut self, expected: impl Into<ExpectedOutput>) -> Self {
        self.stdout = expected.into();
        self
    }

    pub fn stderr(mut self, expected: impl Into<ExpectedOutput>) -> Self {
        self.stderr = expected.into();
        self
    }

    pub fn exit(mut self, expected: impl Into<ExpectedExit>) -> Self {
        self.exit = expected.into();
        self
    }
}

/// One discrepancy between a run and its expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mismatch", rename_all = "snake_case")]
pub enum Mismatch {
    /// `have` and `want` are already rendered as escaped literals.
    Stream {
        stream: Stream,
        have: String,
        want: String,
    },
    ExitCode {
        have: i32,
        want: String,
    },
}

pub fn compare_stream(stream: Stream, actual: &[u8], expected: &ExpectedOutput) -> Option<Mismatch> {
    match expected {
        ExpectedOutput::Any => None,
        ExpectedOutput::Exactly(want) if want.as_slice() == actual => None,
        ExpectedOutput::Exactly(want) => Some(Mismatch::Stream {
            stream,
            have: render_literal(actual),
            want: render_literal(want),
        }),
    }
}

pub fn compare_exit_code(actual: i32, expected: ExpectedExit) -> Option<Mismatch> {
    if expected.accepts(actual) {
        None
    } else {
        Some(Mismatch::ExitCode {
            have: actual,
            want: expected.describe(),
        })
    }
}
