use std::io;

use thiserror::Error;

use crate::capture::Stream;

/// Result type local to ipd-exec.
pub type Result<T> = std::result::Result<T, ExecError>;

/// System-call failures on the harness side of a check.
///
/// These abort the current check (it is reported as errored) but never the
/// test run.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no program given")]
    EmptyArgv,

    #[error("could not create capture file: {0}")]
    CaptureSetup(#[source] io::Error),

    #[error("could not write child input: {0}")]
    StdinWrite(#[source] io::Error),

    #[error("could not wait for child: {0}")]
    Wait(#[source] io::Error),

    #[error("could not read captured {stream}: {source}")]
    ReadBack {
        stream: Stream,
        #[source]
        source: io::Error,
    },
}
