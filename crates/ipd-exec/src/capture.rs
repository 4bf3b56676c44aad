//! The four anonymous files a check binds to its child.
//!
//! Each file is unlinked at creation, so it acts as a growable, seekable buffer
//! that leaves nothing behind on disk. All four are closed when the set is
//! dropped, which covers every exit path of a check.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::process::Stdio;

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
    /// Harness-only channel carrying pre-exec failure text from the child.
    Diagnostic,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::Stdin,
        Stream::Stdout,
        Stream::Stderr,
        Stream::Diagnostic,
    ];

    /// Descriptor number this stream occupies in the child.
    pub fn child_fd(self) -> RawFd {
        self.index() as RawFd
    }

    pub fn name(self) -> &'static str {
        match self {
            Stream::Stdin => "stdin",
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
            Stream::Diagnostic => "diagnostic channel",
        }
    }

    fn index(self) -> usize {
        match self {
            Stream::Stdin => 0,
            Stream::Stdout => 1,
            Stream::Stderr => 2,
            Stream::Diagnostic => 3,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct CaptureSet {
    files: [File; 4],
}

impl CaptureSet {
    pub fn create() -> Result<Self> {
        let mk = || tempfile::tempfile().map_err(ExecError::CaptureSetup);
        Ok(Self {
            files: [mk()?, mk()?, mk()?, mk()?],
        })
    }

    fn file(&mut self, stream: Stream) -> &mut File {
        &mut self.files[stream.index()]
    }

    /// Write the child's input and rewind so the child reads it from the start.
    pub fn preload_stdin(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file(Stream::Stdin);
        file.write_all(bytes).map_err(ExecError::StdinWrite)?;
        file.flush().map_err(ExecError::StdinWrite)?;
        file.seek(SeekFrom::Start(0)).map_err(ExecError::StdinWrite)?;
        Ok(())
    }

    /// A duplicate of `stream`'s descriptor for the child's stdio.
    ///
    /// The duplicate shares the file offset, so bytes the child writes are
    /// visible through this set afterwards.
    pub fn stdio(&self, stream: Stream) -> Result<Stdio> {
        let dup = self.files[stream.index()]
            .try_clone()
            .map_err(ExecError::CaptureSetup)?;
        Ok(Stdio::from(dup))
    }

    pub fn raw_fd(&self, stream: Stream) -> RawFd {
        self.files[stream.index()].as_raw_fd()
    }

    /// Everything written to `stream`, from the beginning.
    pub fn read_back(&mut self, stream: Stream) -> Result<Vec<u8>> {
        let read_err = |source| ExecError::ReadBack { stream, source };
        let file = self.file(stream);
        file.seek(SeekFrom::Start(0)).map_err(read_err)?;
        let mut out = Vec::new();
        file.read_to_end(&mut out).map_err(read_err)?;
        Ok(out)
    }
}
