//! Run one child to completion with captured stdio.
//!
//! Sequence per run:
//! 1. create the capture set; preload stdin if input was given
//! 2. spawn with fds 0-2 bound to the capture files
//! 3. in the child, before exec: bind the diagnostic file to fd 3
//! 4. wait (no timeout)
//! 5. classify: normal exit, harness failure, or signal
//! 6. read stdout/stderr back unless the child never started
//!
//! Exit statuses 250-252 are reserved for harness failures in the child and
//! cannot be told apart from a subject exiting with the same code. Subjects
//! that need those codes are unsupported.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus};

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureSet, Stream};
use crate::error::{ExecError, Result};
use crate::metrics;

/// Reserved child exit statuses meaning "the subject never ran".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarnessExit {
    CouldNotDup2,
    CouldNotClose,
    CouldNotExec,
}

impl HarnessExit {
    pub const ALL: [HarnessExit; 3] = [
        HarnessExit::CouldNotDup2,
        HarnessExit::CouldNotClose,
        HarnessExit::CouldNotExec,
    ];

    pub fn code(self) -> i32 {
        match self {
            HarnessExit::CouldNotDup2 => 250,
            HarnessExit::CouldNotClose => 251,
            HarnessExit::CouldNotExec => 252,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.code() == code)
    }

    pub fn describe(self) -> &'static str {
        match self {
            HarnessExit::CouldNotDup2 => "could not dup2",
            HarnessExit::CouldNotClose => "could not close",
            HarnessExit::CouldNotExec => "could not exec",
        }
    }
}

/// How the child ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    /// The subject program never started; `message` says why.
    Unreachable { cause: HarnessExit, message: String },
}

/// Everything a run produced. Streams are empty for [`Termination::Unreachable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunOutput {
    fn unreachable(cause: HarnessExit, message: String) -> Self {
        Self {
            termination: Termination::Unreachable { cause, message },
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// A program plus arguments, ready to be run any number of times.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl ProcessRunner {
    /// `argv[0]` is looked up on `PATH` like `execvp`.
    pub fn new<S: AsRef<OsStr>>(argv: &[S]) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyArgv)?;
        Ok(Self {
            program: program.as_ref().to_owned(),
            args: args.iter().map(|a| a.as_ref().to_owned()).collect(),
            envs: Vec::new(),
        })
    }

    /// Run `command` through `/bin/sh -c`.
    pub fn shell(command: &str) -> Self {
        Self {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), command.into()],
            envs: Vec::new(),
        }
    }

    /// Set an extra environment variable for the child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Run the child to completion, feeding it `stdin` if given.
    ///
    /// `Err` means the harness itself failed (temp files, wait, read-back);
    /// a subject that cannot be started is an `Ok` with
    /// [`Termination::Unreachable`].
    pub fn run(&self, stdin: Option<&[u8]>) -> Result<RunOutput> {
        let mut capture = CaptureSet::create()?;
        if let Some(bytes) = stdin.filter(|b| !b.is_empty()) {
            capture.preload_stdin(bytes)?;
        }

        let status = {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args)
                .envs(self.envs.iter().map(|(k, v)| (k, v)))
                .stdin(capture.stdio(Stream::Stdin)?)
                .stdout(capture.stdio(Stream::Stdout)?)
                .stderr(capture.stdio(Stream::Stderr)?);

            let diag_fd = capture.raw_fd(Stream::Diagnostic);
            // SAFETY: the hook only makes async-signal-safe libc calls and
            // never allocates.
            unsafe {
                cmd.pre_exec(move || bind_diagnostic_channel(diag_fd));
            }

            metrics::record_spawn(&self.program, self.args.len());
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    return Ok(RunOutput::unreachable(
                        HarnessExit::CouldNotExec,
                        err.to_string(),
                    ))
                }
            };
            child.wait().map_err(ExecError::Wait)?
            // `cmd` drops here, closing the parent's copies of the stdio dups.
        };

        let termination = classify(status, &mut capture)?;
        if let Termination::Unreachable { .. } = termination {
            return Ok(RunOutput {
                termination,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        Ok(RunOutput {
            termination,
            stdout: capture.read_back(Stream::Stdout)?,
            stderr: capture.read_back(Stream::Stderr)?,
        })
    }
}

fn classify(status: ExitStatus, capture: &mut CaptureSet) -> Result<Termination> {
    if let Some(code) = status.code() {
        return match HarnessExit::from_code(code) {
            Some(cause) => {
                let raw = capture.read_back(Stream::Diagnostic)?;
                Ok(Termination::Unreachable {
                    cause,
                    message: decode_diagnostic(cause, &raw),
                })
            }
            None => Ok(Termination::Exited(code)),
        };
    }
    match status.signal() {
        Some(signal) => Ok(Termination::Signaled(signal)),
        None => Ok(Termination::Exited(status.into_raw())),
    }
}

/// Turn diagnostic-channel bytes into a message.
///
/// The child writes `<what>: errno <n>`; the errno is rendered here, in the
/// parent, where formatting may allocate.
fn decode_diagnostic(cause: HarnessExit, raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return cause.describe().to_string();
    }
    match text.rsplit_once(": errno ") {
        Some((what, errno)) => match errno.parse::<i32>() {
            Ok(errno) => format!("{what}: {}", io::Error::from_raw_os_error(errno)),
            Err(_) => text.to_string(),
        },
        None => text.to_string(),
    }
}

// ----- child side (runs between fork and exec) -----

fn bind_diagnostic_channel(fd: RawFd) -> io::Result<()> {
    let target = Stream::Diagnostic.child_fd();
    if fd == target {
        // Already in place; only the close-on-exec flag has to go.
        // SAFETY: plain fcntl on a descriptor we own.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, 0) } < 0 {
            child_fail(fd, HarnessExit::CouldNotDup2);
        }
        return Ok(());
    }
    // SAFETY: dup2/close are async-signal-safe.
    if unsafe { libc::dup2(fd, target) } < 0 {
        child_fail(fd, HarnessExit::CouldNotDup2);
    }
    if unsafe { libc::close(fd) } < 0 {
        child_fail(target, HarnessExit::CouldNotClose);
    }
    Ok(())
}

/// Write `<what>: errno <n>` to `fd` and leave with the reserved status.
///
/// No allocation and no std formatting: the parent may have had other threads
/// holding the allocator lock at fork time.
fn child_fail(fd: RawFd, cause: HarnessExit) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let mut buf = [0u8; 64];
    let len = encode_failure(&mut buf, cause, errno);
    // SAFETY: write/_exit are async-signal-safe; `buf[..len]` is initialized.
    unsafe {
        libc::write(fd, buf.as_ptr().cast(), len);
        libc::_exit(cause.code())
    }
}

/// Fill `buf` with `<what>: errno <n>`, returning the length used.
fn encode_failure(buf: &mut [u8; 64], cause: HarnessExit, errno: i32) -> usize {
    let mut len = 0;
    for &b in cause.describe().as_bytes().iter().chain(b": errno ") {
        buf[len] = b;
        len += 1;
    }
    len + write_decimal(&mut buf[len..], errno)
}

fn write_decimal(out: &mut [u8], value: i32) -> usize {
    let mut digits = [0u8; 12];
    let mut n = value.unsigned_abs();
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    let mut len = 0;
    if value < 0 {
        out[len] = b'-';
        len += 1;
    }
    for i in (0..count).rev() {
        out[len] = digits[i];
        len += 1;
    }
    len
}
