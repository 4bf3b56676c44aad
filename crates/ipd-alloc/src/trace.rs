//! Line-oriented allocation trace sink (`RTIPD_TRACE`).
//!
//! Every line is flushed as soon as it is written so a crashing program still
//! leaves a complete trace behind. Write errors are ignored: tracing must
//! never change what the interposer decides.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::os::fd::FromRawFd;

use ipd_core::config::TraceTarget;

pub struct TraceSink {
    out: Box<dyn Write + Send>,
}

impl fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSink").finish_non_exhaustive()
    }
}

impl TraceSink {
    /// Open the sink described by `target`. Any failure means "no tracing".
    pub fn open(target: &TraceTarget) -> Option<Self> {
        match target {
            TraceTarget::Disabled => None,
            TraceTarget::Descriptor(fd) => Self::from_descriptor(*fd),
            TraceTarget::Path(path) => File::create(path).ok().map(Self::from_writer),
        }
    }

    /// Resolve `RTIPD_TRACE` and open it.
    pub fn from_env() -> Option<Self> {
        let target = TraceTarget::from_env();
        let sink = Self::open(&target);
        #[cfg(feature = "tracing")]
        if target.is_enabled() && sink.is_none() {
            tracing::debug!(?target, "allocation trace sink unavailable; tracing disabled");
        }
        sink
    }

    pub fn from_writer(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    /// Write to our own duplicate of an inherited descriptor, leaving the
    /// original open for its owner.
    fn from_descriptor(fd: i32) -> Option<Self> {
        if fd < 0 {
            return None;
        }
        // SAFETY: dup on an arbitrary integer is harmless; failure returns -1.
        let owned = unsafe { libc::dup(fd) };
        if owned < 0 {
            return None;
        }
        // SAFETY: `owned` is a fresh descriptor that nothing else refers to.
        Some(Self::from_writer(unsafe { File::from_raw_fd(owned) }))
    }

    /// Emit one line.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }
}
