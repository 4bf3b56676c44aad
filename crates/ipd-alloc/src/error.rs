use thiserror::Error;

/// Result type local to ipd-alloc.
pub type Result<T> = std::result::Result<T, Error>;

/// Every variant is an out-of-memory condition from the caller's point of
/// view; the variants only say *why* memory was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("allocation of {requested} bytes refused: remaining limit is {remaining}")]
    OutOfMemory { requested: usize, remaining: usize },

    #[error("size overflow: {count} elements of {size} bytes")]
    SizeOverflow { count: usize, size: usize },

    #[error("system heap could not provide {bytes} bytes")]
    HeapExhausted { bytes: usize },
}

impl Error {
    /// True when the configured budget, not the system, refused the request.
    pub fn is_budget_refusal(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }

    /// The `errno` a C caller would observe for this failure.
    pub fn raw_os_error(&self) -> i32 {
        libc::ENOMEM
    }
}
