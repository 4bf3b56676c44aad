use thiserror::Error;

use crate::size::SizeError;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A limit variable was set to something that is not a byte size.
    ///
    /// The display form is the exact diagnostic printed before the process
    /// exits with [`crate::config::EXIT_BAD_CONFIG`].
    #[error("could not understand {name} value: ‘{value}’")]
    BadLimit {
        name: &'static str,
        value: String,
        #[source]
        cause: SizeError,
    },
}

impl Error {
    /// Name of the environment variable that caused the error.
    pub fn variable(&self) -> &'static str {
        match self {
            Error::BadLimit { name, .. } => *name,
        }
    }
}
