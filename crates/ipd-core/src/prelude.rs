//! Convenient re-exports for downstream crates.

pub use crate::config::{
    LimitConfig, TraceTarget, ENV_PEAK, ENV_PEAK_LEGACY, ENV_TOTAL, ENV_TOTAL_LEGACY, ENV_TRACE,
    EXIT_BAD_CONFIG,
};
pub use crate::error::{Error, Result};
pub use crate::size::{parse_byte_size, SizeError};
