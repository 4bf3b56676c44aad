#![forbid(unsafe_code)]
//! ipd-core: configuration and shared types for the ipd instrumentation crates.
//!
//! Nothing in here touches the heap shim or spawns processes. Downstream crates
//! (`ipd-alloc`, `ipd-exec`) build on the typed configuration resolved here.

pub mod config;
pub mod error;
pub mod prelude;
pub mod size;

pub use config::{LimitConfig, TraceTarget};
pub use error::{Error, Result};
pub use size::{parse_byte_size, SizeError};
