//! First-use configuration from the environment.

use ipd_core::config::{LimitConfig, EXIT_BAD_CONFIG};

/// Resolve the limit variables, or end the process.
///
/// A malformed limit is a setup mistake, not a condition the program under
/// test can handle, so this prints the offending variable and exits with
/// [`EXIT_BAD_CONFIG`] without touching any limiter state.
pub fn limits_from_env_or_exit() -> LimitConfig {
    match LimitConfig::from_env() {
        Ok(config) => {
            #[cfg(feature = "tracing")]
            {
                for name in
                    ipd_core::config::deprecated_variables_set(|name| std::env::var_os(name))
                {
                    tracing::warn!(variable = name, "deprecated allocation limit variable");
                }
                tracing::debug!(?config, "allocation limit resolved from environment");
            }
            config
        }
        Err(err) => {
            eprintln!("rtipd_alloc: {err}");
            std::process::exit(EXIT_BAD_CONFIG)
        }
    }
}
