//! Limiter and trace configuration resolved from the environment.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::size::parse_byte_size;

/// Cap on cumulative bytes ever requested.
pub const ENV_TOTAL: &str = "RTIPD_ALLOC_LIMIT_TOTAL";
/// Cap on bytes outstanding at once.
pub const ENV_PEAK: &str = "RTIPD_ALLOC_LIMIT_PEAK";
/// Deprecated spelling of [`ENV_TOTAL`].
pub const ENV_TOTAL_LEGACY: &str = "RTIPD_ALLOC_LIMIT";
/// Deprecated spelling of [`ENV_PEAK`].
pub const ENV_PEAK_LEGACY: &str = "RTIPD_HEAP_LIMIT";
/// Destination for allocation trace lines.
pub const ENV_TRACE: &str = "RTIPD_TRACE";

/// Exit status used when a limit variable cannot be parsed.
pub const EXIT_BAD_CONFIG: i32 = 254;

/// Lookup order. Total beats peak; each primary name beats its alias.
const LIMIT_VARIABLES: [(&str, LimitKind); 4] = [
    (ENV_TOTAL, LimitKind::Total),
    (ENV_TOTAL_LEGACY, LimitKind::Total),
    (ENV_PEAK, LimitKind::Peak),
    (ENV_PEAK_LEGACY, LimitKind::Peak),
];

#[derive(Clone, Copy)]
enum LimitKind {
    Total,
    Peak,
}

/// How the allocation limiter should enforce its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitConfig {
    /// Allocations are only bounded by real system memory.
    NoLimit,
    /// At most this many bytes may be requested over the lifetime of the
    /// configuration. Releases never restore budget.
    Total(usize),
    /// At most this many bytes may be live at any instant.
    Peak(usize),
}

impl Default for LimitConfig {
    fn default() -> Self {
        LimitConfig::NoLimit
    }
}

impl LimitConfig {
    /// Resolve the limit from the process environment.
    ///
    /// Environment variables (first one set wins):
    /// - `RTIPD_ALLOC_LIMIT_TOTAL`
    /// - `RTIPD_ALLOC_LIMIT` (deprecated)
    /// - `RTIPD_ALLOC_LIMIT_PEAK`
    /// - `RTIPD_HEAP_LIMIT` (deprecated)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Same as [`LimitConfig::from_env`], but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        for (name, kind) in LIMIT_VARIABLES {
            let Some(raw) = lookup(name) else {
                continue;
            };
            let Some(bytes) = parse_limit(name, &raw)? else {
                continue;
            };
            return Ok(match kind {
                LimitKind::Total => LimitConfig::Total(bytes),
                LimitKind::Peak => LimitConfig::Peak(bytes),
            });
        }
        Ok(LimitConfig::NoLimit)
    }

    /// Budget in bytes, or `None` for [`LimitConfig::NoLimit`].
    pub fn budget(&self) -> Option<usize> {
        match *self {
            LimitConfig::NoLimit => None,
            LimitConfig::Total(n) | LimitConfig::Peak(n) => Some(n),
        }
    }
}

/// Deprecated limit variables present in the environment seen by `lookup`.
pub fn deprecated_variables_set<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<OsString>,
{
    [ENV_TOTAL_LEGACY, ENV_PEAK_LEGACY]
        .into_iter()
        .filter(|name| lookup(name).is_some())
        .collect()
}

fn parse_limit(name: &'static str, raw: &OsStr) -> Result<Option<usize>> {
    let bad = |cause| Error::BadLimit {
        name,
        value: raw.to_string_lossy().into_owned(),
        cause,
    };
    match raw.to_str() {
        Some(text) => parse_byte_size(text).map_err(bad),
        None => Err(bad(crate::size::SizeError::NoDigits)),
    }
}

/// Where allocation trace lines go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceTarget {
    Disabled,
    /// An already-open descriptor inherited from the parent (`&<digits>`).
    Descriptor(i32),
    /// A file created or truncated on first use.
    Path(PathBuf),
}

impl Default for TraceTarget {
    fn default() -> Self {
        TraceTarget::Disabled
    }
}

impl TraceTarget {
    /// Read `RTIPD_TRACE`.
    pub fn from_env() -> Self {
        Self::parse(std::env::var_os(ENV_TRACE).as_deref())
    }

    pub fn parse(value: Option<&OsStr>) -> Self {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return TraceTarget::Disabled;
        };

        if let Some(digits) = value
            .to_str()
            .and_then(|s| s.strip_prefix('&'))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        {
            // Out-of-range descriptor numbers disable tracing.
            return match digits.parse::<i32>() {
                Ok(fd) => TraceTarget::Descriptor(fd),
                Err(_) => TraceTarget::Disabled,
            };
        }

        TraceTarget::Path(PathBuf::from(value))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TraceTarget::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_unset_means_no_limit() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[])).unwrap();
        assert_eq!(cfg, LimitConfig::NoLimit);
        assert_eq!(cfg.budget(), None);
    }

    #[test]
    fn test_total_beats_peak() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[
            (ENV_PEAK, "1k"),
            (ENV_TOTAL, "2k"),
        ]))
        .unwrap();
        assert_eq!(cfg, LimitConfig::Total(2048));
    }

    #[test]
    fn test_legacy_total_beats_peak() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[
            (ENV_PEAK, "1k"),
            (ENV_TOTAL_LEGACY, "300"),
        ]))
        .unwrap();
        assert_eq!(cfg, LimitConfig::Total(300));
    }

    #[test]
    fn test_primary_name_beats_alias() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[
            (ENV_PEAK_LEGACY, "5"),
            (ENV_PEAK, "7"),
        ]))
        .unwrap();
        assert_eq!(cfg, LimitConfig::Peak(7));
    }

    #[test]
    fn test_legacy_peak_alias_is_honored() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[(ENV_PEAK_LEGACY, "4M")])).unwrap();
        assert_eq!(cfg, LimitConfig::Peak(4 << 20));
        assert_eq!(
            deprecated_variables_set(lookup_in(&[(ENV_PEAK_LEGACY, "4M")])),
            vec![ENV_PEAK_LEGACY]
        );
    }

    #[test]
    fn test_blank_primary_falls_through_to_alias() {
        let cfg = LimitConfig::from_lookup(lookup_in(&[
            (ENV_TOTAL, "   "),
            (ENV_TOTAL_LEGACY, "10"),
        ]))
        .unwrap();
        assert_eq!(cfg, LimitConfig::Total(10));
    }

    #[test]
    fn test_malformed_value_names_variable() {
        let err = LimitConfig::from_lookup(lookup_in(&[(ENV_PEAK, "12q")])).unwrap_err();
        assert_eq!(err.variable(), ENV_PEAK);
        assert_eq!(
            err.to_string(),
            "could not understand RTIPD_ALLOC_LIMIT_PEAK value: ‘12q’"
        );
    }

    #[test]
    fn test_malformed_total_reported_even_if_peak_valid() {
        let err = LimitConfig::from_lookup(lookup_in(&[
            (ENV_TOTAL, "nope"),
            (ENV_PEAK, "10"),
        ]))
        .unwrap_err();
        assert_eq!(err.variable(), ENV_TOTAL);
    }

    #[test]
    fn test_trace_target_parsing() {
        assert_eq!(TraceTarget::parse(None), TraceTarget::Disabled);
        assert_eq!(TraceTarget::parse(Some(OsStr::new(""))), TraceTarget::Disabled);
        assert_eq!(
            TraceTarget::parse(Some(OsStr::new("&2"))),
            TraceTarget::Descriptor(2)
        );
        assert_eq!(
            TraceTarget::parse(Some(OsStr::new("&"))),
            TraceTarget::Path(PathBuf::from("&"))
        );
        assert_eq!(
            TraceTarget::parse(Some(OsStr::new("&99999999999"))),
            TraceTarget::Disabled
        );
        assert_eq!(
            TraceTarget::parse(Some(OsStr::new("&x1"))),
            TraceTarget::Path(PathBuf::from("&x1"))
        );
        assert_eq!(
            TraceTarget::parse(Some(OsStr::new("/tmp/alloc.log"))),
            TraceTarget::Path(PathBuf::from("/tmp/alloc.log"))
        );
    }
}
