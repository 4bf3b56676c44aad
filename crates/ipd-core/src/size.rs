//! Byte-size values as written in limit environment variables.
//!
//! Grammar: `[ws] digits [ws] [b|k|m|g] [ws]`, suffix case-insensitive,
//! meaning ×1, ×2^10, ×2^20, ×2^30. No suffix means bytes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    #[error("expected decimal digits")]
    NoDigits,

    #[error("unknown size suffix '{0}'")]
    UnknownSuffix(char),

    #[error("unexpected input after size: '{0}'")]
    TrailingInput(String),

    #[error("size does not fit in usize")]
    Overflow,
}

/// Parse a byte size.
///
/// Returns `Ok(None)` when the value is empty or only whitespace, which callers
/// treat the same as an unset variable.
pub fn parse_byte_size(raw: &str) -> Result<Option<usize>, SizeError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if digits_end == 0 {
        return Err(SizeError::NoDigits);
    }

    let count: usize = text[..digits_end]
        .parse()
        .map_err(|_| SizeError::Overflow)?;

    let rest = text[digits_end..].trim_start();
    let mut chars = rest.chars();
    let shift = match chars.next() {
        None | Some('b') | Some('B') => 0,
        Some('k') | Some('K') => 10,
        Some('m') | Some('M') => 20,
        Some('g') | Some('G') => 30,
        Some(other) => return Err(SizeError::UnknownSuffix(other)),
    };

    let tail = chars.as_str();
    if !tail.is_empty() {
        return Err(SizeError::TrailingInput(tail.to_string()));
    }

    count
        .checked_mul(1usize << shift)
        .map(Some)
        .ok_or(SizeError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_suffixed_sizes() {
        assert_eq!(parse_byte_size("0"), Ok(Some(0)));
        assert_eq!(parse_byte_size("1024"), Ok(Some(1024)));
        assert_eq!(parse_byte_size("12b"), Ok(Some(12)));
        assert_eq!(parse_byte_size("3K"), Ok(Some(3 << 10)));
        assert_eq!(parse_byte_size("2m"), Ok(Some(2 << 20)));
        assert_eq!(parse_byte_size("1G"), Ok(Some(1 << 30)));
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        assert_eq!(parse_byte_size("  64k \n"), Ok(Some(64 << 10)));
        assert_eq!(parse_byte_size("\t10 M"), Ok(Some(10 << 20)));
    }

    #[test]
    fn test_blank_counts_as_unset() {
        assert_eq!(parse_byte_size(""), Ok(None));
        assert_eq!(parse_byte_size("   "), Ok(None));
    }

    #[test]
    fn test_malformed_values() {
        assert_eq!(parse_byte_size("lots"), Err(SizeError::NoDigits));
        assert_eq!(parse_byte_size("-1"), Err(SizeError::NoDigits));
        assert_eq!(parse_byte_size("10x"), Err(SizeError::UnknownSuffix('x')));
        assert_eq!(
            parse_byte_size("10kb"),
            Err(SizeError::TrailingInput("b".to_string()))
        );
        assert_eq!(
            parse_byte_size("1.5G"),
            Err(SizeError::UnknownSuffix('.'))
        );
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(
            parse_byte_size("99999999999999999999999999"),
            Err(SizeError::Overflow)
        );
        let huge = format!("{}g", usize::MAX);
        assert_eq!(parse_byte_size(&huge), Err(SizeError::Overflow));
    }
}
