use lazy_static::lazy_static;
use std::env;

/// Environment variable through which tcmalloc is told its heap sampling interval.
pub const SAMPLE_PARAMETER_ENV: &str = "TCMALLOC_SAMPLE_PARAMETER";

lazy_static! {
    static ref SAMPLE_PARAMETER_CONFIGURED: bool = check_sample_parameter();
}

/// Returns `true` if `TCMALLOC_SAMPLE_PARAMETER` holds a positive integer.
///
/// The environment is read on the first call only; later changes to the variable are not seen.
pub fn has_sample_parameter() -> bool {
    *SAMPLE_PARAMETER_CONFIGURED
}

/// Reads and parses `TCMALLOC_SAMPLE_PARAMETER` without caching.
pub fn check_sample_parameter() -> bool {
    env::var_os(SAMPLE_PARAMETER_ENV)
        .and_then(|value| value.to_str().map(parse_sample_parameter))
        .unwrap_or(false)
}

/// Returns `true` if `value` is a base-10 integer greater than zero.
///
/// Mirrors `int val = strtol(value, &end, 10)`: leading whitespace and a single `+` or `-` sign
/// are accepted, but the rest of the string must be made up entirely of digits. Out of range values
/// clamp to `i64::MAX`/`i64::MIN` and the result is then truncated to an `i32`, so e.g.
/// `"2147483648"` is not positive while `"4294967297"` is.
pub fn parse_sample_parameter(value: &str) -> bool {
    let value = value.trim_start_matches(is_c_space);
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let magnitude = digits.bytes().try_fold(0i64, |acc, b| {
        acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
    });
    let parsed = match (magnitude, negative) {
        (Some(m), false) => m,
        (Some(m), true) => -m,
        (None, false) => i64::MAX,
        (None, true) => i64::MIN,
    };

    (parsed as i32) > 0
}

/// Whitespace as defined by C's `isspace` in the "C" locale.
fn is_c_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn positive_values() {
        assert!(parse_sample_parameter("5"));
        assert!(parse_sample_parameter("007"));
        assert!(parse_sample_parameter("524288"));
        assert!(parse_sample_parameter("+1"));
        assert!(parse_sample_parameter(" \t42"));
        assert!(parse_sample_parameter("2147483647"));
    }

    #[test]
    fn non_positive_values() {
        assert!(!parse_sample_parameter("0"));
        assert!(!parse_sample_parameter("000"));
        assert!(!parse_sample_parameter("-3"));
        assert!(!parse_sample_parameter("-0"));
    }

    #[test]
    fn out_of_range_values_truncate_to_i32() {
        assert!(!parse_sample_parameter("2147483648"));
        assert!(!parse_sample_parameter("4294967296"));
        assert!(parse_sample_parameter("4294967297"));
        assert!(parse_sample_parameter("-4294967295"));
        // Clamped to `i64::MAX`, whose low 32 bits are `-1`.
        assert!(!parse_sample_parameter("99999999999999999999999999"));
        assert!(!parse_sample_parameter("-99999999999999999999999999"));
    }

    #[test]
    fn malformed_values() {
        assert!(!parse_sample_parameter(""));
        assert!(!parse_sample_parameter(" "));
        assert!(!parse_sample_parameter("+"));
        assert!(!parse_sample_parameter("-"));
        assert!(!parse_sample_parameter("12abc"));
        assert!(!parse_sample_parameter("abc"));
        assert!(!parse_sample_parameter("5 "));
        assert!(!parse_sample_parameter("1.5"));
        assert!(!parse_sample_parameter("0x10"));
        assert!(!parse_sample_parameter("++1"));
        assert!(!parse_sample_parameter("1_000"));
    }

    #[quickcheck]
    fn quickcheck_integers(n: i64) -> bool {
        parse_sample_parameter(&n.to_string()) == ((n as i32) > 0)
    }

    #[quickcheck]
    fn quickcheck_leading_zeros(n: u32, zeros: u8) -> bool {
        let value = format!("{}{}", "0".repeat(zeros as usize), n);
        parse_sample_parameter(&value) == ((n as i32) > 0)
    }

    #[quickcheck]
    fn quickcheck_trailing_garbage(n: u32, suffix: String) -> bool {
        match suffix.chars().next() {
            Some(c) if !c.is_ascii_digit() => !parse_sample_parameter(&format!("{n}{suffix}")),
            _ => true,
        }
    }

    #[quickcheck]
    fn quickcheck_agrees_with_integer_parse(value: String) -> bool {
        // `str::parse` rejects whitespace, so only compare strings without it.
        if value.starts_with(is_c_space) {
            return true;
        }
        match value.parse::<i128>() {
            Ok(n) => {
                let clamped = n.clamp(i64::MIN.into(), i64::MAX.into()) as i64;
                parse_sample_parameter(&value) == ((clamped as i32) > 0)
            }
            // Beyond `i128` the value clamps to `i64::MAX` or `i64::MIN`, neither positive as an
            // `i32`.
            Err(_) => !parse_sample_parameter(&value),
        }
    }
}
