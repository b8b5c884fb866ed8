//! Human-readable durations for artifacts.
//!
//! Durations are written the way `"1h2m3.5s"`, `"1.234ms"` or `"250ns"` read: the
//! largest fitting unit below one second, `h`/`m`/`s` components above it, and every
//! significant digit down to the nanosecond. Formatting is lossless, so parsing a
//! formatted value yields the same `Duration`.

use std::fmt::Write;
use std::time::Duration;

use crate::error::{DxError, DxResult};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

pub fn format(d: Duration) -> String {
    let nanos = d.as_nanos();
    match nanos {
        0 => "0s".to_string(),
        n if n < NANOS_PER_MICRO => format!("{}ns", n),
        n if n < NANOS_PER_MILLI => decimal(n / NANOS_PER_MICRO, n % NANOS_PER_MICRO, 3, "µs"),
        n if n < NANOS_PER_SEC => decimal(n / NANOS_PER_MILLI, n % NANOS_PER_MILLI, 6, "ms"),
        n => {
            let secs = n / NANOS_PER_SEC;
            let hours = secs / 3600;
            let minutes = (secs / 60) % 60;
            let mut out = String::new();
            if hours > 0 {
                let _ = write!(out, "{}h", hours);
            }
            if hours > 0 || minutes > 0 {
                let _ = write!(out, "{}m", minutes);
            }
            out.push_str(&decimal(secs % 60, n % NANOS_PER_SEC, 9, "s"));
            out
        }
    }
}

fn decimal(whole: u128, frac: u128, digits: usize, unit: &str) -> String {
    if frac == 0 {
        return format!("{}{}", whole, unit);
    }
    let frac = format!("{:0width$}", frac, width = digits);
    format!("{}.{}{}", whole, frac.trim_end_matches('0'), unit)
}

/// Parse a duration string such as `"1.5s"`, `"2m30s"` or `"800us"`.
///
/// A bare integer is taken as nanoseconds.
pub fn parse(input: &str) -> DxResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid(input));
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let nanos: u64 = s.parse().map_err(|_| invalid(input))?;
        return Ok(Duration::from_nanos(nanos));
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let (int_part, tail) = rest.split_at(int_len);
        let (frac_part, tail) = match tail.strip_prefix('.') {
            Some(after) => {
                let frac_len = after.bytes().take_while(|b| b.is_ascii_digit()).count();
                after.split_at(frac_len)
            }
            None => ("", tail),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(input));
        }

        let unit_len = tail
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = unit_nanos(unit).ok_or_else(|| invalid(input))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid(input))?
        };
        total = total
            .checked_add(whole.checked_mul(scale).ok_or_else(|| invalid(input))?)
            .ok_or_else(|| invalid(input))?;

        if !frac_part.is_empty() {
            // anything past nanosecond precision is dropped
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid(input))?;
            total += frac * scale / 10u128.pow(digits.len() as u32);
        }
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid(input))?;
    Ok(Duration::from_nanos(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

fn invalid(input: &str) -> DxError {
    DxError::Artifact(format!("invalid duration '{}'", input))
}

/// `#[serde(with = "crate::duration::as_text")]` support: writes the string form,
/// reads either a duration string or integer nanoseconds.
pub mod as_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Nanos(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Nanos(n) => Ok(Duration::from_nanos(n)),
            Repr::Text(s) => super::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format(Duration::ZERO), "0s");
        assert_eq!(format(Duration::from_nanos(250)), "250ns");
        assert_eq!(format(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format(Duration::from_micros(1_234)), "1.234ms");
        assert_eq!(format(Duration::from_nanos(1_234_567)), "1.234567ms");
        assert_eq!(format(Duration::from_secs(1)), "1s");
        assert_eq!(format(Duration::from_millis(1_250)), "1.25s");
        assert_eq!(format(Duration::from_secs(90)), "1m30s");
        assert_eq!(format(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format(Duration::from_nanos(3_723_000_000_001)), "1h2m3.000000001s");
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse("1.234ms").unwrap(), Duration::from_micros(1_234));
        assert_eq!(parse("800us").unwrap(), Duration::from_micros(800));
        assert_eq!(parse("1.5µs").unwrap(), Duration::from_nanos(1_500));
        assert_eq!(parse("2m30s").unwrap(), Duration::from_secs(150));
        assert_eq!(parse("1h0m0s").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse("1500").unwrap(), Duration::from_nanos(1_500));
    }

    #[test]
    fn test_round_trip_is_exact() {
        for nanos in [
            0u64,
            1,
            999,
            1_000,
            1_001,
            123_456_789,
            999_999_999,
            1_000_000_001,
            59_999_999_999,
            86_400_000_000_007,
        ] {
            let d = Duration::from_nanos(nanos);
            assert_eq!(parse(&format(d)).unwrap(), d, "round trip of {}", nanos);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "ms", "1.2.3s", "5 parsecs", "1x", "-1s", "."] {
            assert!(parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_serde_accepts_nanos_and_text() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Timed {
            #[serde(with = "as_text")]
            time: Duration,
        }

        let v: Timed = serde_json::from_str(r#"{"time":"1.234ms"}"#).unwrap();
        assert_eq!(v.time, Duration::from_micros(1_234));
        let v: Timed = serde_json::from_str(r#"{"time":1234000}"#).unwrap();
        assert_eq!(v.time, Duration::from_micros(1_234));
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"time":"1.234ms"}"#);
    }
}
