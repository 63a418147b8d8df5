//! Durations in the Alertmanager configuration syntax.
//!
//! The daemon accepts durations such as `30s`, `5m`, `1d` or `1h30m`: a
//! concatenation of `<integer><unit>` terms with units in strictly
//! decreasing order (`y`, `w`, `d`, `h`, `m`, `s`, `ms`). The bare string
//! `0` is also accepted.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Units from largest to smallest.
const UNITS: [(&str, u64); 7] = [
    ("y", 365 * MS_PER_DAY),
    ("w", 7 * MS_PER_DAY),
    ("d", MS_PER_DAY),
    ("h", MS_PER_HOUR),
    ("m", MS_PER_MINUTE),
    ("s", MS_PER_SECOND),
    ("ms", 1),
];

/// A millisecond-precision duration that parses and renders in the daemon's syntax.
///
/// Rendering is canonical: `90m` renders as `1h30m`, `24h` as `1d`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromDuration {
    millis: u64,
}

impl PromDuration {
    /// Creates a duration from a millisecond count.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Creates a duration from a second count.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            millis: secs * MS_PER_SECOND,
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Converts to a [`std::time::Duration`].
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

impl FromStr for PromDuration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| ConfigError::malformed(format!("invalid duration '{s}': {why}"));

        if s == "0" {
            return Ok(Self::default());
        }
        if s.is_empty() {
            return Err(invalid("empty string"));
        }

        let mut rest = s;
        let mut last_unit: Option<usize> = None;
        let mut total: u64 = 0;

        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| invalid("missing unit"))?;
            if digits_end == 0 {
                return Err(invalid("expected a number"));
            }
            let value: u64 = rest[..digits_end]
                .parse()
                .map_err(|_| invalid("number out of range"))?;

            let after = &rest[digits_end..];
            let unit_end = after
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(after.len());
            let unit = &after[..unit_end];
            let idx = UNITS
                .iter()
                .position(|(u, _)| *u == unit)
                .ok_or_else(|| invalid("unknown unit"))?;

            if last_unit.is_some_and(|last| idx <= last) {
                return Err(invalid("units must appear once, largest first"));
            }

            total = value
                .checked_mul(UNITS[idx].1)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| invalid("overflow"))?;

            last_unit = Some(idx);
            rest = &after[unit_end..];
        }

        Ok(Self { millis: total })
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis == 0 {
            return write!(f, "0s");
        }

        let mut remaining = self.millis;
        for (unit, mult) in UNITS {
            let count = remaining / mult;
            if count > 0 {
                write!(f, "{count}{unit}")?;
                remaining %= mult;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for PromDuration {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PromDuration> for String {
    fn from(value: PromDuration) -> Self {
        value.to_string()
    }
}

impl From<Duration> for PromDuration {
    fn from(value: Duration) -> Self {
        Self {
            millis: u64::try_from(value.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
