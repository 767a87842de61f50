//! Bar resolution — the fixed width of one OHLCV observation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported bar widths.
///
/// The canonical string form (`1m`, `1h`, ...) is used in partition paths
/// and CLI arguments, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Resolution {
    /// Expected interval between consecutive bars, in milliseconds.
    pub fn cadence_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Self::Minute1 => MINUTE,
            Self::Minute5 => 5 * MINUTE,
            Self::Minute15 => 15 * MINUTE,
            Self::Minute30 => 30 * MINUTE,
            Self::Hour1 => 60 * MINUTE,
            Self::Hour4 => 4 * 60 * MINUTE,
            Self::Day1 => 24 * 60 * MINUTE,
        }
    }

    /// Canonical string form, stable across releases.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute1 => "1m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// All supported resolutions, smallest cadence first.
    pub fn all() -> &'static [Resolution] {
        &[
            Self::Minute1,
            Self::Minute5,
            Self::Minute15,
            Self::Minute30,
            Self::Hour1,
            Self::Hour4,
            Self::Day1,
        ]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resolution '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d)")]
pub struct ParseResolutionError(pub String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseResolutionError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_is_monotonic() {
        let all = Resolution::all();
        for pair in all.windows(2) {
            assert!(pair[0].cadence_ms() < pair[1].cadence_ms());
        }
    }

    #[test]
    fn parse_roundtrip() {
        for r in Resolution::all() {
            assert_eq!(r.as_str().parse::<Resolution>().unwrap(), *r);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("2h".parse::<Resolution>().is_err());
    }

    #[test]
    fn serde_uses_canonical_form() {
        let json = serde_json::to_string(&Resolution::Hour1).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: Resolution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Resolution::Hour1);
    }

    #[test]
    fn hourly_cadence() {
        assert_eq!(Resolution::Hour1.cadence_ms(), 3_600_000);
    }
}
