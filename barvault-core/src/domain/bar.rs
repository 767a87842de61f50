//! Bar — the fundamental market data unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::resolution::Resolution;

/// OHLCV bar for a single instrument at a fixed resolution.
///
/// Timestamps are UTC epoch milliseconds. Bars of a stored series are
/// strictly increasing by timestamp; a duplicate timestamp is a data-quality
/// defect, not a valid state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument: String,
    pub resolution: Resolution,
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Why a bar failed validation.
///
/// Defects are reported to the caller alongside the offending bar; a bar is
/// never silently corrected or dropped without a reason.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarDefect {
    #[error("{field} is not finite")]
    NonFinite { field: &'static str },

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: f64 },

    #[error("volume must be non-negative, got {0}")]
    NegativeVolume(f64),

    #[error("low {low} above body min {body_min}")]
    LowAboveBody { low: f64, body_min: f64 },

    #[error("high {high} below body max {body_max}")]
    HighBelowBody { high: f64, body_max: f64 },

    #[error("high {high} below low {low}")]
    HighBelowLow { high: f64, low: f64 },

    #[error("bar is for instrument '{actual}', series is '{expected}'")]
    InstrumentMismatch { expected: String, actual: String },

    #[error("bar is at resolution {actual}, series is {expected}")]
    ResolutionMismatch {
        expected: Resolution,
        actual: Resolution,
    },
}

impl Bar {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Validate the OHLC invariant and field ranges.
    ///
    /// Invariant: `low <= min(open, close)` and `high >= max(open, close)`,
    /// all prices positive and finite, volume non-negative.
    pub fn validate(&self) -> Result<(), BarDefect> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarDefect::NonFinite { field });
            }
        }
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if value <= 0.0 {
                return Err(BarDefect::NonPositivePrice { field, value });
            }
        }
        if self.volume < 0.0 {
            return Err(BarDefect::NegativeVolume(self.volume));
        }
        if self.high < self.low {
            return Err(BarDefect::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        let body_min = self.open.min(self.close);
        let body_max = self.open.max(self.close);
        if self.low > body_min {
            return Err(BarDefect::LowAboveBody {
                low: self.low,
                body_min,
            });
        }
        if self.high < body_max {
            return Err(BarDefect::HighBelowBody {
                high: self.high,
                body_max,
            });
        }
        Ok(())
    }

    /// Validate against the series key a batch is being appended to.
    pub fn validate_for_series(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<(), BarDefect> {
        if self.instrument != instrument {
            return Err(BarDefect::InstrumentMismatch {
                expected: instrument.to_string(),
                actual: self.instrument.clone(),
            });
        }
        if self.resolution != resolution {
            return Err(BarDefect::ResolutionMismatch {
                expected: resolution,
                actual: self.resolution,
            });
        }
        self.validate()
    }
}
