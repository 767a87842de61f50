//! Content fingerprinting — deterministic identity for bar series and
//! parameter sets.
//!
//! - `dataset_fingerprint`: order-sensitive hash over a bar series.
//! - `ParameterSet`: key-sorted, type-tagged parameter map with a canonical
//!   textual form.
//!
//! Determinism requirement: identical logical inputs must hash identically
//! across runs and platforms. Floating-point values are therefore rendered
//! at fixed precision before hashing, never hashed as raw bits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

use crate::domain::{Bar, DatasetFingerprint, ParamFingerprint};

/// Decimal places used when canonicalizing f64 values for hashing.
const CANONICAL_PRECISION: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FingerprintError {
    #[error("parameter '{key}' is not finite and cannot be canonicalized")]
    NonFiniteNumber { key: String },
}

/// Hash an ordered bar series.
///
/// Order-sensitive by construction: the same bars in a different order
/// produce a different fingerprint, because order is semantically
/// load-bearing for a time series.
pub fn dataset_fingerprint(bars: &[Bar]) -> DatasetFingerprint {
    let mut hasher = blake3::Hasher::new();
    let mut line = String::with_capacity(96);
    for bar in bars {
        line.clear();
        let _ = write!(
            line,
            "{};{:.p$};{:.p$};{:.p$};{:.p$};{:.p$}\n",
            bar.timestamp_ms,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            p = CANONICAL_PRECISION,
        );
        hasher.update(line.as_bytes());
    }
    DatasetFingerprint(hasher.finalize().to_hex().to_string())
}

/// A typed parameter value.
///
/// Numbers carry their canonical fixed-precision rendering; integers, text,
/// and flags are tagged so `1.0`, `1`, and `"1"` never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Flag(bool),
}

/// A computation's parameter set (strategy identifier, capital, risk
/// fraction, date range, ...), canonically ordered for hashing.
///
/// Uses `BTreeMap` for deterministic key ordering during serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set(key, ParamValue::Number(value));
        self
    }

    pub fn integer(mut self, key: impl Into<String>, value: i64) -> Self {
        self.set(key, ParamValue::Integer(value));
        self
    }

    pub fn text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, ParamValue::Text(value.into()));
        self
    }

    pub fn flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, ParamValue::Flag(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Canonical textual form: one `key=tag:value` line per entry, keys
    /// sorted, numbers at fixed precision.
    ///
    /// Fails for NaN/infinite numbers: those have no canonical rendering
    /// and would silently break fingerprint stability.
    pub fn canonical_string(&self) -> Result<String, FingerprintError> {
        let mut out = String::new();
        for (key, value) in &self.values {
            match value {
                ParamValue::Number(n) => {
                    if !n.is_finite() {
                        return Err(FingerprintError::NonFiniteNumber { key: key.clone() });
                    }
                    let _ = writeln!(out, "{key}=n:{n:.p$}", p = CANONICAL_PRECISION);
                }
                ParamValue::Integer(i) => {
                    let _ = writeln!(out, "{key}=i:{i}");
                }
                ParamValue::Text(s) => {
                    let _ = writeln!(out, "{key}=t:{s}");
                }
                ParamValue::Flag(b) => {
                    let _ = writeln!(out, "{key}=f:{b}");
                }
            }
        }
        Ok(out)
    }

    /// Hash of the canonical form.
    pub fn fingerprint(&self) -> Result<ParamFingerprint, FingerprintError> {
        Ok(ParamFingerprint::from_bytes(
            self.canonical_string()?.as_bytes(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Resolution;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar {
            instrument: "BTC-USD".into(),
            resolution: Resolution::Hour1,
            timestamp_ms: ts,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 10.0,
        }
    }

    fn sample_params() -> ParameterSet {
        ParameterSet::new()
            .text("strategy_id", "donchian_breakout")
            .number("capital", 100_000.0)
            .number("risk_pct", 0.02)
            .integer("atr_period", 14)
            .flag("long_only", true)
    }

    // ── Dataset fingerprints ──

    #[test]
    fn dataset_fingerprint_is_deterministic() {
        let bars = vec![bar(0, 100.0), bar(3_600_000, 101.0)];
        assert_eq!(dataset_fingerprint(&bars), dataset_fingerprint(&bars));
    }

    #[test]
    fn dataset_fingerprint_is_order_sensitive() {
        let a = vec![bar(0, 100.0), bar(3_600_000, 101.0)];
        let b = vec![bar(3_600_000, 101.0), bar(0, 100.0)];
        assert_ne!(dataset_fingerprint(&a), dataset_fingerprint(&b));
    }

    #[test]
    fn dataset_fingerprint_changes_with_content() {
        let a = vec![bar(0, 100.0)];
        let b = vec![bar(0, 100.5)];
        assert_ne!(dataset_fingerprint(&a), dataset_fingerprint(&b));
    }

    #[test]
    fn dataset_fingerprint_of_empty_series() {
        // Empty input still has a stable identity
        assert_eq!(dataset_fingerprint(&[]), dataset_fingerprint(&[]));
    }

    #[test]
    fn dataset_fingerprint_ignores_instrument_label() {
        // Identity is the ordered numeric content; the series key lives in
        // the store layout, not the hash.
        let mut a = vec![bar(0, 100.0)];
        let b = a.clone();
        a[0].instrument = "ETH-USD".into();
        assert_eq!(dataset_fingerprint(&a), dataset_fingerprint(&b));
    }

    // ── Parameter fingerprints ──

    #[test]
    fn params_hash_deterministically() {
        assert_eq!(
            sample_params().fingerprint().unwrap(),
            sample_params().fingerprint().unwrap()
        );
    }

    #[test]
    fn params_are_key_order_independent() {
        let a = ParameterSet::new()
            .number("alpha", 1.0)
            .number("beta", 2.0);
        let b = ParameterSet::new()
            .number("beta", 2.0)
            .number("alpha", 1.0);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn params_differ_by_value() {
        let a = sample_params();
        let b = sample_params().number("risk_pct", 0.03);
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn typed_values_never_collide() {
        let number = ParameterSet::new().number("x", 1.0);
        let integer = ParameterSet::new().integer("x", 1);
        let text = ParameterSet::new().text("x", "1");
        assert_ne!(number.fingerprint().unwrap(), integer.fingerprint().unwrap());
        assert_ne!(integer.fingerprint().unwrap(), text.fingerprint().unwrap());
    }

    #[test]
    fn non_finite_number_is_rejected() {
        let params = ParameterSet::new().number("risk_pct", f64::NAN);
        assert_eq!(
            params.fingerprint(),
            Err(FingerprintError::NonFiniteNumber {
                key: "risk_pct".into()
            })
        );
    }

    #[test]
    fn canonical_string_is_fixed_precision() {
        let params = ParameterSet::new().number("capital", 100_000.0);
        assert_eq!(
            params.canonical_string().unwrap(),
            "capital=n:100000.00000000\n"
        );
    }

    #[test]
    fn parameter_set_serialization_roundtrip() {
        let params = sample_params();
        let json = serde_json::to_string(&params).unwrap();
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
        assert_eq!(params.fingerprint().unwrap(), back.fingerprint().unwrap());
    }
}
