//! Integrity auditing — gap, duplicate, and OHLC-invariant detection over a
//! bar series.
//!
//! The auditor is pure and side-effect-free: identical input always yields
//! an identical report. That matters because audit results participate in
//! cache-eligibility decisions upstream.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Resolution};

/// Tunable audit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Slack added to the expected cadence before a gap is counted, in
    /// milliseconds. Absorbs exchange downtime edge effects.
    pub gap_tolerance_ms: i64,
    /// Penalty weight for gaps.
    pub gap_weight: f64,
    /// Penalty weight for duplicate timestamps.
    pub duplicate_weight: f64,
    /// Penalty weight for invalid (OHLC-violating) bars.
    pub invalid_weight: f64,
    /// Minimum quality score for a series to be considered healthy.
    pub min_quality: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_ms: 0,
            gap_weight: 0.5,
            duplicate_weight: 0.3,
            invalid_weight: 0.2,
            min_quality: 0.95,
        }
    }
}

/// Result of auditing a series.
///
/// Ephemeral: recomputed on demand; a persisted copy is advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_healthy: bool,
    pub total_bars: usize,
    pub gap_count: u64,
    pub duplicate_count: u64,
    pub invalid_count: u64,
    /// 1.0 = clean and complete; 0.0 = unusable.
    pub quality_score: f64,
}

/// Audit an ascending bar sequence against its resolution cadence.
pub fn audit(bars: &[Bar], resolution: Resolution, config: &AuditConfig) -> IntegrityReport {
    audit_with_collisions(bars, resolution, config, 0)
}

/// Audit, folding in duplicate collisions known from outside the sequence.
///
/// A stored series is strictly increasing, so exact-timestamp collisions
/// resolved at append time (last writer wins) are invisible to a pure walk;
/// the store records them and passes the count here.
pub fn audit_with_collisions(
    bars: &[Bar],
    resolution: Resolution,
    config: &AuditConfig,
    known_duplicates: u64,
) -> IntegrityReport {
    let cadence = resolution.cadence_ms();
    let mut gap_count: u64 = 0;
    let mut duplicate_count: u64 = known_duplicates;
    let mut invalid_count: u64 = 0;

    for bar in bars {
        if bar.validate().is_err() {
            invalid_count += 1;
        }
    }

    for pair in bars.windows(2) {
        let actual = pair[1].timestamp_ms - pair[0].timestamp_ms;
        if actual <= 0 {
            // Zero or negative on an already-sorted input: duplicate
            duplicate_count += 1;
        } else if actual > cadence + config.gap_tolerance_ms {
            // Number of expected bar slots skipped over by this delta
            gap_count += ((actual - config.gap_tolerance_ms - 1) / cadence) as u64;
        }
    }

    let total_bars = bars.len();
    let expected_bars = total_bars as f64 + gap_count as f64;

    let gap_ratio = if expected_bars > 0.0 {
        gap_count as f64 / expected_bars
    } else {
        0.0
    };
    let duplicate_ratio = if total_bars > 0 {
        duplicate_count as f64 / total_bars as f64
    } else {
        0.0
    };
    let invalid_ratio = if total_bars > 0 {
        invalid_count as f64 / total_bars as f64
    } else {
        0.0
    };

    let penalty = config.gap_weight * gap_ratio
        + config.duplicate_weight * duplicate_ratio
        + config.invalid_weight * invalid_ratio;
    let quality_score = (1.0 - penalty).clamp(0.0, 1.0);

    IntegrityReport {
        is_healthy: quality_score >= config.min_quality && invalid_count == 0,
        total_bars,
        gap_count,
        duplicate_count,
        invalid_count,
        quality_score,
    }
}
