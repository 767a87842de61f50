//! Composite strategy ranking — weighted metric aggregation with
//! rank-based normalization.
//!
//! Rank normalization: before applying weights, raw metric values are
//! replaced with their percentile rank (0.0 = worst, 1.0 = best) within the
//! candidate population, so metrics with different units contribute
//! proportionally. Caller weights need not sum to 1; they are normalized.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use barvault_core::domain::Resolution;

use crate::metrics::{BacktestArtifact, BacktestMetrics};

/// Weight vector over the comparable backtest metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub sharpe: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub cagr: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            sharpe: 1.0,
            win_rate: 1.0,
            profit_factor: 1.0,
            max_drawdown: 1.0,
            cagr: 1.0,
        }
    }
}

impl RankingWeights {
    /// Normalize so the weights sum to 1. A degenerate vector (zero or
    /// negative sum) falls back to equal weights.
    pub fn normalized(&self) -> Self {
        let sum =
            self.sharpe + self.win_rate + self.profit_factor + self.max_drawdown + self.cagr;
        if sum <= 0.0 || !sum.is_finite() {
            return Self {
                sharpe: 0.2,
                win_rate: 0.2,
                profit_factor: 0.2,
                max_drawdown: 0.2,
                cagr: 0.2,
            };
        }
        Self {
            sharpe: self.sharpe / sum,
            win_rate: self.win_rate / sum,
            profit_factor: self.profit_factor / sum,
            max_drawdown: self.max_drawdown / sum,
            cagr: self.cagr / sum,
        }
    }
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStrategy {
    pub strategy_id: String,
    pub resolution: Resolution,
    pub composite_score: f64,
    pub metrics: BacktestMetrics,
    pub trade_count: usize,
}

/// Ranking result for one (instrument, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub instrument: String,
    pub date: NaiveDate,
    /// Best first.
    pub entries: Vec<RankedStrategy>,
    pub best_strategy: Option<String>,
    pub best_score: Option<f64>,
    pub total_candidates: usize,
    pub valid_candidates: usize,
    /// Wall-clock time spent resolving and ranking the candidates.
    pub elapsed_ms: u64,
}

/// Compute composite scores for the given artifacts.
///
/// Returns one score per artifact, in input order. Higher is better. Each
/// metric dimension is rank-normalized within the population, then weighted
/// by the normalized weight vector.
pub fn compute_composite_scores(
    artifacts: &[&BacktestArtifact],
    weights: &RankingWeights,
) -> Vec<f64> {
    if artifacts.is_empty() {
        return Vec::new();
    }
    let w = weights.normalized();

    let sharpes: Vec<f64> = artifacts.iter().map(|a| a.metrics.sharpe).collect();
    let win_rates: Vec<f64> = artifacts.iter().map(|a| a.metrics.win_rate).collect();
    let profit_factors: Vec<f64> = artifacts.iter().map(|a| a.metrics.profit_factor).collect();
    // Drawdown is a negative fraction; higher (less negative) is better
    let drawdowns: Vec<f64> = artifacts.iter().map(|a| a.metrics.max_drawdown).collect();
    let cagrs: Vec<f64> = artifacts.iter().map(|a| a.metrics.cagr).collect();

    let r_sharpe = rank_normalize(&sharpes, true);
    let r_win = rank_normalize(&win_rates, true);
    let r_pf = rank_normalize(&profit_factors, true);
    let r_dd = rank_normalize(&drawdowns, true);
    let r_cagr = rank_normalize(&cagrs, true);

    (0..artifacts.len())
        .map(|i| {
            w.sharpe * r_sharpe[i]
                + w.win_rate * r_win[i]
                + w.profit_factor * r_pf[i]
                + w.max_drawdown * r_dd[i]
                + w.cagr * r_cagr[i]
        })
        .collect()
}

/// Rank the rankable artifacts, best first.
///
/// Ties on composite score break by higher sharpe, then by less severe
/// max drawdown.
pub fn rank_artifacts(
    artifacts: &[(Resolution, BacktestArtifact)],
    weights: &RankingWeights,
) -> Vec<RankedStrategy> {
    let refs: Vec<&BacktestArtifact> = artifacts.iter().map(|(_, a)| a).collect();
    let scores = compute_composite_scores(&refs, weights);

    let mut ranked: Vec<RankedStrategy> = artifacts
        .iter()
        .zip(scores)
        .map(|((resolution, artifact), composite_score)| RankedStrategy {
            strategy_id: artifact.strategy_id.clone(),
            resolution: *resolution,
            composite_score,
            metrics: artifact.metrics,
            trade_count: artifact.trade_count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.metrics
                    .sharpe
                    .partial_cmp(&a.metrics.sharpe)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                // Less severe drawdown (less negative) ranks higher
                b.metrics
                    .max_drawdown
                    .partial_cmp(&a.metrics.max_drawdown)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    ranked
}

/// Rank-normalize a vector of values to [0.0, 1.0].
///
/// Each value is replaced with its percentile rank within the population.
/// Tied values receive the average rank. If `higher_is_better` is false,
/// the ranks are inverted. Single-element vectors return [0.5].
pub fn rank_normalize(values: &[f64], higher_is_better: bool) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.5];
    }

    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    // Assign 1-based ranks, averaging ties
    let mut ranks = vec![0.0_f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && (indexed[j].1 - indexed[i].1).abs() < 1e-15 {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for idx in &indexed[i..j] {
            ranks[idx.0] = avg_rank;
        }
        i = j;
    }

    let max_rank = n as f64;
    let mut normalized: Vec<f64> = ranks.iter().map(|r| (r - 1.0) / (max_rank - 1.0)).collect();
    if !higher_is_better {
        for v in &mut normalized {
            *v = 1.0 - *v;
        }
    }
    normalized
}

// ─── Tests ───────────────────────────────────────────────────────────
