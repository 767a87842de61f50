//! Artifact payload types: backtest metrics and recommendations.
//!
//! These are the typed shapes the ranking aggregator consumes. The cache
//! itself never looks inside them.

use serde::{Deserialize, Serialize};

/// Comparable performance metrics extracted from a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub sharpe: f64,
    /// Fraction of winning trades, 0.0–1.0.
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Negative fraction (e.g. -0.15 = a 15% drawdown); less negative is
    /// less severe.
    pub max_drawdown: f64,
    /// Compound annual growth rate as a fraction.
    pub cagr: f64,
}

/// The backtest artifact the ranking aggregator consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestArtifact {
    pub strategy_id: String,
    pub metrics: BacktestMetrics,
    pub trade_count: usize,
    /// False when the backtest itself flagged its result as unusable.
    pub valid: bool,
}

impl BacktestArtifact {
    /// A candidate is rankable only if the backtest produced trades and
    /// passed its own validation.
    pub fn is_rankable(&self) -> bool {
        self.valid && self.trade_count > 0
    }
}

/// A trading recommendation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationArtifact {
    pub strategy_id: String,
    pub action: RecommendedAction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// 0.0–1.0 confidence assigned by the strategy.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Buy,
    Sell,
    Hold,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(trade_count: usize, valid: bool) -> BacktestArtifact {
        BacktestArtifact {
            strategy_id: "donchian".into(),
            metrics: BacktestMetrics {
                sharpe: 1.5,
                win_rate: 0.6,
                profit_factor: 1.8,
                max_drawdown: -0.12,
                cagr: 0.15,
            },
            trade_count,
            valid,
        }
    }

    #[test]
    fn rankable_requires_trades_and_validity() {
        assert!(artifact(10, true).is_rankable());
        assert!(!artifact(0, true).is_rankable());
        assert!(!artifact(10, false).is_rankable());
    }

    #[test]
    fn backtest_artifact_serialization_roundtrip() {
        let a = artifact(10, true);
        let json = serde_json::to_string(&a).unwrap();
        let back: BacktestArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn recommendation_serialization_roundtrip() {
        let rec = RecommendationArtifact {
            strategy_id: "donchian".into(),
            action: RecommendedAction::Buy,
            entry_price: 101.5,
            stop_price: 98.0,
            target_price: 110.0,
            confidence: 0.7,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: RecommendationArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
