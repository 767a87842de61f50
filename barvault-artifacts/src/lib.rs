//! BarVault Artifacts — fingerprint-keyed computation cache and ranking.
//!
//! This crate builds on `barvault-core` to provide:
//! - Artifact cache with single-flight computation per key
//! - Backtest metric and recommendation payload types
//! - Composite strategy ranking with rank-normalized weighting
//! - The `Vault` facade: the synchronous surface external collaborators use
//! - TOML configuration loading

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod ranking;
pub mod service;

pub use aggregator::{BacktestRunner, Candidate, RankingAggregator};
pub use cache::{ArtifactCache, CacheEntry, CacheError};
pub use config::{ConfigError, VaultConfig};
pub use metrics::{BacktestArtifact, BacktestMetrics, RecommendationArtifact, RecommendedAction};
pub use ranking::{
    compute_composite_scores, rank_artifacts, rank_normalize, RankedStrategy, RankingEntry,
    RankingWeights,
};
pub use service::{Vault, VaultError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn cache_is_send_sync() {
        assert_send::<ArtifactCache>();
        assert_sync::<ArtifactCache>();
        assert_send::<CacheEntry>();
        assert_sync::<CacheEntry>();
        assert_send::<CacheError>();
        assert_sync::<CacheError>();
    }

    #[test]
    fn vault_is_send_sync() {
        assert_send::<Vault>();
        assert_sync::<Vault>();
        assert_send::<VaultError>();
        assert_sync::<VaultError>();
    }

    #[test]
    fn ranking_types_are_send_sync() {
        assert_send::<RankingEntry>();
        assert_sync::<RankingEntry>();
        assert_send::<RankingWeights>();
        assert_sync::<RankingWeights>();
        assert_send::<Candidate>();
        assert_sync::<Candidate>();
    }

    #[test]
    fn artifact_types_are_send_sync() {
        assert_send::<BacktestArtifact>();
        assert_sync::<BacktestArtifact>();
        assert_send::<RecommendationArtifact>();
        assert_sync::<RecommendationArtifact>();
    }
}
