//! Ranking aggregator — resolves one backtest artifact per candidate
//! through the cache and folds them into a composite ranking.
//!
//! The backtest math itself is an injected capability (`BacktestRunner`);
//! the aggregator owns candidate resolution, exclusion accounting, and the
//! caching of the aggregate result under its own fingerprint.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use barvault_core::audit::{audit, AuditConfig};
use barvault_core::domain::{ArtifactKind, Bar, CacheKey, DatasetFingerprint, Resolution};
use barvault_core::fingerprint::{dataset_fingerprint, ParameterSet};
use barvault_core::store::{BarStore, StoreError};

use crate::cache::{ArtifactCache, CacheError};
use crate::metrics::BacktestArtifact;
use crate::ranking::{rank_artifacts, RankingEntry, RankingWeights};
use crate::service::VaultError;

/// One (strategy, resolution) pair to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub strategy_id: String,
    pub resolution: Resolution,
}

impl Candidate {
    pub fn new(strategy_id: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            resolution,
        }
    }
}

/// The injected backtest capability.
///
/// Implementations receive the bar range and canonical parameters and
/// return a typed artifact; the aggregator never inspects how the result
/// was produced.
pub trait BacktestRunner: Send + Sync {
    fn run(
        &self,
        instrument: &str,
        resolution: Resolution,
        bars: &[Bar],
        params: &ParameterSet,
    ) -> anyhow::Result<BacktestArtifact>;
}

/// Aggregates per-candidate backtest artifacts into a ranking.
pub struct RankingAggregator<'a> {
    store: &'a BarStore,
    cache: &'a ArtifactCache,
    audit_config: &'a AuditConfig,
    require_healthy: bool,
}

impl<'a> RankingAggregator<'a> {
    pub fn new(
        store: &'a BarStore,
        cache: &'a ArtifactCache,
        audit_config: &'a AuditConfig,
        require_healthy: bool,
    ) -> Self {
        Self {
            store,
            cache,
            audit_config,
            require_healthy,
        }
    }

    /// Rank `candidates` for an instrument on a date.
    ///
    /// The aggregate result is cached under its own key (dataset side from
    /// the contributing series' content hashes, parameter side from the
    /// date, candidate set, and weight vector), so repeated requests for
    /// the same inputs are cheap.
    pub fn rank(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidates: &[Candidate],
        weights: &RankingWeights,
        runner: &dyn BacktestRunner,
        ttl: Option<Duration>,
    ) -> Result<RankingEntry, VaultError> {
        let ranking_key = self.ranking_key(instrument, date, candidates, weights)?;
        self.cache
            .get_or_compute(&ranking_key, ttl, || {
                self.compute_ranking(instrument, date, candidates, weights, runner, ttl)
                    .map_err(anyhow::Error::from)
            })
            .map_err(VaultError::from)
    }

    fn compute_ranking(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidates: &[Candidate],
        weights: &RankingWeights,
        runner: &dyn BacktestRunner,
        ttl: Option<Duration>,
    ) -> Result<RankingEntry, VaultError> {
        let started = Instant::now();

        // Resolve every candidate in parallel; a candidate whose backtest
        // fails or reports unusable output is excluded from scoring but
        // stays in the totals. Storage faults abort the whole ranking.
        let resolved: Vec<Option<(Resolution, BacktestArtifact)>> = candidates
            .par_iter()
            .map(|candidate| {
                match self.resolve_backtest(instrument, date, candidate, runner, ttl) {
                    Ok(artifact) if artifact.is_rankable() => {
                        Ok(Some((candidate.resolution, artifact)))
                    }
                    Ok(_) => Ok(None),
                    Err(VaultError::Cache(CacheError::Computation { .. }))
                    | Err(VaultError::UnhealthySeries { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .collect::<Result<_, VaultError>>()?;

        let rankable: Vec<(Resolution, BacktestArtifact)> =
            resolved.into_iter().flatten().collect();
        let valid_candidates = rankable.len();
        let entries = rank_artifacts(&rankable, weights);

        Ok(RankingEntry {
            instrument: instrument.to_string(),
            date,
            best_strategy: entries.first().map(|e| e.strategy_id.clone()),
            best_score: entries.first().map(|e| e.composite_score),
            entries,
            total_candidates: candidates.len(),
            valid_candidates,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Resolve one candidate's backtest artifact through the cache.
    fn resolve_backtest(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidate: &Candidate,
        runner: &dyn BacktestRunner,
        ttl: Option<Duration>,
    ) -> Result<BacktestArtifact, VaultError> {
        let bars = self
            .store
            .read(instrument, candidate.resolution, None, None)?;

        let report = audit(&bars, candidate.resolution, self.audit_config);
        if self.require_healthy && !report.is_healthy {
            return Err(VaultError::UnhealthySeries {
                instrument: instrument.to_string(),
                resolution: candidate.resolution,
                report,
            });
        }

        let params = ParameterSet::new()
            .text("strategy_id", candidate.strategy_id.clone())
            .text("resolution", candidate.resolution.as_str())
            .text("date", date.to_string());
        let key = CacheKey::new(
            dataset_fingerprint(&bars),
            params.fingerprint()?,
            ArtifactKind::Backtest,
        );

        self.cache
            .get_or_compute(&key, ttl, || {
                runner.run(instrument, candidate.resolution, &bars, &params)
            })
            .map_err(VaultError::from)
    }

    /// The ranking's own cache key.
    fn ranking_key(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidates: &[Candidate],
        weights: &RankingWeights,
    ) -> Result<CacheKey, VaultError> {
        // Dataset side: content hashes of every contributing series, so any
        // append to any of them makes the old ranking unreachable.
        let mut resolutions: Vec<Resolution> =
            candidates.iter().map(|c| c.resolution).collect();
        resolutions.sort_unstable();
        resolutions.dedup();

        let mut dataset_input = String::new();
        for resolution in resolutions {
            let content_hash = match self.store.metadata(instrument, resolution) {
                Ok(meta) => meta.content_hash,
                Err(StoreError::NoSeries { .. }) => dataset_fingerprint(&[]),
                Err(e) => return Err(e.into()),
            };
            let _ = writeln!(dataset_input, "{resolution}={content_hash}");
        }
        let dataset = DatasetFingerprint::from_bytes(dataset_input.as_bytes());

        // Parameter side: date + candidate set + weight vector
        let mut candidate_tags: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}@{}", c.strategy_id, c.resolution))
            .collect();
        candidate_tags.sort_unstable();

        let params = ParameterSet::new()
            .text("instrument", instrument)
            .text("date", date.to_string())
            .text("candidates", candidate_tags.join(","))
            .number("w_sharpe", weights.sharpe)
            .number("w_win_rate", weights.win_rate)
            .number("w_profit_factor", weights.profit_factor)
            .number("w_max_drawdown", weights.max_drawdown)
            .number("w_cagr", weights.cagr);

        Ok(CacheKey::new(
            dataset,
            params.fingerprint()?,
            ArtifactKind::Ranking,
        ))
    }
}
