//! Vault — the synchronous facade external collaborators call.
//!
//! HTTP layers, dashboards, and notifiers consume this surface and never
//! touch storage or cache internals directly. Everything here is explicit,
//! constructed state, no process-wide singletons.

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

use barvault_core::audit::{audit_with_collisions, AuditConfig, IntegrityReport};
use barvault_core::domain::{ArtifactKind, Bar, CacheKey, Resolution};
use barvault_core::fingerprint::{dataset_fingerprint, FingerprintError, ParameterSet};
use barvault_core::store::{AppendReport, BarStore, StoreError};

use crate::aggregator::{BacktestRunner, Candidate, RankingAggregator};
use crate::cache::{ArtifactCache, CacheError};
use crate::config::VaultConfig;
use crate::ranking::{RankingEntry, RankingWeights};

/// Errors crossing the facade boundary.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(
        "series {instrument}/{resolution} failed the health gate \
         (quality {:.3}, {} gaps, {} duplicates, {} invalid bars)",
        .report.quality_score,
        .report.gap_count,
        .report.duplicate_count,
        .report.invalid_count
    )]
    UnhealthySeries {
        instrument: String,
        resolution: Resolution,
        report: IntegrityReport,
    },
}

/// The deterministic store + cache pair behind one handle.
pub struct Vault {
    store: BarStore,
    cache: ArtifactCache,
    audit_config: AuditConfig,
    require_healthy: bool,
    default_ttl: Option<Duration>,
}

impl Vault {
    /// Open a vault from configuration, creating directories as needed.
    pub fn open(config: &VaultConfig) -> Result<Self, VaultError> {
        Ok(Self {
            store: BarStore::open(&config.data_dir)?,
            cache: ArtifactCache::open(&config.cache_dir)?,
            audit_config: config.audit.clone(),
            require_healthy: config.require_healthy,
            default_ttl: config.default_ttl_secs.map(Duration::from_secs),
        })
    }

    /// Underlying bar store, for callers that only need bars.
    pub fn store(&self) -> &BarStore {
        &self.store
    }

    /// Underlying artifact cache.
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Append a batch of bars. Validation failures come back in the report.
    pub fn append_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<AppendReport, VaultError> {
        Ok(self.store.append(instrument, resolution, bars)?)
    }

    /// Read bars within an optional inclusive range, ascending.
    pub fn read_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Bar>, VaultError> {
        Ok(self.store.read(instrument, resolution, from, to)?)
    }

    /// Audit a stored series.
    ///
    /// Folds in the collision count the store recorded at append time, so
    /// exact-timestamp replacements remain visible even though the stored
    /// series is strictly increasing.
    pub fn audit_series(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<IntegrityReport, VaultError> {
        let bars = self.store.read(instrument, resolution, None, None)?;
        let collisions = match self.store.metadata(instrument, resolution) {
            Ok(meta) => meta.duplicate_collisions,
            Err(StoreError::NoSeries { .. }) => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(audit_with_collisions(
            &bars,
            resolution,
            &self.audit_config,
            collisions,
        ))
    }

    /// Fetch or compute a derived artifact for a series.
    ///
    /// Reads the series, audits it, derives the (dataset, parameter)
    /// fingerprint pair, and delegates to the cache's single-flight
    /// protocol. With the health gate enabled, an unhealthy series fails
    /// before anything is computed or cached.
    pub fn get_or_compute_artifact<T, F>(
        &self,
        instrument: &str,
        resolution: Resolution,
        kind: ArtifactKind,
        params: &ParameterSet,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, VaultError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce(&[Bar], &ParameterSet) -> anyhow::Result<T>,
    {
        let bars = self.store.read(instrument, resolution, None, None)?;

        let report = audit_with_collisions(&bars, resolution, &self.audit_config, 0);
        if self.require_healthy && !report.is_healthy {
            return Err(VaultError::UnhealthySeries {
                instrument: instrument.to_string(),
                resolution,
                report,
            });
        }

        let key = CacheKey::new(dataset_fingerprint(&bars), params.fingerprint()?, kind);
        let ttl = ttl.or(self.default_ttl);
        Ok(self
            .cache
            .get_or_compute(&key, ttl, || compute(&bars, params))?)
    }

    /// Rank candidate strategies for an instrument on a date.
    pub fn rank(
        &self,
        instrument: &str,
        date: NaiveDate,
        candidates: &[Candidate],
        weights: &RankingWeights,
        runner: &dyn BacktestRunner,
        ttl: Option<Duration>,
    ) -> Result<RankingEntry, VaultError> {
        let aggregator = RankingAggregator::new(
            &self.store,
            &self.cache,
            &self.audit_config,
            self.require_healthy,
        );
        aggregator.rank(
            instrument,
            date,
            candidates,
            weights,
            runner,
            ttl.or(self.default_ttl),
        )
    }

    /// Remove expired cache entries; returns the count removed.
    pub fn sweep_expired(&self) -> Result<usize, VaultError> {
        Ok(self.cache.sweep_expired()?)
    }
}
