//! BarVault Core — domain types, bar store, integrity auditing,
//! fingerprinting.
//!
//! This crate contains the deterministic foundation of the system:
//! - Domain types (bars, resolutions, fingerprints, cache keys)
//! - Parquet-backed bar store with per-series merge-on-append
//! - Pure integrity auditor (gaps, duplicates, OHLC violations)
//! - Content fingerprinting for bar series and parameter sets

pub mod audit;
pub mod domain;
pub mod fingerprint;
pub mod store;

pub use audit::{audit, audit_with_collisions, AuditConfig, IntegrityReport};
pub use domain::{
    ArtifactKind, Bar, BarDefect, CacheKey, DatasetFingerprint, ParamFingerprint, Resolution,
};
pub use fingerprint::{dataset_fingerprint, FingerprintError, ParamValue, ParameterSet};
pub use store::{AppendReport, BarStore, RejectedBar, SeriesMeta, StoreError};
