//! Bar store — durable, append-biased OHLCV storage with Hive-style
//! partitioning.
//!
//! Layout: `{root}/instrument={INSTRUMENT}/resolution={RES}/{year}.parquet`
//! plus a `meta.json` sidecar per series.
//!
//! Features:
//! - Atomic partition writes (write to .tmp, rename into place)
//! - Merge-on-append: batches are sorted, validated, and deduplicated
//!   against the existing series (last writer wins per timestamp)
//! - Metadata sidecar per series (bar count, range, content hash)
//! - Per-series locking: appends to one series serialize, unrelated series
//!   never contend

mod parquet;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::{Bar, DatasetFingerprint, Resolution};
use crate::fingerprint::dataset_fingerprint;

/// Structured error types for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("parquet error at {}: {message}", .path.display())]
    Parquet { path: PathBuf, message: String },

    #[error("no series for instrument '{instrument}' at resolution {resolution}")]
    NoSeries {
        instrument: String,
        resolution: Resolution,
    },
}

/// Metadata sidecar for a stored series.
///
/// Immutable for a given exact bar set; rewritten on every successful
/// append, recomputed lazily if the sidecar is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub instrument: String,
    pub resolution: Resolution,
    pub bar_count: usize,
    pub start_timestamp_ms: i64,
    pub end_timestamp_ms: i64,
    pub content_hash: DatasetFingerprint,
    /// Cumulative count of exact-timestamp collisions resolved at append
    /// time. The stored series itself is strictly increasing, so this is
    /// the only record that collisions happened.
    pub duplicate_collisions: u64,
    pub written_at: chrono::NaiveDateTime,
}

/// A bar rejected by validation, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedBar {
    pub bar: Bar,
    pub reason: String,
}

/// Outcome of an append: what was written, what was replaced, what was
/// rejected and why, and the series' new content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendReport {
    pub written: usize,
    /// Exact-timestamp collisions resolved in this append (last writer wins).
    pub replaced: u64,
    pub rejected: Vec<RejectedBar>,
    /// Content hash of the series after this append. Cache entries derived
    /// from the previous hash become unreachable by fingerprint.
    pub content_hash: DatasetFingerprint,
}

type SeriesKey = (String, Resolution);

/// The bar store.
pub struct BarStore {
    root: PathBuf,
    locks: Mutex<HashMap<SeriesKey, Arc<Mutex<()>>>>,
}

impl BarStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io {
            path: root.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn series_dir(&self, instrument: &str, resolution: Resolution) -> PathBuf {
        self.root
            .join(format!("instrument={instrument}"))
            .join(format!("resolution={resolution}"))
    }

    fn year_path(&self, instrument: &str, resolution: Resolution, year: i32) -> PathBuf {
        self.series_dir(instrument, resolution)
            .join(format!("{year}.parquet"))
    }

    fn meta_path(&self, instrument: &str, resolution: Resolution) -> PathBuf {
        self.series_dir(instrument, resolution).join("meta.json")
    }

    fn series_lock(&self, instrument: &str, resolution: Resolution) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry((instrument.to_string(), resolution))
            .or_default()
            .clone()
    }

    /// Append a batch of bars to a series.
    ///
    /// The batch may be unsorted and may contain duplicate timestamps, both
    /// intra-batch and against the stored series; the most recently
    /// submitted value wins and each collision is counted. Bars failing
    /// validation are reported with reasons, never silently dropped, and
    /// never abort the rest of the batch.
    pub fn append(
        &self,
        instrument: &str,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<AppendReport, StoreError> {
        let mut valid = Vec::with_capacity(bars.len());
        let mut rejected = Vec::new();
        for bar in bars {
            match bar.validate_for_series(instrument, resolution) {
                Ok(()) if DateTime::from_timestamp_millis(bar.timestamp_ms).is_none() => {
                    rejected.push(RejectedBar {
                        reason: format!(
                            "timestamp {} outside representable range",
                            bar.timestamp_ms
                        ),
                        bar,
                    });
                }
                Ok(()) => valid.push(bar),
                Err(defect) => rejected.push(RejectedBar {
                    reason: defect.to_string(),
                    bar,
                }),
            }
        }

        let lock = self.series_lock(instrument, resolution);
        let _guard = lock.lock().unwrap();

        if valid.is_empty() {
            // Validation failures are data, not control flow: report them
            // with the unchanged series hash.
            let content_hash = match self.read_meta(instrument, resolution) {
                Some(meta) => meta.content_hash,
                None => dataset_fingerprint(&self.load_series(instrument, resolution)?),
            };
            return Ok(AppendReport {
                written: 0,
                replaced: 0,
                rejected,
                content_hash,
            });
        }

        let existing = self.load_series(instrument, resolution)?;
        let prior_collisions = self
            .read_meta(instrument, resolution)
            .map(|m| m.duplicate_collisions)
            .unwrap_or(0);

        let mut merged: BTreeMap<i64, Bar> =
            existing.into_iter().map(|b| (b.timestamp_ms, b)).collect();
        let written = valid.len();
        let mut replaced: u64 = 0;
        let mut touched_years: BTreeSet<i32> = BTreeSet::new();
        for bar in valid {
            // DateTime conversion was checked during validation
            if let Some(dt) = DateTime::from_timestamp_millis(bar.timestamp_ms) {
                touched_years.insert(dt.year());
            }
            if merged.insert(bar.timestamp_ms, bar).is_some() {
                replaced += 1;
            }
        }

        let sorted: Vec<Bar> = merged.into_values().collect();

        let sym_dir = self.series_dir(instrument, resolution);
        fs::create_dir_all(&sym_dir).map_err(|e| StoreError::Io {
            path: sym_dir.clone(),
            message: e.to_string(),
        })?;

        // Rewrite only the year partitions this batch touched
        let mut by_year: BTreeMap<i32, Vec<&Bar>> = BTreeMap::new();
        for bar in &sorted {
            if let Some(dt) = DateTime::from_timestamp_millis(bar.timestamp_ms) {
                by_year.entry(dt.year()).or_default().push(bar);
            }
        }
        for year in &touched_years {
            let year_bars = by_year.get(year).map(Vec::as_slice).unwrap_or(&[]);
            let path = self.year_path(instrument, resolution, *year);
            parquet::write_partition(year_bars, &path)?;
        }

        let content_hash = dataset_fingerprint(&sorted);
        let meta = SeriesMeta {
            instrument: instrument.to_string(),
            resolution,
            bar_count: sorted.len(),
            start_timestamp_ms: sorted.first().map(|b| b.timestamp_ms).unwrap_or(0),
            end_timestamp_ms: sorted.last().map(|b| b.timestamp_ms).unwrap_or(0),
            content_hash: content_hash.clone(),
            duplicate_collisions: prior_collisions + replaced,
            written_at: Utc::now().naive_utc(),
        };
        self.write_meta(&meta)?;

        Ok(AppendReport {
            written,
            replaced,
            rejected,
            content_hash,
        })
    }

    /// Read the bar subsequence within an inclusive timestamp range,
    /// ascending. Defaults to the entire series; an unknown series reads as
    /// empty.
    pub fn read(
        &self,
        instrument: &str,
        resolution: Resolution,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Bar>, StoreError> {
        let lock = self.series_lock(instrument, resolution);
        let _guard = lock.lock().unwrap();

        let mut bars = self.load_series_range(instrument, resolution, from, to)?;
        if let Some(from) = from {
            bars.retain(|b| b.timestamp_ms >= from);
        }
        if let Some(to) = to {
            bars.retain(|b| b.timestamp_ms <= to);
        }
        Ok(bars)
    }

    /// Current metadata for a series.
    ///
    /// Served from the sidecar when present; otherwise recomputed from the
    /// stored bars and written back. Errors with `NoSeries` for an unknown
    /// series.
    pub fn metadata(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<SeriesMeta, StoreError> {
        let lock = self.series_lock(instrument, resolution);
        let _guard = lock.lock().unwrap();

        if !self.series_dir(instrument, resolution).exists() {
            return Err(StoreError::NoSeries {
                instrument: instrument.to_string(),
                resolution,
            });
        }
        if let Some(meta) = self.read_meta(instrument, resolution) {
            return Ok(meta);
        }

        // Sidecar missing or unreadable: recompute from the bars
        let bars = self.load_series(instrument, resolution)?;
        let meta = SeriesMeta {
            instrument: instrument.to_string(),
            resolution,
            bar_count: bars.len(),
            start_timestamp_ms: bars.first().map(|b| b.timestamp_ms).unwrap_or(0),
            end_timestamp_ms: bars.last().map(|b| b.timestamp_ms).unwrap_or(0),
            content_hash: dataset_fingerprint(&bars),
            duplicate_collisions: 0,
            written_at: Utc::now().naive_utc(),
        };
        self.write_meta(&meta)?;
        Ok(meta)
    }

    /// All stored (instrument, resolution) series keys.
    pub fn list_series(&self) -> Result<Vec<SeriesKey>, StoreError> {
        let mut keys = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    message: e.to_string(),
                })
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(instrument) = name.strip_prefix("instrument=") else {
                continue;
            };
            let Ok(sub) = fs::read_dir(entry.path()) else {
                continue;
            };
            for res_entry in sub.flatten() {
                let res_name = res_entry.file_name().to_string_lossy().to_string();
                if let Some(res) = res_name.strip_prefix("resolution=") {
                    if let Ok(resolution) = res.parse::<Resolution>() {
                        keys.push((instrument.to_string(), resolution));
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    // ── Internals (callers hold the series lock) ──────────────────────

    fn load_series(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<Vec<Bar>, StoreError> {
        self.load_series_range(instrument, resolution, None, None)
    }

    /// Load partitions, pruning whole years outside the requested range.
    fn load_series_range(
        &self,
        instrument: &str,
        resolution: Resolution,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Bar>, StoreError> {
        let dir = self.series_dir(instrument, resolution);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let from_year = from
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.year());
        let to_year = to
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.year());

        let entries = fs::read_dir(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            message: e.to_string(),
        })?;

        let mut years: Vec<i32> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(year) = stem.parse::<i32>() else {
                continue;
            };
            if from_year.is_some_and(|fy| year < fy) || to_year.is_some_and(|ty| year > ty) {
                continue;
            }
            years.push(year);
        }
        years.sort_unstable();

        let mut bars = Vec::new();
        for year in years {
            let path = self.year_path(instrument, resolution, year);
            bars.extend(parquet::read_partition(&path, instrument, resolution)?);
        }
        bars.sort_by_key(|b| b.timestamp_ms);
        Ok(bars)
    }

    fn read_meta(&self, instrument: &str, resolution: Resolution) -> Option<SeriesMeta> {
        let content = fs::read_to_string(self.meta_path(instrument, resolution)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_meta(&self, meta: &SeriesMeta) -> Result<(), StoreError> {
        let path = self.meta_path(&meta.instrument, meta.resolution);
        let json = serde_json::to_string_pretty(meta).map_err(|e| StoreError::Io {
            path: path.clone(),
            message: format!("meta serialization: {e}"),
        })?;
        fs::write(&path, json).map_err(|e| StoreError::Io {
            path,
            message: e.to_string(),
        })
    }
}
