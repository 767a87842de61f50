//! Parquet conversion helpers for the bar store.

use polars::prelude::*;
use std::fs;
use std::path::Path;

use crate::domain::{Bar, Resolution};
use crate::store::StoreError;

/// Convert bars to a DataFrame with the on-disk column layout.
fn bars_to_dataframe(bars: &[&Bar]) -> Result<DataFrame, PolarsError> {
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp_ms).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp_ms".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
}

/// Write one partition file atomically: write to `.tmp`, rename into place.
pub(crate) fn write_partition(bars: &[&Bar], path: &Path) -> Result<(), StoreError> {
    let df = bars_to_dataframe(bars).map_err(|e| StoreError::Parquet {
        path: path.to_path_buf(),
        message: format!("dataframe creation: {e}"),
    })?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path).map_err(|e| StoreError::Io {
        path: tmp_path.clone(),
        message: e.to_string(),
    })?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet {
            path: tmp_path.clone(),
            message: format!("write: {e}"),
        })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Io {
            path: path.to_path_buf(),
            message: format!("atomic rename failed: {e}"),
        }
    })
}

/// Load one partition file back into bars for the given series key.
///
/// Corrupt or schema-mismatched files surface as `StoreError::Parquet` with
/// the path, never silently repaired or skipped.
pub(crate) fn read_partition(
    path: &Path,
    instrument: &str,
    resolution: Resolution,
) -> Result<Vec<Bar>, StoreError> {
    let parquet_err = |message: String| StoreError::Parquet {
        path: path.to_path_buf(),
        message,
    };

    let file = fs::File::open(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| parquet_err(format!("read: {e}")))?;

    for col_name in ["timestamp_ms", "open", "high", "low", "close", "volume"] {
        if df.column(col_name).is_err() {
            return Err(parquet_err(format!("missing column '{col_name}'")));
        }
    }

    let col_err = |e: PolarsError| parquet_err(format!("column read: {e}"));
    let ts_ca = df
        .column("timestamp_ms")
        .map_err(col_err)?
        .i64()
        .map_err(|e| parquet_err(format!("timestamp_ms column type: {e}")))?;
    let open_ca = df
        .column("open")
        .map_err(col_err)?
        .f64()
        .map_err(|e| parquet_err(format!("open column type: {e}")))?;
    let high_ca = df
        .column("high")
        .map_err(col_err)?
        .f64()
        .map_err(|e| parquet_err(format!("high column type: {e}")))?;
    let low_ca = df
        .column("low")
        .map_err(col_err)?
        .f64()
        .map_err(|e| parquet_err(format!("low column type: {e}")))?;
    let close_ca = df
        .column("close")
        .map_err(col_err)?
        .f64()
        .map_err(|e| parquet_err(format!("close column type: {e}")))?;
    let vol_ca = df
        .column("volume")
        .map_err(col_err)?
        .f64()
        .map_err(|e| parquet_err(format!("volume column type: {e}")))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let timestamp_ms = ts_ca
            .get(i)
            .ok_or_else(|| parquet_err(format!("null timestamp at row {i}")))?;
        bars.push(Bar {
            instrument: instrument.to_string(),
            resolution,
            timestamp_ms,
            open: open_ca
                .get(i)
                .ok_or_else(|| parquet_err(format!("null open at row {i}")))?,
            high: high_ca
                .get(i)
                .ok_or_else(|| parquet_err(format!("null high at row {i}")))?,
            low: low_ca
                .get(i)
                .ok_or_else(|| parquet_err(format!("null low at row {i}")))?,
            close: close_ca
                .get(i)
                .ok_or_else(|| parquet_err(format!("null close at row {i}")))?,
            volume: vol_ca
                .get(i)
                .ok_or_else(|| parquet_err(format!("null volume at row {i}")))?,
        });
    }
    Ok(bars)
}
