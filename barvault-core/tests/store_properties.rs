//! Property tests for the bar store's ordering and deduplication
//! invariants.

use proptest::prelude::*;

use barvault_core::{dataset_fingerprint, Bar, BarStore, Resolution};

const HOUR: i64 = 3_600_000;

fn bar(ts: i64, close: f64) -> Bar {
    Bar {
        instrument: "PROP-USD".into(),
        resolution: Resolution::Hour1,
        timestamp_ms: ts,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1.0,
    }
}

/// Arbitrary batch: hour-slot timestamps (with possible duplicates), in
/// arbitrary order, with distinguishable close prices.
fn arb_batch() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((0i64..200, 2.0f64..1_000.0), 1..40)
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(slot, close)| bar(slot * HOUR, close))
                .collect()
        })
}

proptest! {
    /// Any batch (unsorted, with intra-batch duplicate timestamps) reads
    /// back strictly ascending with the last submitted value per timestamp.
    #[test]
    fn append_reads_back_sorted_and_deduplicated(batch in arb_batch()) {
        let dir = tempfile::tempdir().unwrap();
        let store = BarStore::open(dir.path()).unwrap();
        store.append("PROP-USD", Resolution::Hour1, batch.clone()).unwrap();

        let loaded = store.read("PROP-USD", Resolution::Hour1, None, None).unwrap();

        // Strictly ascending: sorted, no duplicates
        for pair in loaded.windows(2) {
            prop_assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
        }

        // Last value wins per timestamp
        for bar in &loaded {
            let expected = batch
                .iter()
                .rev()
                .find(|b| b.timestamp_ms == bar.timestamp_ms)
                .unwrap();
            prop_assert_eq!(bar.close, expected.close);
        }

        // Every submitted timestamp is represented
        let mut submitted: Vec<i64> = batch.iter().map(|b| b.timestamp_ms).collect();
        submitted.sort_unstable();
        submitted.dedup();
        let stored: Vec<i64> = loaded.iter().map(|b| b.timestamp_ms).collect();
        prop_assert_eq!(stored, submitted);
    }

    /// The reported content hash matches a recomputed fingerprint of the
    /// stored series, and is stable across reads.
    #[test]
    fn content_hash_matches_stored_series(batch in arb_batch()) {
        let dir = tempfile::tempdir().unwrap();
        let store = BarStore::open(dir.path()).unwrap();
        let report = store.append("PROP-USD", Resolution::Hour1, batch).unwrap();

        let loaded = store.read("PROP-USD", Resolution::Hour1, None, None).unwrap();
        prop_assert_eq!(report.content_hash, dataset_fingerprint(&loaded));
    }
}
