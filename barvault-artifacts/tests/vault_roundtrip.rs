//! End-to-end tests: append → audit → artifact → rank through the facade.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use barvault_artifacts::{
    BacktestArtifact, BacktestMetrics, BacktestRunner, Candidate, RankingWeights,
    RecommendationArtifact, RecommendedAction, Vault, VaultConfig, VaultError,
};
use barvault_core::fingerprint::{ParamValue, ParameterSet};
use barvault_core::{ArtifactKind, Bar, Resolution};

const HOUR: i64 = 3_600_000;

fn bar(ts: i64, close: f64) -> Bar {
    Bar {
        instrument: "BTC-USD".into(),
        resolution: Resolution::Hour1,
        timestamp_ms: ts,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 10.0,
    }
}

fn open_vault(require_healthy: bool) -> (tempfile::TempDir, Vault) {
    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig {
        data_dir: dir.path().join("bars"),
        cache_dir: dir.path().join("artifacts"),
        require_healthy,
        ..VaultConfig::default()
    };
    let vault = Vault::open(&config).unwrap();
    (dir, vault)
}

/// Deterministic stand-in for the strategy engine: metrics are keyed off
/// the strategy id, and every invocation is counted.
struct StubRunner {
    calls: AtomicUsize,
}

impl StubRunner {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl BacktestRunner for StubRunner {
    fn run(
        &self,
        _instrument: &str,
        _resolution: Resolution,
        _bars: &[Bar],
        params: &ParameterSet,
    ) -> anyhow::Result<BacktestArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let strategy_id = match params.get("strategy_id") {
            Some(ParamValue::Text(s)) => s.clone(),
            _ => anyhow::bail!("missing strategy_id parameter"),
        };
        let (sharpe, win_rate, trade_count) = match strategy_id.as_str() {
            "alpha" => (2.0, 0.6, 25),
            "beta" => (1.0, 0.8, 30),
            "gamma" => (0.5, 0.5, 0), // zero trades → excluded
            other => anyhow::bail!("unknown strategy '{other}'"),
        };
        Ok(BacktestArtifact {
            strategy_id,
            metrics: BacktestMetrics {
                sharpe,
                win_rate,
                profit_factor: 1.5,
                max_drawdown: -0.10,
                cagr: 0.12,
            },
            trade_count,
            valid: true,
        })
    }
}

// ── Bars ──

#[test]
fn append_read_audit_roundtrip() {
    let (_dir, vault) = open_vault(false);

    let report = vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(HOUR, 101.0), bar(2 * HOUR, 102.0)],
        )
        .unwrap();
    assert_eq!(report.written, 3);

    let bars = vault
        .read_bars("BTC-USD", Resolution::Hour1, None, None)
        .unwrap();
    assert_eq!(bars.len(), 3);

    let audit = vault.audit_series("BTC-USD", Resolution::Hour1).unwrap();
    assert_eq!(audit.quality_score, 1.0);
    assert!(audit.is_healthy);
}

#[test]
fn timestamp_replacement_shows_up_in_audit() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(HOUR, 101.0), bar(2 * HOUR, 102.0)],
        )
        .unwrap();

    // 4th bar at an existing timestamp replaces the original
    vault
        .append_bars("BTC-USD", Resolution::Hour1, vec![bar(HOUR, 555.0)])
        .unwrap();

    let bars = vault
        .read_bars("BTC-USD", Resolution::Hour1, None, None)
        .unwrap();
    assert_eq!(bars.len(), 3);
    assert_eq!(bars[1].close, 555.0);

    let audit = vault.audit_series("BTC-USD", Resolution::Hour1).unwrap();
    assert_eq!(audit.duplicate_count, 1);
}

// ── Artifacts ──

#[test]
fn artifact_is_computed_once_and_reused() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(HOUR, 101.0)],
        )
        .unwrap();

    let params = ParameterSet::new()
        .text("strategy_id", "alpha")
        .number("capital", 100_000.0);
    let calls = AtomicUsize::new(0);

    let compute = |_: &[Bar], _: &ParameterSet| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(RecommendationArtifact {
            strategy_id: "alpha".into(),
            action: RecommendedAction::Buy,
            entry_price: 101.5,
            stop_price: 98.0,
            target_price: 110.0,
            confidence: 0.7,
        })
    };

    let first: RecommendationArtifact = vault
        .get_or_compute_artifact(
            "BTC-USD",
            Resolution::Hour1,
            ArtifactKind::Recommendation,
            &params,
            None,
            compute,
        )
        .unwrap();
    let second: RecommendationArtifact = vault
        .get_or_compute_artifact(
            "BTC-USD",
            Resolution::Hour1,
            ArtifactKind::Recommendation,
            &params,
            None,
            |_: &[Bar], _: &ParameterSet| {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("must be served from cache")
            },
        )
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn append_invalidates_artifact_by_fingerprint() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars("BTC-USD", Resolution::Hour1, vec![bar(0, 100.0)])
        .unwrap();

    let params = ParameterSet::new().text("strategy_id", "alpha");
    let calls = AtomicUsize::new(0);
    let get = |expect_value: f64| -> f64 {
        vault
            .get_or_compute_artifact(
                "BTC-USD",
                Resolution::Hour1,
                ArtifactKind::Backtest,
                &params,
                None,
                |_: &[Bar], _: &ParameterSet| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(expect_value)
                },
            )
            .unwrap()
    };

    assert_eq!(get(1.0), 1.0);
    assert_eq!(get(2.0), 1.0); // cached: same dataset, same params

    // New data → new dataset fingerprint → the old entry is unreachable
    vault
        .append_bars("BTC-USD", Resolution::Hour1, vec![bar(HOUR, 101.0)])
        .unwrap();
    assert_eq!(get(3.0), 3.0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn health_gate_refuses_unhealthy_series() {
    let (_dir, vault) = open_vault(true);
    // Bars at 0h and 10h: nine missing hourly slots
    vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(10 * HOUR, 101.0)],
        )
        .unwrap();

    let params = ParameterSet::new().text("strategy_id", "alpha");
    let err = vault
        .get_or_compute_artifact::<f64, _>(
            "BTC-USD",
            Resolution::Hour1,
            ArtifactKind::Backtest,
            &params,
            None,
            |_, _| Ok(1.0),
        )
        .unwrap_err();

    match err {
        VaultError::UnhealthySeries { report, .. } => {
            assert_eq!(report.gap_count, 9);
            assert!(!report.is_healthy);
        }
        other => panic!("expected UnhealthySeries, got {other}"),
    }
}

// ── Ranking ──

#[test]
fn ranking_orders_excludes_and_counts() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(HOUR, 101.0), bar(2 * HOUR, 102.0)],
        )
        .unwrap();

    let runner = StubRunner::new();
    let candidates = vec![
        Candidate::new("alpha", Resolution::Hour1),
        Candidate::new("beta", Resolution::Hour1),
        Candidate::new("gamma", Resolution::Hour1),
    ];
    // Sharpe-dominant weights: alpha must outrank beta
    let weights = RankingWeights {
        sharpe: 3.0,
        win_rate: 1.0,
        profit_factor: 0.0,
        max_drawdown: 0.0,
        cagr: 0.0,
    };
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let entry = vault
        .rank("BTC-USD", date, &candidates, &weights, &runner, None)
        .unwrap();

    assert_eq!(entry.total_candidates, 3);
    assert_eq!(entry.valid_candidates, 2); // gamma had zero trades
    assert_eq!(entry.entries.len(), 2);
    assert_eq!(entry.entries[0].strategy_id, "alpha");
    assert_eq!(entry.entries[1].strategy_id, "beta");
    assert_eq!(entry.best_strategy.as_deref(), Some("alpha"));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn ranking_is_cached_until_data_changes() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars(
            "BTC-USD",
            Resolution::Hour1,
            vec![bar(0, 100.0), bar(HOUR, 101.0)],
        )
        .unwrap();

    let runner = StubRunner::new();
    let candidates = vec![
        Candidate::new("alpha", Resolution::Hour1),
        Candidate::new("beta", Resolution::Hour1),
    ];
    let weights = RankingWeights::default();
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let first = vault
        .rank("BTC-USD", date, &candidates, &weights, &runner, None)
        .unwrap();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);

    // Same inputs: served from the ranking cache, no backtests re-run
    let second = vault
        .rank("BTC-USD", date, &candidates, &weights, &runner, None)
        .unwrap();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(first, second);

    // Different weights → different ranking key, but per-candidate
    // backtests are still cached
    let other_weights = RankingWeights {
        sharpe: 2.0,
        ..RankingWeights::default()
    };
    vault
        .rank("BTC-USD", date, &candidates, &other_weights, &runner, None)
        .unwrap();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);

    // New data → everything recomputes
    vault
        .append_bars("BTC-USD", Resolution::Hour1, vec![bar(2 * HOUR, 102.0)])
        .unwrap();
    vault
        .rank("BTC-USD", date, &candidates, &weights, &runner, None)
        .unwrap();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
}

#[test]
fn ranking_with_no_valid_candidates_is_empty_but_counted() {
    let (_dir, vault) = open_vault(false);
    vault
        .append_bars("BTC-USD", Resolution::Hour1, vec![bar(0, 100.0)])
        .unwrap();

    let runner = StubRunner::new();
    let candidates = vec![Candidate::new("gamma", Resolution::Hour1)];
    let entry = vault
        .rank(
            "BTC-USD",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            &candidates,
            &RankingWeights::default(),
            &runner,
            None,
        )
        .unwrap();

    assert_eq!(entry.total_candidates, 1);
    assert_eq!(entry.valid_candidates, 0);
    assert!(entry.entries.is_empty());
    assert!(entry.best_strategy.is_none());
}
