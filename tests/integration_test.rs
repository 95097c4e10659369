//! End-to-end screening tests.
//!
//! Tests cover:
//! - Full scan pipeline over CSV data on disk (adapter -> run -> results)
//! - Preset strategies with parameter overrides against known data shapes
//! - Mixed universes: matches, misses, short histories, and missing files
//! - Market filtering through the directory index

mod common;

use common::*;
use sifter::adapters::csv_adapter::CsvDataAdapter;
use sifter::domain::presets;
use sifter::domain::program::Program;
use sifter::ports::bar_port::BarPort;
use sifter::domain::screen::{RunManager, RunStatus, SortField, SortOrder, StatusSnapshot, MIN_BARS};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_terminal(manager: &RunManager, id: u64) -> StatusSnapshot {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = manager.status(id).unwrap();
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "run did not finish in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

mod csv_pipeline {
    use super::*;

    #[test]
    fn scan_over_csv_directory_finds_breakouts() {
        let dir = tempfile::TempDir::new().unwrap();
        write_bar_csv(dir.path(), &make_breakout("600000", 40, 10.0, 20.0));
        write_bar_csv(dir.path(), &make_series("600001", &[10.0; 40]));
        write_bar_csv(dir.path(), &make_breakout("000001", 40, 8.0, 16.0));
        write_universe_csv(
            dir.path(),
            &[
                ("600000", "Pudong Dev", "SH"),
                ("600001", "Steady Co", "SH"),
                ("000001", "Ping An Bank", "SZ"),
            ],
        );

        let adapter = Arc::new(CsvDataAdapter::new(dir.path().to_path_buf()));
        let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);
        let program = Program::compile("MA5 := MA(CLOSE, 5); CLOSE > 1.5 * MA5;").unwrap();

        let id = manager.start_run(program, None, 120, MIN_BARS).unwrap();
        let snapshot = wait_terminal(&manager, id);

        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.matched, 2);

        let results = manager
            .results(id, SortField::Code, SortOrder::Ascending)
            .unwrap();
        let codes: Vec<_> = results.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["000001", "600000"]);
        assert_eq!(results[1].name, "Pudong Dev");
        assert_eq!(results[1].close, 20.0);
        assert!((results[1].change_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn market_filter_restricts_scan() {
        let dir = tempfile::TempDir::new().unwrap();
        write_bar_csv(dir.path(), &make_breakout("600000", 40, 10.0, 20.0));
        write_bar_csv(dir.path(), &make_breakout("000001", 40, 8.0, 16.0));
        write_universe_csv(
            dir.path(),
            &[("600000", "Pudong Dev", "SH"), ("000001", "Ping An Bank", "SZ")],
        );

        let adapter = Arc::new(CsvDataAdapter::new(dir.path().to_path_buf()));
        let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);
        let program = Program::compile("MA5 := MA(CLOSE, 5); CLOSE > 1.5 * MA5;").unwrap();

        let id = manager
            .start_run(program, Some("SZ".to_string()), 120, MIN_BARS)
            .unwrap();
        let snapshot = wait_terminal(&manager, id);

        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.matched, 1);
        let results = manager
            .results(id, SortField::Code, SortOrder::Ascending)
            .unwrap();
        assert_eq!(results[0].code, "000001");
    }

    #[test]
    fn missing_bar_file_skips_security_and_run_completes() {
        let dir = tempfile::TempDir::new().unwrap();
        write_bar_csv(dir.path(), &make_breakout("600000", 40, 10.0, 20.0));
        write_universe_csv(
            dir.path(),
            &[("600000", "Pudong Dev", "SH"), ("600404", "Ghost Co", "SH")],
        );

        let adapter = Arc::new(CsvDataAdapter::new(dir.path().to_path_buf()));
        let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);
        let program = Program::compile("MA5 := MA(CLOSE, 5); CLOSE > 1.5 * MA5;").unwrap();

        let id = manager.start_run(program, None, 120, MIN_BARS).unwrap();
        let snapshot = wait_terminal(&manager, id);

        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.matched, 1);
        assert_eq!(snapshot.skipped, 1);
    }

    #[test]
    fn short_history_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        write_bar_csv(dir.path(), &make_breakout("600000", 10, 10.0, 20.0));
        write_universe_csv(dir.path(), &[("600000", "Young Co", "SH")]);

        let adapter = Arc::new(CsvDataAdapter::new(dir.path().to_path_buf()));
        let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);
        let program = Program::compile("CLOSE > 0;").unwrap();

        let id = manager.start_run(program, None, 120, MIN_BARS).unwrap();
        let snapshot = wait_terminal(&manager, id);

        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.matched, 0);
        assert_eq!(snapshot.skipped, 1);
    }

    #[test]
    fn missing_universe_index_fails_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let adapter = Arc::new(CsvDataAdapter::new(dir.path().to_path_buf()));
        let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);
        let program = Program::compile("CLOSE > 0;").unwrap();

        let id = manager.start_run(program, None, 120, MIN_BARS).unwrap();
        let snapshot = wait_terminal(&manager, id);

        assert_eq!(snapshot.status, RunStatus::Failed);
        assert!(snapshot.error.is_some());
    }
}

mod preset_scans {
    use super::*;

    #[test]
    fn breakout_preset_matches_volume_surge_over_high() {
        // 30 flat bars, then the last closes above every prior high on
        // heavy volume.
        let mut series = make_series("600000", &[10.0; 31]);
        let bars: Vec<_> = series
            .bars()
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let mut bar = b.clone();
                if i == 30 {
                    bar.close = 15.0;
                    bar.high = 15.5;
                    bar.volume = 5000.0;
                }
                bar
            })
            .collect();
        series = sifter::domain::bar::BarSeries::new("600000", bars).unwrap();

        let preset = presets::find("breakout_volume").unwrap();
        let program = preset.compile(&BTreeMap::new()).unwrap();
        assert!(program.matches(&series).unwrap());

        // The flat series never matches.
        let flat = make_series("600001", &[10.0; 31]);
        assert!(!program.matches(&flat).unwrap());
    }

    #[test]
    fn preset_scan_end_to_end_with_mocks() {
        let manager = RunManager::new(
            Arc::new(
                MockBarPort::new()
                    .with_series(make_series("600000", &[10.0; 40]))
                    .with_series(make_series("600001", &[10.0; 40])),
            ),
            Arc::new(MockDirectory::listing(&["600000", "600001"])),
        );

        let preset = presets::find("ma_support").unwrap();
        let mut params = BTreeMap::new();
        params.insert("N".to_string(), 10.0);
        let program = preset.compile(&params).unwrap();
        assert!(program.source().contains("N := 10"));

        let id = manager.start_run(program, None, 150, MIN_BARS).unwrap();
        let snapshot = wait_terminal(&manager, id);
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.processed, 2);
    }

    #[test]
    fn kdj_preset_runs_over_trending_data() {
        // Down then up: K crossing D from below mid-range.
        let mut closes: Vec<f64> = (0..30).map(|i| 20.0 - f64::from(i) * 0.3).collect();
        closes.extend((0..5).map(|i| 11.0 + f64::from(i) * 0.8));
        let series = make_series("600000", &closes);

        let preset = presets::find("kdj_golden_cross").unwrap();
        let program = preset.compile(&BTreeMap::new()).unwrap();
        // The decision is data dependent; the point is a clean evaluation.
        program.matches(&series).unwrap();
    }
}
