#![allow(dead_code)]

use chrono::NaiveDate;
use sifter::domain::bar::{Bar, BarSeries};
use sifter::domain::error::SifterError;
use sifter::domain::security::Security;
use sifter::ports::bar_port::BarPort;
use sifter::ports::directory_port::DirectoryPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub fn make_bar(date: &str, close: f64) -> Bar {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    Bar {
        date,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
        amount: close * 1000.0,
    }
}

/// `closes[i]` becomes the close of consecutive days starting 2024-01-01.
pub fn make_series(code: &str, closes: &[f64]) -> BarSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: start + chrono::Days::new(i as u64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            amount: close * 1000.0,
        })
        .collect();
    BarSeries::new(code, bars).unwrap()
}

/// `n` flat bars at `close` with the final close replaced by `last`.
pub fn make_breakout(code: &str, n: usize, close: f64, last: f64) -> BarSeries {
    let mut closes = vec![close; n];
    *closes.last_mut().unwrap() = last;
    make_series(code, &closes)
}

pub struct MockBarPort {
    pub data: HashMap<String, BarSeries>,
}

impl MockBarPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: BarSeries) -> Self {
        self.data.insert(series.code().to_string(), series);
        self
    }
}

impl BarPort for MockBarPort {
    fn fetch_bars(&self, code: &str, _max_bars: usize) -> Result<BarSeries, SifterError> {
        self.data
            .get(code)
            .cloned()
            .ok_or_else(|| SifterError::DataSource {
                reason: format!("no data for {code}"),
            })
    }
}

pub struct MockDirectory {
    pub securities: Vec<Security>,
}

impl MockDirectory {
    pub fn listing(codes: &[&str]) -> Self {
        Self {
            securities: codes
                .iter()
                .map(|code| Security {
                    code: code.to_string(),
                    name: format!("Security {code}"),
                    market: "SH".to_string(),
                })
                .collect(),
        }
    }
}

impl DirectoryPort for MockDirectory {
    fn list_universe(&self, market: Option<&str>) -> Result<Vec<Security>, SifterError> {
        Ok(self
            .securities
            .iter()
            .filter(|s| market.is_none_or(|m| s.market.eq_ignore_ascii_case(m)))
            .cloned()
            .collect())
    }
}

/// Write one `<code>.csv` bar file into `dir`.
pub fn write_bar_csv(dir: &Path, series: &BarSeries) {
    let mut content = String::from("date,open,high,low,close,volume,amount\n");
    for bar in series.bars() {
        content.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume, bar.amount
        ));
    }
    fs::write(dir.join(format!("{}.csv", series.code())), content).unwrap();
}

/// Write a `universe.csv` index listing `(code, name, market)` rows.
pub fn write_universe_csv(dir: &Path, rows: &[(&str, &str, &str)]) {
    let mut content = String::from("code,name,market\n");
    for (code, name, market) in rows {
        content.push_str(&format!("{code},{name},{market}\n"));
    }
    fs::write(dir.join("universe.csv"), content).unwrap();
}
