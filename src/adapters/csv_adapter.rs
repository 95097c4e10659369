//! CSV-backed bar history and security directory.
//!
//! Layout: one `<code>.csv` per security with columns
//! `date,open,high,low,close,volume,amount`, plus a `universe.csv` index with
//! columns `code,name,market`, all under one base directory.

use crate::domain::bar::{Bar, BarSeries};
use crate::domain::error::SifterError;
use crate::domain::security::Security;
use crate::ports::bar_port::BarPort;
use crate::ports::directory_port::DirectoryPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvDataAdapter {
    base_path: PathBuf,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn bars_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{code}.csv"))
    }

    fn universe_path(&self) -> PathBuf {
        self.base_path.join("universe.csv")
    }
}

fn data_err(reason: String) -> SifterError {
    SifterError::DataSource { reason }
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, name: &str) -> Result<&'a str, SifterError> {
    record
        .get(idx)
        .ok_or_else(|| data_err(format!("missing {name} column")))
}

fn numeric(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, SifterError> {
    field(record, idx, name)?
        .trim()
        .parse()
        .map_err(|e| data_err(format!("invalid {name} value: {e}")))
}

impl BarPort for CsvDataAdapter {
    fn fetch_bars(&self, code: &str, max_bars: usize) -> Result<BarSeries, SifterError> {
        let path = self.bars_path(code);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {e}", path.display())))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {e}")))?;
            let date = NaiveDate::parse_from_str(field(&record, 0, "date")?.trim(), "%Y-%m-%d")
                .map_err(|e| data_err(format!("invalid date format: {e}")))?;
            bars.push(Bar {
                date,
                open: numeric(&record, 1, "open")?,
                high: numeric(&record, 2, "high")?,
                low: numeric(&record, 3, "low")?,
                close: numeric(&record, 4, "close")?,
                volume: numeric(&record, 5, "volume")?,
                amount: numeric(&record, 6, "amount")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        if bars.len() > max_bars {
            bars.drain(..bars.len() - max_bars);
        }
        BarSeries::new(code, bars)
    }
}

impl DirectoryPort for CsvDataAdapter {
    fn list_universe(&self, market: Option<&str>) -> Result<Vec<Security>, SifterError> {
        let path = self.universe_path();
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {e}", path.display())))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut securities = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {e}")))?;
            let security = Security {
                code: field(&record, 0, "code")?.trim().to_string(),
                name: field(&record, 1, "name")?.trim().to_string(),
                market: field(&record, 2, "market")?.trim().to_string(),
            };
            if market.is_none_or(|m| security.market.eq_ignore_ascii_case(m)) {
                securities.push(security);
            }
        }

        securities.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(securities)
    }
}
