//! OHLCV bar and bar-series representation.

use crate::domain::error::SifterError;
use chrono::NaiveDate;

/// One time-stepped price observation. Immutable once produced.
///
/// Volume and amount are `f64`: the formula engine treats every column as a
/// numeric array, and turnover amounts routinely exceed `i64` pennies anyway.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

/// Which column of a [`BarSeries`] an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Amount,
}

impl PriceField {
    /// Resolve a canonical field name or single-letter alias, case-insensitive.
    pub fn from_name(name: &str) -> Option<PriceField> {
        match name.to_uppercase().as_str() {
            "OPEN" | "O" => Some(PriceField::Open),
            "HIGH" | "H" => Some(PriceField::High),
            "LOW" | "L" => Some(PriceField::Low),
            "CLOSE" | "C" => Some(PriceField::Close),
            "VOL" | "VOLUME" | "V" => Some(PriceField::Volume),
            "AMOUNT" => Some(PriceField::Amount),
            _ => None,
        }
    }
}

/// Ascending-by-date sequence of bars for one security.
#[derive(Debug, Clone)]
pub struct BarSeries {
    code: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, enforcing strictly ascending and unique dates.
    pub fn new(code: impl Into<String>, bars: Vec<Bar>) -> Result<BarSeries, SifterError> {
        let code = code.into();
        if bars.windows(2).any(|w| w[0].date >= w[1].date) {
            return Err(SifterError::UnorderedSeries { code });
        }
        Ok(BarSeries { code, bars })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Extract one column as a bar-aligned array.
    pub fn column(&self, field: PriceField) -> Vec<f64> {
        self.bars
            .iter()
            .map(|b| match field {
                PriceField::Open => b.open,
                PriceField::High => b.high,
                PriceField::Low => b.low,
                PriceField::Close => b.close,
                PriceField::Volume => b.volume,
                PriceField::Amount => b.amount,
            })
            .collect()
    }

    /// Day-over-day change of the last close, in percent. Zero when there is
    /// no prior bar or the prior close is zero.
    pub fn last_change_pct(&self) -> f64 {
        let n = self.bars.len();
        if n < 2 {
            return 0.0;
        }
        let prev = self.bars[n - 2].close;
        if prev == 0.0 {
            return 0.0;
        }
        (self.bars[n - 1].close - prev) / prev * 100.0
    }

    /// Fixed constant-valued series used to smoke-test formulas at compile
    /// time: long enough for typical lookback windows, all prices 1.0.
    pub fn synthetic() -> BarSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let bars = (0..50)
            .map(|i| Bar {
                date: start + chrono::Days::new(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1000.0,
                amount: 10000.0,
            })
            .collect();
        BarSeries {
            code: "SMOKE".into(),
            bars,
        }
    }
}
