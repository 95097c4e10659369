//! Preset screening strategies.
//!
//! Named formula templates with overridable numeric constants. Each preset
//! records how many recent bars it needs (`data_days`) so the run controller
//! fetches enough history for the longest lookback in the formula.

use crate::domain::error::SifterError;
use crate::domain::program::Program;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct PresetParam {
    pub key: &'static str,
    pub label: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub formula: &'static str,
    pub params: &'static [PresetParam],
    /// Bars of history to fetch per security.
    pub data_days: usize,
}

impl Preset {
    /// Compile this preset's formula with the given parameter overrides.
    pub fn compile(&self, params: &BTreeMap<String, f64>) -> Result<Program, SifterError> {
        Ok(Program::compile_with_params(self.formula, params)?)
    }
}

pub const PRESETS: &[Preset] = &[
    Preset {
        id: "volume_contraction",
        name: "Volume contraction pullback",
        description: "Today's volume has dried up after a recent stretch of \
                      above-average activity, a setup for a rebound off a \
                      low-volume pullback",
        category: "volume",
        formula: "\
N := 120;
VOL120 := MA(VOL, N);
COND1 := VOL > VOL120;
COND2 := COUNT(COND1, 5) >= 3;
GOLDEN := VOL < 0.3 * VOL120;
QUIET := VOL < 0.8 * VOL120 OR GOLDEN;
PICK := QUIET AND REF(COND2, 1);
",
        params: &[PresetParam {
            key: "N",
            label: "volume average period",
            default: 120.0,
            min: 20.0,
            max: 250.0,
        }],
        data_days: 150,
    },
    Preset {
        id: "golden_cross_macd",
        name: "MACD golden cross",
        description: "DIF crosses above DEA while still below zero",
        category: "trend",
        formula: "\
EMA12 := EMA(CLOSE, 12);
EMA26 := EMA(CLOSE, 26);
DIF := EMA12 - EMA26;
DEA := EMA(DIF, 9);
PICK := CROSS(DIF, DEA) AND DIF < 0;
",
        params: &[],
        data_days: 60,
    },
    Preset {
        id: "breakout_volume",
        name: "Volume breakout",
        description: "Close breaks the N-day high on at least twice the \
                      5-day average volume",
        category: "breakout",
        formula: "\
N := 20;
VOL_MA := MA(VOL, 5);
HIGH_N := HHV(HIGH, N);
PICK := CLOSE > REF(HIGH_N, 1) AND VOL > 2 * VOL_MA;
",
        params: &[PresetParam {
            key: "N",
            label: "breakout period",
            default: 20.0,
            min: 5.0,
            max: 60.0,
        }],
        data_days: 60,
    },
    Preset {
        id: "ma_support",
        name: "Moving-average support",
        description: "Price dips through the N-day average intraday but \
                      closes back above it on an up candle",
        category: "trend",
        formula: "\
N := 20;
MA_N := MA(CLOSE, N);
PICK := LOW < MA_N AND CLOSE > MA_N AND CLOSE > OPEN;
",
        params: &[PresetParam {
            key: "N",
            label: "average period",
            default: 20.0,
            min: 5.0,
            max: 120.0,
        }],
        data_days: 150,
    },
    Preset {
        id: "oversold_rsi",
        name: "RSI oversold rebound",
        description: "RSI turns up from below 30",
        category: "oscillator",
        formula: "\
N := 14;
LC := REF(CLOSE, 1);
DIFF := CLOSE - LC;
UP := IF(DIFF > 0, DIFF, 0);
DN := IF(DIFF < 0, ABS(DIFF), 0);
SUMUP := SMA(UP, N, 1);
SUMDN := SMA(DN, N, 1);
RSI := SUMUP / (SUMUP + SUMDN) * 100;
PICK := REF(RSI, 1) < 30 AND RSI > REF(RSI, 1);
",
        params: &[PresetParam {
            key: "N",
            label: "RSI period",
            default: 14.0,
            min: 6.0,
            max: 24.0,
        }],
        data_days: 60,
    },
    Preset {
        id: "kdj_golden_cross",
        name: "KDJ golden cross",
        description: "K crosses above D in the lower half of the range",
        category: "oscillator",
        formula: "\
N := 9;
RSV := (CLOSE - LLV(LOW, N)) / (HHV(HIGH, N) - LLV(LOW, N)) * 100;
K := SMA(RSV, 3, 1);
D := SMA(K, 3, 1);
PICK := CROSS(K, D) AND K < 50;
",
        params: &[PresetParam {
            key: "N",
            label: "KDJ period",
            default: 9.0,
            min: 5.0,
            max: 21.0,
        }],
        data_days: 60,
    },
];

pub fn find(id: &str) -> Result<&'static Preset, SifterError> {
    PRESETS
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| SifterError::UnknownPreset(id.to_string()))
}
