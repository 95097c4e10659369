//! Evaluation values: scalars, numeric arrays, and boolean arrays.
//!
//! Arrays are always the same length as the bar series they were computed
//! from. The missing sentinel for numeric rows is `f64::NAN`; boolean arrays
//! have no missing state, so coercing a missing numeric row to boolean yields
//! `false` (see the coercion table in DESIGN.md).

use crate::domain::error::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A bare numeric literal or a scalar-only computation (`N := 5`).
    Scalar(f64),
    /// Bar-aligned numeric array; `NAN` marks missing rows.
    Num(Vec<f64>),
    /// Bar-aligned boolean array, as produced by comparisons and crosses.
    Bool(Vec<bool>),
}

impl Value {
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Num(v) => Some(v.len()),
            Value::Bool(v) => Some(v.len()),
        }
    }

    /// Broadcast to a numeric array of `len` rows. Booleans become 0/1.
    pub fn into_num(self, len: usize) -> Vec<f64> {
        match self {
            Value::Scalar(s) => vec![s; len],
            Value::Num(v) => v,
            Value::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Broadcast to a boolean array of `len` rows. A numeric row is true iff
    /// it is non-zero and not missing.
    pub fn into_bool(self, len: usize) -> Vec<bool> {
        match self {
            Value::Scalar(s) => vec![s != 0.0 && !s.is_nan(); len],
            Value::Num(v) => v.iter().map(|&x| x != 0.0 && !x.is_nan()).collect(),
            Value::Bool(v) => v,
        }
    }

    /// Interpret a scalar argument as a window length.
    pub fn as_window(&self, func: &'static str) -> Result<usize, FormulaError> {
        match self {
            Value::Scalar(s) if s.is_finite() && *s >= 1.0 => Ok(*s as usize),
            Value::Scalar(s) => Err(FormulaError::BadArgument {
                func,
                reason: format!("window length must be a positive number, got {s}"),
            }),
            _ => Err(FormulaError::BadArgument {
                func,
                reason: "window length must be a numeric constant".into(),
            }),
        }
    }

    /// Truth value of the last row, with missing coerced to false. This is
    /// the screening match decision.
    pub fn last_truth(&self) -> bool {
        match self {
            Value::Scalar(s) => *s != 0.0 && !s.is_nan(),
            Value::Num(v) => v.last().is_some_and(|&x| x != 0.0 && !x.is_nan()),
            Value::Bool(v) => v.last().copied().unwrap_or(false),
        }
    }
}
