//! Formula evaluation engine.
//!
//! Evaluates an expression tree against one bar series, producing a
//! bar-aligned [`Value`]. Evaluation is eager and left to right; the engine
//! is pure and keeps no state between calls, so it is safe to evaluate the
//! same AST against many securities concurrently as long as each evaluation
//! owns its own [`FormulaContext`].
//!
//! # Missing-value semantics
//!
//! Arithmetic propagates the missing sentinel (`NAN`); division by zero
//! produces missing, never an error. Ordered comparisons against missing are
//! false; `=` against missing is false and `!=` is its exact negation, so it
//! is true. Logical AND/OR coerce operands to booleans, with missing rows
//! coerced to false.

use crate::domain::bar::{BarSeries, PriceField};
use crate::domain::error::FormulaError;
use crate::domain::formula::{BinOp, Expr, Stmt};
use crate::domain::formula_fn;
use crate::domain::value::Value;
use std::collections::HashMap;

/// One bar series plus the named results of earlier statements. Created
/// fresh per security; never shared across securities.
pub struct FormulaContext<'a> {
    series: &'a BarSeries,
    cache: HashMap<String, Value>,
}

impl<'a> FormulaContext<'a> {
    pub fn new(series: &'a BarSeries) -> Self {
        FormulaContext {
            series,
            cache: HashMap::new(),
        }
    }

    /// Store a named statement result under both its original and uppercased
    /// spelling so later references find it regardless of case.
    pub fn define(&mut self, name: &str, value: Value) {
        self.cache.insert(name.to_string(), value.clone());
        self.cache.insert(name.to_uppercase(), value);
    }

    /// Resolution order: OHLCV field, exact cache hit, uppercased cache hit,
    /// case-insensitive cache scan.
    fn resolve(&self, name: &str) -> Result<Value, FormulaError> {
        if let Some(field) = PriceField::from_name(name) {
            return Ok(Value::Num(self.series.column(field)));
        }
        if let Some(v) = self.cache.get(name) {
            return Ok(v.clone());
        }
        let upper = name.to_uppercase();
        if let Some(v) = self.cache.get(&upper) {
            return Ok(v.clone());
        }
        for (key, v) in &self.cache {
            if key.to_uppercase() == upper {
                return Ok(v.clone());
            }
        }
        Err(FormulaError::UnknownVariable(name.to_string()))
    }

    fn len(&self) -> usize {
        self.series.len()
    }
}

/// Run a statement list; the value of the last statement is the result.
pub fn eval_program(stmts: &[Stmt], ctx: &mut FormulaContext) -> Result<Value, FormulaError> {
    let mut result = Value::Scalar(0.0);
    for stmt in stmts {
        result = match stmt {
            Stmt::Assign { name, expr } => {
                let value = eval(expr, ctx)?;
                ctx.define(name, value.clone());
                value
            }
            Stmt::Expr(expr) => eval(expr, ctx)?,
        };
    }
    Ok(result)
}

pub fn eval(expr: &Expr, ctx: &mut FormulaContext) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Scalar(*n)),
        Expr::Ident(name) => ctx.resolve(name),
        Expr::Neg(inner) => {
            let v = eval(inner, ctx)?;
            Ok(match v {
                Value::Scalar(s) => Value::Scalar(-s),
                other => Value::Num(
                    other
                        .into_num(ctx.len())
                        .iter()
                        .map(|x| -x)
                        .collect(),
                ),
            })
        }
        Expr::Binary { op, left, right } => {
            let lhs = eval(left, ctx)?;
            let rhs = eval(right, ctx)?;
            Ok(binary(*op, lhs, rhs, ctx.len()))
        }
        Expr::Call { func, args } => {
            // Arguments evaluate eagerly, left to right.
            let args = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            formula_fn::call(*func, args, ctx.len())
        }
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value, len: usize) -> Value {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arith(op, lhs, rhs, len),
        BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le | BinOp::Eq | BinOp::Ne => {
            compare(op, lhs, rhs, len)
        }
        BinOp::And | BinOp::Or => logic(op, lhs, rhs, len),
    }
}

fn arith(op: BinOp, lhs: Value, rhs: Value, len: usize) -> Value {
    if let (Value::Scalar(a), Value::Scalar(b)) = (&lhs, &rhs) {
        return Value::Scalar(arith_one(op, *a, *b));
    }
    let a = lhs.into_num(len);
    let b = rhs.into_num(len);
    Value::Num(
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| arith_one(op, x, y))
            .collect(),
    )
}

fn arith_one(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                a / b
            }
        }
        _ => unreachable!("arith_one called with non-arithmetic operator"),
    }
}

fn compare(op: BinOp, lhs: Value, rhs: Value, len: usize) -> Value {
    if let (Value::Scalar(a), Value::Scalar(b)) = (&lhs, &rhs) {
        return Value::Scalar(if compare_one(op, *a, *b) { 1.0 } else { 0.0 });
    }
    let a = lhs.into_num(len);
    let b = rhs.into_num(len);
    Value::Bool(
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| compare_one(op, x, y))
            .collect(),
    )
}

fn compare_one(op: BinOp, a: f64, b: f64) -> bool {
    match op {
        BinOp::Gt => a > b,
        BinOp::Lt => a < b,
        BinOp::Ge => a >= b,
        BinOp::Le => a <= b,
        BinOp::Eq => a == b,
        // Negation of `=`, so a missing operand compares not-equal.
        BinOp::Ne => a != b,
        _ => unreachable!("compare_one called with non-comparison operator"),
    }
}

fn logic(op: BinOp, lhs: Value, rhs: Value, len: usize) -> Value {
    if let (Value::Scalar(_), Value::Scalar(_)) = (&lhs, &rhs) {
        let a = lhs.last_truth();
        let b = rhs.last_truth();
        let v = match op {
            BinOp::And => a && b,
            _ => a || b,
        };
        return Value::Scalar(if v { 1.0 } else { 0.0 });
    }
    let a = lhs.into_bool(len);
    let b = rhs.into_bool(len);
    Value::Bool(
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| match op {
                BinOp::And => x && y,
                _ => x || y,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::formula_parser::{parse_expr, parse_program};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> BarSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Days::new(i as u64),
                open: c - 0.5,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0 + i as f64,
                amount: 10000.0,
            })
            .collect();
        BarSeries::new("TEST", bars).unwrap()
    }

    fn eval_str(input: &str, s: &BarSeries) -> Value {
        let expr = parse_expr(input).unwrap();
        let mut ctx = FormulaContext::new(s);
        eval(&expr, &mut ctx).unwrap()
    }

    fn eval_formula(input: &str, s: &BarSeries) -> Value {
        let stmts = parse_program(input).unwrap();
        let mut ctx = FormulaContext::new(s);
        eval_program(&stmts, &mut ctx).unwrap()
    }

    #[test]
    fn field_lookup_and_aliases() {
        let s = series(&[10.0, 11.0]);
        assert_eq!(eval_str("CLOSE", &s), Value::Num(vec![10.0, 11.0]));
        assert_eq!(eval_str("c", &s), Value::Num(vec![10.0, 11.0]));
        assert_eq!(eval_str("V", &s), Value::Num(vec![1000.0, 1001.0]));
        assert_eq!(eval_str("vol", &s), Value::Num(vec![1000.0, 1001.0]));
    }

    #[test]
    fn unknown_identifier_is_reference_error() {
        let s = series(&[10.0]);
        let expr = parse_expr("MYSTERY").unwrap();
        let mut ctx = FormulaContext::new(&s);
        assert!(matches!(
            eval(&expr, &mut ctx),
            Err(FormulaError::UnknownVariable(name)) if name == "MYSTERY"
        ));
    }

    #[test]
    fn arithmetic_broadcasts_scalars() {
        let s = series(&[10.0, 20.0]);
        assert_eq!(
            eval_str("CLOSE * 2 + 1", &s),
            Value::Num(vec![21.0, 41.0])
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let s = series(&[10.0, 20.0]);
        let chained = eval_str("CLOSE - OPEN - LOW", &s);
        let grouped = eval_str("(CLOSE - OPEN) - LOW", &s);
        assert_eq!(chained, grouped);
    }

    #[test]
    fn division_by_zero_is_missing() {
        let s = series(&[10.0]);
        match eval_str("CLOSE / 0", &s) {
            Value::Num(v) => assert!(v[0].is_nan()),
            other => panic!("expected Num, got {other:?}"),
        }
        match eval_str("CLOSE / (CLOSE - CLOSE)", &s) {
            Value::Num(v) => assert!(v[0].is_nan()),
            other => panic!("expected Num, got {other:?}"),
        }
    }

    #[test]
    fn missing_propagates_through_arithmetic() {
        let s = series(&[10.0, 11.0]);
        // REF introduces a missing head; addition keeps it missing.
        match eval_str("REF(CLOSE, 1) + 1", &s) {
            Value::Num(v) => {
                assert!(v[0].is_nan());
                assert_relative_eq!(v[1], 11.0);
            }
            other => panic!("expected Num, got {other:?}"),
        }
    }

    #[test]
    fn comparison_with_missing_is_false() {
        let s = series(&[10.0, 11.0]);
        assert_eq!(
            eval_str("REF(CLOSE, 1) > 0", &s),
            Value::Bool(vec![false, true])
        );
        assert_eq!(
            eval_str("REF(CLOSE, 1) = REF(CLOSE, 1)", &s),
            Value::Bool(vec![false, true])
        );
        // != is the negation of =, so missing != anything.
        assert_eq!(
            eval_str("REF(CLOSE, 1) != 10", &s),
            Value::Bool(vec![true, false])
        );
    }

    #[test]
    fn logical_operators_elementwise() {
        let s = series(&[10.0, 20.0, 30.0]);
        assert_eq!(
            eval_str("CLOSE > 15 AND CLOSE < 25", &s),
            Value::Bool(vec![false, true, false])
        );
        assert_eq!(
            eval_str("CLOSE < 15 OR CLOSE > 25", &s),
            Value::Bool(vec![true, false, true])
        );
    }

    #[test]
    fn assignment_defines_cache_variable() {
        let s = series(&[10.0, 20.0]);
        let v = eval_formula("DOUBLED := CLOSE * 2; DOUBLED > 25;", &s);
        assert_eq!(v, Value::Bool(vec![false, true]));
    }

    #[test]
    fn cache_lookup_is_case_insensitive() {
        let s = series(&[10.0]);
        let v = eval_formula("MyVar := CLOSE; myvar + MYVAR;", &s);
        assert_eq!(v, Value::Num(vec![20.0]));
    }

    #[test]
    fn field_names_shadow_cache() {
        // A variable named CLOSE cannot mask the price column.
        let s = series(&[10.0]);
        let v = eval_formula("CLOSE := 999; CLOSE;", &s);
        assert_eq!(v, Value::Num(vec![10.0]));
    }

    #[test]
    fn assignment_value_is_statement_result() {
        let s = series(&[10.0]);
        let v = eval_formula("X := CLOSE * 3;", &s);
        assert_eq!(v, Value::Num(vec![30.0]));
    }

    #[test]
    fn close_above_previous_signal() {
        let s = series(&[10.0, 9.0, 11.0]);
        let v = eval_formula("选股 := CLOSE > REF(CLOSE, 1);", &s);
        // Signal is [missing->false, false, true]; decision is the last row.
        assert_eq!(v, Value::Bool(vec![false, false, true]));
        assert!(v.last_truth());
    }

    #[test]
    fn scalar_only_statement() {
        let s = series(&[10.0]);
        let v = eval_formula("N := 5; N * 2;", &s);
        assert_eq!(v, Value::Scalar(10.0));
    }

    #[test]
    fn unary_minus_on_array() {
        let s = series(&[10.0, 20.0]);
        assert_eq!(eval_str("-CLOSE", &s), Value::Num(vec![-10.0, -20.0]));
    }

    #[test]
    fn nested_function_composition() {
        let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // HHV of MA(2): MA = [-,1.5,2.5,3.5,4.5]; HHV(.,2) head poisoned.
        match eval_str("HHV(MA(CLOSE, 2), 2)", &s) {
            Value::Num(v) => {
                assert!(v[0].is_nan());
                assert!(v[1].is_nan());
                assert_relative_eq!(v[2], 2.5);
                assert_relative_eq!(v[4], 4.5);
            }
            other => panic!("expected Num, got {other:?}"),
        }
    }
}
