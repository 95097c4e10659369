//! Compiled formula programs.
//!
//! Compiling parses the formula once and then evaluates it against a small
//! synthetic bar series. That smoke run surfaces every syntax and reference
//! error up front, so a `Program` handed to a screening run can only fail on
//! data-dependent argument errors.

use crate::domain::bar::BarSeries;
use crate::domain::error::FormulaError;
use crate::domain::formula::Stmt;
use crate::domain::formula_eval::{eval_program, FormulaContext};
use crate::domain::formula_parser::parse_program;
use crate::domain::value::Value;
use std::collections::BTreeMap;

/// An immutable, side-effect-free compiled formula. Compile once per formula
/// text, evaluate against any number of securities.
#[derive(Debug, Clone)]
pub struct Program {
    statements: Vec<Stmt>,
    source: String,
}

impl Program {
    /// Parse and smoke-test a formula.
    pub fn compile(source: &str) -> Result<Program, FormulaError> {
        let statements = parse_program(source)?;
        let program = Program {
            statements,
            source: source.to_string(),
        };
        let smoke = BarSeries::synthetic();
        program.eval(&smoke)?;
        Ok(program)
    }

    /// Apply parameter overrides to the formula text, then compile. For each
    /// overridden name the first `NAME := <number>` assignment is rewritten;
    /// name matching is case-insensitive.
    pub fn compile_with_params(
        source: &str,
        params: &BTreeMap<String, f64>,
    ) -> Result<Program, FormulaError> {
        let mut text = source.to_string();
        for (key, value) in params {
            text = override_assignment(&text, key, *value);
        }
        Program::compile(&text)
    }

    /// The (possibly parameter-substituted) formula text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one bar series, returning the final statement value.
    pub fn eval(&self, series: &BarSeries) -> Result<Value, FormulaError> {
        let mut ctx = FormulaContext::new(series);
        eval_program(&self.statements, &mut ctx)
    }

    /// The screening decision: truth of the last row of the final value,
    /// with missing coerced to false.
    pub fn matches(&self, series: &BarSeries) -> Result<bool, FormulaError> {
        Ok(self.eval(series)?.last_truth())
    }
}

/// Rewrite the first `name := <numeric literal>` in `text` to assign
/// `value`. Leaves the text untouched when no such assignment exists.
fn override_assignment(text: &str, name: &str, value: f64) -> String {
    // ASCII-only case folding keeps byte offsets identical between the
    // folded and original text (full Unicode uppercasing can change lengths).
    let upper_text: String = text.chars().map(|c| c.to_ascii_uppercase()).collect();
    let upper_name: String = name.chars().map(|c| c.to_ascii_uppercase()).collect();
    let bytes = upper_text.as_bytes();

    let mut search_from = 0;
    while let Some(rel) = upper_text[search_from..].find(&upper_name) {
        let start = search_from + rel;
        let end = start + upper_name.len();
        search_from = end;

        // Must be a whole identifier, not a substring of a longer name.
        let boundary_before = start == 0
            || !upper_text[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let boundary_after = end >= bytes.len()
            || !upper_text[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if !boundary_before || !boundary_after {
            continue;
        }

        let rest = &text[end..];
        let trimmed = rest.trim_start();
        let ws = rest.len() - trimmed.len();
        if !trimmed.starts_with(":=") {
            continue;
        }
        let after_assign = &trimmed[2..];
        let trimmed_value = after_assign.trim_start();
        let ws2 = after_assign.len() - trimmed_value.len();

        let digits = trimmed_value
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(trimmed_value.len());
        if digits == 0 {
            continue;
        }

        let literal_start = end + ws + 2 + ws2;
        let literal_end = literal_start + digits;
        let formatted = if value.fract() == 0.0 {
            format!("{}", value as i64)
        } else {
            format!("{value}")
        };
        return format!("{}{}{}", &text[..literal_start], formatted, &text[literal_end..]);
    }

    text.to_string()
}
