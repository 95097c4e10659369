//! Core domain types and logic.

pub mod bar;
pub mod error;
pub mod formula;
pub mod formula_lexer;
pub mod formula_parser;
pub mod formula_fn;
pub mod formula_eval;
pub mod program;
pub mod presets;
pub mod screen;
pub mod security;
pub mod value;
