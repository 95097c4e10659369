//! Formula AST data structures.
//!
//! - [`Expr`]: expression tree built by the parser
//! - [`BinOp`]: binary operators in precedence order
//! - [`Func`]: the closed set of built-in functions, resolved at parse time
//! - [`Stmt`] / statement list: one formula = assignments plus a final result

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Add,
    Sub,
    Mul,
    Div,
}

/// Built-in function kinds. Dispatch is a pattern match in
/// [`crate::domain::formula_fn`]; adding a function means adding a variant,
/// a name mapping here, and one dispatch arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Ma,
    Ema,
    Sma,
    Ref,
    Count,
    Sum,
    Hhv,
    Llv,
    Std,
    If,
    Abs,
    Max,
    Min,
    Sqrt,
    Pow,
    Every,
    Exist,
    BarsLast,
    Cross,
    CrossDown,
}

impl Func {
    /// Resolve an uppercased call name. `IIF` is an alias for `IF`.
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "MA" => Some(Func::Ma),
            "EMA" => Some(Func::Ema),
            "SMA" => Some(Func::Sma),
            "REF" => Some(Func::Ref),
            "COUNT" => Some(Func::Count),
            "SUM" => Some(Func::Sum),
            "HHV" => Some(Func::Hhv),
            "LLV" => Some(Func::Llv),
            "STD" => Some(Func::Std),
            "IF" | "IIF" => Some(Func::If),
            "ABS" => Some(Func::Abs),
            "MAX" => Some(Func::Max),
            "MIN" => Some(Func::Min),
            "SQRT" => Some(Func::Sqrt),
            "POW" => Some(Func::Pow),
            "EVERY" => Some(Func::Every),
            "EXIST" => Some(Func::Exist),
            "BARSLAST" => Some(Func::BarsLast),
            "CROSS" => Some(Func::Cross),
            "CROSSDOWN" => Some(Func::CrossDown),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Ma => "MA",
            Func::Ema => "EMA",
            Func::Sma => "SMA",
            Func::Ref => "REF",
            Func::Count => "COUNT",
            Func::Sum => "SUM",
            Func::Hhv => "HHV",
            Func::Llv => "LLV",
            Func::Std => "STD",
            Func::If => "IF",
            Func::Abs => "ABS",
            Func::Max => "MAX",
            Func::Min => "MIN",
            Func::Sqrt => "SQRT",
            Func::Pow => "POW",
            Func::Every => "EVERY",
            Func::Exist => "EXIST",
            Func::BarsLast => "BARSLAST",
            Func::Cross => "CROSS",
            Func::CrossDown => "CROSSDOWN",
        }
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One statement of a formula program.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `NAME := expr` — stores the value in the context cache and becomes
    /// the current result.
    Assign { name: String, expr: Expr },
    /// Bare expression — becomes the current result.
    Expr(Expr),
}
