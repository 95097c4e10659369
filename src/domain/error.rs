//! Domain error types.

/// A syntax error with byte-offset position information for formula parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("syntax error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Errors raised while compiling or evaluating a formula.
///
/// `Syntax` and the two reference variants surface at compile time: parsing
/// resolves function names, and the compile-time smoke evaluation exercises
/// every identifier. A compiled [`crate::domain::program::Program`] can only
/// fail later on data-dependent argument errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FormulaError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown identifier: {0}")]
    UnknownVariable(String),

    #[error("{func}: {reason}")]
    BadArgument { func: &'static str, reason: String },
}

/// Top-level error type for sifter.
#[derive(Debug, thiserror::Error)]
pub enum SifterError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("bar series for {code} is not strictly ascending by date")]
    UnorderedSeries { code: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("unknown preset strategy: {0}")]
    UnknownPreset(String),

    #[error("a screen run is already in progress")]
    RunConflict,

    #[error("no screen run with id {0}")]
    UnknownRun(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ParseError> for SifterError {
    fn from(err: ParseError) -> Self {
        SifterError::Formula(FormulaError::Syntax(err))
    }
}

impl From<&SifterError> for std::process::ExitCode {
    fn from(err: &SifterError) -> Self {
        let code: u8 = match err {
            SifterError::Io(_) => 1,
            SifterError::ConfigParse { .. }
            | SifterError::ConfigMissing { .. }
            | SifterError::ConfigInvalid { .. } => 2,
            SifterError::DataSource { .. } | SifterError::UnorderedSeries { .. } => 3,
            SifterError::Formula(_) | SifterError::UnknownPreset(_) => 4,
            SifterError::InsufficientData { .. } => 5,
            SifterError::RunConflict | SifterError::UnknownRun(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}
