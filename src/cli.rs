//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::{FormulaError, SifterError};
use crate::domain::presets::{self, PRESETS};
use crate::domain::program::Program;
use crate::domain::screen::{RunManager, RunStatus, SortField, SortOrder, MIN_BARS};
use crate::ports::bar_port::BarPort;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "sifter", about = "Formula-driven securities screener")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Screen the universe with a formula or preset strategy
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        /// Preset strategy id (see `sifter presets`)
        #[arg(short, long, conflicts_with = "formula")]
        preset: Option<String>,
        /// Formula text, e.g. "MA5 := MA(CLOSE, 5); CLOSE > MA5;"
        #[arg(short, long)]
        formula: Option<String>,
        /// Preset parameter override, KEY=VALUE; repeatable
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Restrict the universe to one market
        #[arg(long)]
        market: Option<String>,
        #[arg(long, value_enum, default_value_t = SortBy::Code)]
        sort_by: SortBy,
        #[arg(long, value_enum, default_value_t = Order::Asc)]
        order: Order,
    },
    /// Compile a formula and report errors without scanning
    Check {
        formula: String,
    },
    /// List preset strategies
    Presets,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SortBy {
    Code,
    Close,
    ChangePct,
    Volume,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Order {
    Asc,
    Desc,
}

impl From<SortBy> for SortField {
    fn from(s: SortBy) -> SortField {
        match s {
            SortBy::Code => SortField::Code,
            SortBy::Close => SortField::Close,
            SortBy::ChangePct => SortField::ChangePct,
            SortBy::Volume => SortField::Volume,
        }
    }
}

impl From<Order> for SortOrder {
    fn from(o: Order) -> SortOrder {
        match o {
            Order::Asc => SortOrder::Ascending,
            Order::Desc => SortOrder::Descending,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Scan {
            config,
            preset,
            formula,
            params,
            market,
            sort_by,
            order,
        } => run_scan(
            &config,
            preset.as_deref(),
            formula.as_deref(),
            &params,
            market,
            sort_by.into(),
            order.into(),
        ),
        Command::Check { formula } => run_check(&formula),
        Command::Presets => run_presets(),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SifterError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, f64>, ExitCode> {
    let mut params = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            eprintln!("error: invalid --param {item:?} (expected KEY=VALUE)");
            return Err(ExitCode::from(4));
        };
        let value: f64 = match value.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                eprintln!("error: invalid --param value {value:?} (expected a number)");
                return Err(ExitCode::from(4));
            }
        };
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    config_path: &PathBuf,
    preset_id: Option<&str>,
    formula: Option<&str>,
    raw_params: &[String],
    market: Option<String>,
    sort_by: SortField,
    order: SortOrder,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let data_path = match config.get_string("data", "path") {
        Some(p) => PathBuf::from(p),
        None => {
            let err = SifterError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            };
            eprintln!("error: {err}");
            return ExitCode::from(&err);
        }
    };
    let min_bars = config.get_int("screen", "min_bars", MIN_BARS as i64) as usize;
    let config_max_bars = config.get_int("screen", "max_bars", 250) as usize;

    let params = match parse_params(raw_params) {
        Ok(p) => p,
        Err(code) => return code,
    };

    // Stage 2: Compile the formula
    let (program, max_bars) = match (preset_id, formula) {
        (Some(id), None) => {
            let preset = match presets::find(id) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(&e);
                }
            };
            eprintln!("Using preset: {} ({})", preset.name, preset.id);
            match preset.compile(&params) {
                Ok(p) => (p, preset.data_days.max(config_max_bars)),
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(&e);
                }
            }
        }
        (None, Some(text)) => match Program::compile(text) {
            Ok(p) => (p, config_max_bars),
            Err(e) => {
                report_formula_error(&e, text);
                return ExitCode::from(&SifterError::from(e));
            }
        },
        _ => {
            eprintln!("error: exactly one of --preset or --formula is required");
            return ExitCode::from(2);
        }
    };

    // Stage 3: Start the run and poll until it finishes
    let adapter = Arc::new(CsvDataAdapter::new(data_path));
    let manager = RunManager::new(Arc::clone(&adapter) as Arc<dyn BarPort>, adapter);

    let run_id = match manager.start_run(program, market, max_bars, min_bars) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(&e);
        }
    };

    let snapshot = loop {
        let snapshot = match manager.status(run_id) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };
        if snapshot.status.is_terminal() {
            break snapshot;
        }
        eprintln!(
            "  {}/{} processed, {} matched",
            snapshot.processed, snapshot.total, snapshot.matched
        );
        thread::sleep(Duration::from_millis(200));
    };

    if snapshot.status == RunStatus::Failed {
        let reason = snapshot.error.unwrap_or_else(|| "unknown".to_string());
        eprintln!("error: screen run failed: {reason}");
        return ExitCode::from(3);
    }

    eprintln!(
        "Scan {}: {} processed, {} matched, {} skipped",
        snapshot.status, snapshot.processed, snapshot.matched, snapshot.skipped
    );

    // Stage 4: Print matches
    let results = match manager.results(run_id, sort_by, order) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(&e);
        }
    };
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for r in &results {
        if let Err(e) = writer.serialize(r) {
            eprintln!("error: failed to write results: {e}");
            return ExitCode::from(1);
        }
    }
    if let Err(e) = writer.flush() {
        eprintln!("error: failed to write results: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn report_formula_error(err: &FormulaError, text: &str) {
    match err {
        FormulaError::Syntax(parse) => {
            eprintln!("error: {}", parse.display_with_context(text));
        }
        other => eprintln!("error: {other}"),
    }
}

fn run_check(formula: &str) -> ExitCode {
    match Program::compile(formula) {
        Ok(_) => {
            eprintln!("Formula is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_formula_error(&e, formula);
            ExitCode::from(&SifterError::from(e))
        }
    }
}

fn run_presets() -> ExitCode {
    for preset in PRESETS {
        println!("{} [{}]", preset.id, preset.category);
        println!("  {}", preset.name);
        println!("  {}", preset.description);
        for p in preset.params {
            println!(
                "  param {}: {} (default {}, range {}..={})",
                p.key, p.label, p.default, p.min, p.max
            );
        }
    }
    ExitCode::SUCCESS
}
