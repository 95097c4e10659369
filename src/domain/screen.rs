//! Screening runs over a security universe.
//!
//! A [`RunManager`] owns the ports and runs at most one scan at a time on a
//! background thread. Callers poll [`RunManager::status`] for progress and
//! collect [`RunManager::results`] when the run reaches a terminal state.
//! Cancellation is cooperative: [`RunManager::cancel`] raises a flag that the
//! worker checks before each security.

use crate::domain::bar::BarSeries;
use crate::domain::error::SifterError;
use crate::domain::program::Program;
use crate::domain::security::Security;
use crate::ports::bar_port::BarPort;
use crate::ports::directory_port::DirectoryPort;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Securities with fewer bars than this are skipped rather than evaluated.
pub const MIN_BARS: usize = 30;

/// Securities to process between cooperative yields of the worker thread.
const YIELD_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }

    fn as_u8(self) -> u8 {
        match self {
            RunStatus::Running => 0,
            RunStatus::Completed => 1,
            RunStatus::Cancelled => 2,
            RunStatus::Failed => 3,
        }
    }

    fn from_u8(raw: u8) -> RunStatus {
        match raw {
            0 => RunStatus::Running,
            1 => RunStatus::Completed,
            2 => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One matching security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenResult {
    pub code: String,
    pub name: String,
    pub market: String,
    pub trade_date: chrono::NaiveDate,
    pub close: f64,
    pub change_pct: f64,
    pub volume: f64,
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub run_id: u64,
    pub status: RunStatus,
    pub total: usize,
    pub processed: usize,
    pub matched: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Code,
    Close,
    ChangePct,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// State shared between the worker thread and observers. Counters are
/// updated so that `matched <= processed <= total` holds for any observer
/// at any time: `processed` is bumped before the security is evaluated.
struct RunShared {
    id: u64,
    status: AtomicU8,
    cancel: AtomicBool,
    total: AtomicUsize,
    processed: AtomicUsize,
    matched: AtomicUsize,
    skipped: AtomicUsize,
    error: Mutex<Option<String>>,
    results: Mutex<Vec<ScreenResult>>,
}

impl RunShared {
    fn new(id: u64) -> RunShared {
        RunShared {
            id,
            status: AtomicU8::new(RunStatus::Running.as_u8()),
            cancel: AtomicBool::new(false),
            total: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            matched: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            error: Mutex::new(None),
            results: Mutex::new(Vec::new()),
        }
    }

    fn status(&self) -> RunStatus {
        RunStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn finish(&self, status: RunStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    fn fail(&self, message: String) {
        *self.error.lock() = Some(message);
        self.finish(RunStatus::Failed);
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            run_id: self.id,
            status: self.status(),
            total: self.total.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            matched: self.matched.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            error: self.error.lock().clone(),
        }
    }
}

/// Coordinates screening runs. Holds at most the latest run; starting a new
/// one while the previous is still running is rejected.
pub struct RunManager {
    bars: Arc<dyn BarPort>,
    directory: Arc<dyn DirectoryPort>,
    next_id: AtomicU64,
    current: Mutex<Option<Arc<RunShared>>>,
}

impl RunManager {
    pub fn new(bars: Arc<dyn BarPort>, directory: Arc<dyn DirectoryPort>) -> RunManager {
        RunManager {
            bars,
            directory,
            next_id: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// Start a screening run on a background thread and return its id.
    /// Fails with [`SifterError::RunConflict`] while a run is in flight.
    pub fn start_run(
        &self,
        program: Program,
        market: Option<String>,
        max_bars: usize,
        min_bars: usize,
    ) -> Result<u64, SifterError> {
        let mut current = self.current.lock();
        if let Some(run) = current.as_ref() {
            if !run.status().is_terminal() {
                return Err(SifterError::RunConflict);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(RunShared::new(id));
        *current = Some(Arc::clone(&shared));
        drop(current);

        info!(run_id = id, market = market.as_deref(), "screening run started");

        let bars = Arc::clone(&self.bars);
        let directory = Arc::clone(&self.directory);
        let worker = Arc::clone(&shared);
        thread::spawn(move || {
            let guard = Arc::clone(&worker);
            let outcome = catch_unwind(AssertUnwindSafe(move || {
                run_scan(&worker, &*bars, &*directory, &program, market.as_deref(), max_bars, min_bars);
            }));
            if outcome.is_err() {
                warn!(run_id = id, "screening worker panicked");
                guard.fail("internal error in screening worker".to_string());
            }
        });

        Ok(id)
    }

    fn run(&self, id: u64) -> Result<Arc<RunShared>, SifterError> {
        self.current
            .lock()
            .as_ref()
            .filter(|run| run.id == id)
            .cloned()
            .ok_or(SifterError::UnknownRun(id))
    }

    pub fn status(&self, id: u64) -> Result<StatusSnapshot, SifterError> {
        Ok(self.run(id)?.snapshot())
    }

    /// Request cancellation. Idempotent; a no-op once the run is terminal.
    /// Returns whether the run was still live when the flag was raised.
    pub fn cancel(&self, id: u64) -> Result<bool, SifterError> {
        let run = self.run(id)?;
        let live = !run.status().is_terminal();
        run.cancel.store(true, Ordering::Release);
        if live {
            info!(run_id = id, "cancellation requested");
        }
        Ok(live)
    }

    /// Matches collected so far, sorted. Valid to call mid-run; the returned
    /// vector is a copy.
    pub fn results(
        &self,
        id: u64,
        sort_by: SortField,
        order: SortOrder,
    ) -> Result<Vec<ScreenResult>, SifterError> {
        let run = self.run(id)?;
        let mut results = run.results.lock().clone();
        results.sort_by(|a, b| {
            let ord = match sort_by {
                SortField::Code => a.code.cmp(&b.code),
                SortField::Close => a.close.total_cmp(&b.close),
                SortField::ChangePct => a.change_pct.total_cmp(&b.change_pct),
                SortField::Volume => a.volume.total_cmp(&b.volume),
            };
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        Ok(results)
    }
}

fn run_scan(
    shared: &RunShared,
    bars: &dyn BarPort,
    directory: &dyn DirectoryPort,
    program: &Program,
    market: Option<&str>,
    max_bars: usize,
    min_bars: usize,
) {
    let universe = match directory.list_universe(market) {
        Ok(universe) => universe,
        Err(err) => {
            warn!(run_id = shared.id, error = %err, "universe listing failed");
            shared.fail(err.to_string());
            return;
        }
    };
    shared.total.store(universe.len(), Ordering::Release);
    info!(run_id = shared.id, total = universe.len(), "universe resolved");

    for (i, security) in universe.iter().enumerate() {
        if shared.cancel.load(Ordering::Acquire) {
            info!(
                run_id = shared.id,
                processed = i,
                "screening run cancelled"
            );
            shared.finish(RunStatus::Cancelled);
            return;
        }
        shared.processed.store(i + 1, Ordering::Release);

        match evaluate_security(bars, program, security, max_bars, min_bars) {
            Ok(Some(result)) => {
                shared.results.lock().push(result);
                shared.matched.fetch_add(1, Ordering::Release);
            }
            Ok(None) => {}
            Err(Skip::InsufficientData { bars, minimum }) => {
                debug!(
                    run_id = shared.id,
                    code = %security.code,
                    bars,
                    minimum,
                    "skipped: not enough history"
                );
                shared.skipped.fetch_add(1, Ordering::Release);
            }
            Err(Skip::Error(err)) => {
                // One bad security never sinks the scan.
                debug!(run_id = shared.id, code = %security.code, error = %err, "skipped: evaluation failed");
                shared.skipped.fetch_add(1, Ordering::Release);
            }
        }

        if (i + 1) % YIELD_EVERY == 0 {
            thread::yield_now();
        }
    }

    info!(
        run_id = shared.id,
        matched = shared.matched.load(Ordering::Acquire),
        skipped = shared.skipped.load(Ordering::Acquire),
        "screening run completed"
    );
    shared.finish(RunStatus::Completed);
}

enum Skip {
    InsufficientData { bars: usize, minimum: usize },
    Error(SifterError),
}

fn evaluate_security(
    bars: &dyn BarPort,
    program: &Program,
    security: &Security,
    max_bars: usize,
    min_bars: usize,
) -> Result<Option<ScreenResult>, Skip> {
    let series = bars
        .fetch_bars(&security.code, max_bars)
        .map_err(Skip::Error)?;
    if series.len() < min_bars {
        return Err(Skip::InsufficientData {
            bars: series.len(),
            minimum: min_bars,
        });
    }

    let matched = program
        .matches(&series)
        .map_err(|err| Skip::Error(err.into()))?;
    if !matched {
        return Ok(None);
    }
    Ok(Some(to_result(security, &series)))
}

fn to_result(security: &Security, series: &BarSeries) -> ScreenResult {
    let last = series.last().expect("length checked against min_bars");
    ScreenResult {
        code: security.code.clone(),
        name: security.name.clone(),
        market: security.market.clone(),
        trade_date: last.date,
        close: last.close,
        change_pct: series.last_change_pct(),
        volume: last.volume,
    }
}
