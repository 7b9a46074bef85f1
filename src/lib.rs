//! yarabatch: run a YARA checker against one target, once per rule file.
//!
//! Rule files are discovered recursively, dispatched onto a bounded pool of
//! worker threads, and every invocation is folded into a [`ScanOutcome`] so
//! a failing rule never aborts the batch.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use yarabatch::{dispatch::Interrupt, preflight, run_batch, BatchOptions};
//!
//! let options = BatchOptions {
//!     target: PathBuf::from("sample.exe"),
//!     rules_dir: PathBuf::from("rules"),
//!     checker: PathBuf::from("yara64.exe"),
//!     threads: 4,
//!     timeout: None,
//! };
//! let tasks = preflight(&options).unwrap();
//! if let Some(report) = run_batch(tasks, &options, &Interrupt::new(), |_| {}) {
//!     println!("{} of {} rules matched", report.matched_count(), report.outcomes.len());
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod rules;
pub mod scan;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use dispatch::{BatchRun, Dispatcher, Interrupt};
use error::{BatchError, Result};
use rules::RuleTask;
use scan::{ScanOutcome, YaraInvoker};

/// Inputs for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// The single file every rule is applied to.
    pub target: PathBuf,
    /// Directory searched recursively for `.yar` / `.yara` files.
    pub rules_dir: PathBuf,
    /// Checker executable.
    pub checker: PathBuf,
    /// Maximum number of checker processes at once.
    pub threads: usize,
    /// Per-invocation timeout.
    pub timeout: Option<Duration>,
}

/// A finished batch and the context it ran in.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub target: PathBuf,
    pub target_sha256: Option<String>,
    pub checker: PathBuf,
    pub threads: usize,
    /// One outcome per rule file, in completion order.
    pub outcomes: Vec<ScanOutcome>,
}

impl BatchReport {
    pub fn matched_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.matched).count()
    }
}

/// Validate inputs and discover rule files. Nothing is spawned here.
pub fn preflight(options: &BatchOptions) -> Result<Vec<RuleTask>> {
    if !options.target.is_file() {
        return Err(BatchError::TargetNotFound(options.target.clone()));
    }
    if !options.checker.is_file() {
        return Err(BatchError::CheckerNotFound(options.checker.clone()));
    }
    if !options.rules_dir.is_dir() {
        return Err(BatchError::RulesDirNotFound(options.rules_dir.clone()));
    }

    let tasks = rules::discover(&options.rules_dir)?;
    if tasks.is_empty() {
        return Err(BatchError::NoRules(options.rules_dir.clone()));
    }
    Ok(tasks)
}

/// Run the checker once per task. Returns `None` if interrupted, in which
/// case everything collected so far is dropped.
pub fn run_batch<F>(
    tasks: Vec<RuleTask>,
    options: &BatchOptions,
    interrupt: &Interrupt,
    on_outcome: F,
) -> Option<BatchReport>
where
    F: FnMut(&ScanOutcome),
{
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let clock = Instant::now();

    let invoker = YaraInvoker::new(&options.checker, &options.target).with_timeout(options.timeout);
    let dispatcher = Dispatcher::new(Arc::new(invoker), options.threads);
    tracing::info!(%run_id, rules = tasks.len(), threads = dispatcher.concurrency(), "batch started");

    let outcomes = match dispatcher.run(tasks, interrupt, on_outcome) {
        BatchRun::Completed(outcomes) => outcomes,
        BatchRun::Interrupted { collected } => {
            tracing::info!(%run_id, collected, "batch abandoned");
            return None;
        }
    };
    let elapsed = clock.elapsed();

    let target_sha256 = match sha256_file(&options.target) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!(target = %options.target.display(), error = %e, "could not hash target");
            None
        }
    };

    Some(BatchReport {
        run_id,
        started_at,
        elapsed,
        target: options.target.clone(),
        target_sha256,
        checker: options.checker.clone(),
        threads: dispatcher.concurrency(),
        outcomes,
    })
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::scan::OutcomeStatus;

    /// Three outcomes covering a match, a clean miss, and a checker failure.
    pub fn sample_report() -> BatchReport {
        let target = Path::new("/samples/target.exe");
        let outcome = |rule: &str, status, stdout: &str, stderr: &str| {
            ScanOutcome::from_output(&RuleTask::new(rule), target, status, stdout, stderr)
        };
        BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
            target: target.to_path_buf(),
            target_sha256: None,
            checker: PathBuf::from("yara64.exe"),
            threads: 4,
            outcomes: vec![
                outcome("rules/a.yar", OutcomeStatus::Completed, "MATCH", ""),
                outcome("rules/b.yara", OutcomeStatus::Completed, "", ""),
                outcome(
                    "rules/c.yar",
                    OutcomeStatus::ExitFailure { code: Some(1) },
                    "",
                    "parse error",
                ),
            ],
        }
    }
}
