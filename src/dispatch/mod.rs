//! Bounded fan-out of checker invocations and fan-in of their outcomes.
//!
//! A fixed set of worker threads pulls jobs from one shared queue, so at most
//! `concurrency` checker processes exist at any time. Every task yields
//! exactly one [`ScanOutcome`]: panics inside an invocation and workers that
//! die without reporting are both turned into `WorkerFault` outcomes.
//!
//! On interrupt the collector returns at once without joining workers and
//! drops whatever has not been collected. A run is either complete or
//! abandoned; there is no partial report.

mod interrupt;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{select, Receiver, Sender};

use crate::rules::RuleTask;
use crate::scan::{Invoke, OutcomeStatus, ScanOutcome};

pub use interrupt::Interrupt;

/// Outcomes in completion order.
pub type BatchResult = Vec<ScanOutcome>;

#[derive(Debug)]
pub enum BatchRun {
    Completed(BatchResult),
    /// Collection was abandoned; `collected` outcomes were dropped.
    Interrupted { collected: usize },
}

type Job = (usize, RuleTask);

pub struct Dispatcher {
    invoker: Arc<dyn Invoke>,
    concurrency: usize,
}

impl Dispatcher {
    /// `concurrency` of zero is treated as one.
    pub fn new(invoker: Arc<dyn Invoke>, concurrency: usize) -> Self {
        Self {
            invoker,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task once, calling `on_outcome` as each one is collected.
    pub fn run<F>(&self, tasks: Vec<RuleTask>, interrupt: &Interrupt, mut on_outcome: F) -> BatchRun
    where
        F: FnMut(&ScanOutcome),
    {
        if interrupt.is_triggered() {
            return BatchRun::Interrupted { collected: 0 };
        }
        if tasks.is_empty() {
            return BatchRun::Completed(Vec::new());
        }

        let total = tasks.len();
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, ScanOutcome)>();

        for (idx, task) in tasks.iter().cloned().enumerate() {
            let _ = job_tx.send((idx, task));
        }
        drop(job_tx);

        let worker_count = self.concurrency.min(total);
        let mut handles = Vec::with_capacity(worker_count);
        for worker_idx in 0..worker_count {
            let invoker = Arc::clone(&self.invoker);
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let interrupt = interrupt.clone();
            let spawned = thread::Builder::new()
                .name(format!("yarabatch-worker-{worker_idx}"))
                .spawn(move || work(invoker.as_ref(), jobs, results, &interrupt));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::error!(worker = worker_idx, error = %e, "failed to spawn worker"),
            }
        }
        drop(result_tx);
        tracing::debug!(tasks = total, workers = handles.len(), "dispatching");

        let mut seen = vec![false; total];
        let mut results: BatchResult = Vec::with_capacity(total);
        loop {
            // A ready result must not win over an interrupt that already fired.
            if interrupt.is_triggered() {
                return abandon(results.len(), total);
            }
            let next = select! {
                recv(result_rx) -> msg => Some(msg),
                recv(interrupt.receiver()) -> _ => None,
            };
            match next {
                Some(Ok((idx, outcome))) => {
                    seen[idx] = true;
                    on_outcome(&outcome);
                    results.push(outcome);
                }
                // Every worker has exited.
                Some(Err(_)) => break,
                None => return abandon(results.len(), total),
            }
        }

        // Workers also exit when they see the flag, closing the channel
        // before the interrupt arm is selected.
        if interrupt.is_triggered() {
            return abandon(results.len(), total);
        }

        for handle in handles {
            let _ = handle.join();
        }

        for (idx, task) in tasks.iter().enumerate() {
            if seen[idx] {
                continue;
            }
            tracing::warn!(rule = %task.rule_name, "no outcome reported for rule");
            let outcome = ScanOutcome::degraded(
                task,
                self.invoker.target(),
                OutcomeStatus::WorkerFault,
                "worker exited without reporting an outcome",
            );
            on_outcome(&outcome);
            results.push(outcome);
        }

        BatchRun::Completed(results)
    }
}

fn abandon(collected: usize, total: usize) -> BatchRun {
    tracing::info!(collected, total, "interrupted, abandoning batch");
    BatchRun::Interrupted { collected }
}

fn work(
    invoker: &dyn Invoke,
    jobs: Receiver<Job>,
    results: Sender<(usize, ScanOutcome)>,
    interrupt: &Interrupt,
) {
    for (idx, task) in jobs.iter() {
        if interrupt.is_triggered() {
            break;
        }
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| invoker.invoke(&task))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = format!("checker invocation panicked: {}", panic_message(payload.as_ref()));
                tracing::error!(rule = %task.rule_name, "{}", reason);
                ScanOutcome::degraded(&task, invoker.target(), OutcomeStatus::WorkerFault, reason)
            }
        };
        // The collector is gone after an interrupt.
        if results.send((idx, outcome)).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
