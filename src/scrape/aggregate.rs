use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{SourceError, StoreError, ValidationError};
use crate::models::job::UpsertOutcome;
use crate::models::run::RunReport;

/// Collects failures from concurrently running adapters, in arrival order.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Mutex<Vec<String>>,
}

impl ErrorAggregator {
    pub fn push(&self, message: String) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    pub fn source_failed(&self, source: &str, err: &SourceError) {
        self.push(format!("{source}: {err}"));
    }

    pub fn posting_skipped(
        &self,
        source: &str,
        index: usize,
        job_id: Option<&str>,
        err: &ValidationError,
    ) {
        self.push(format!(
            "{source}: skipped posting {} ({}): {err}",
            index + 1,
            job_id.unwrap_or("no id")
        ));
    }

    pub fn store_failed(&self, source: &str, err: &StoreError) {
        self.push(format!("{source}: store failure: {err}"));
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Live counters and errors of the open run, shared by adapter tasks.
#[derive(Debug, Default)]
pub struct RunTally {
    count_unchanged_as_updated: bool,
    added: AtomicU32,
    updated: AtomicU32,
    unchanged: AtomicU32,
    pub errors: ErrorAggregator,
}

impl RunTally {
    pub fn new(count_unchanged_as_updated: bool) -> Self {
        Self {
            count_unchanged_as_updated,
            ..Self::default()
        }
    }

    pub fn record(&self, outcome: UpsertOutcome) {
        let counter = match outcome {
            UpsertOutcome::Added => &self.added,
            UpsertOutcome::Updated => &self.updated,
            UpsertOutcome::Unchanged if self.count_unchanged_as_updated => &self.updated,
            UpsertOutcome::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy counters and errors into `report`.
    pub fn fill(&self, report: &mut RunReport) {
        report.jobs_added = self.added.load(Ordering::Relaxed);
        report.jobs_updated = self.updated.load(Ordering::Relaxed);
        report.jobs_unchanged = self.unchanged.load(Ordering::Relaxed);
        report.errors = self.errors.snapshot();
    }
}
