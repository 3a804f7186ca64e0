use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::error::{SourceError, StoreError, TriggerError};
use crate::models::run::{RunPhase, RunProgress, RunReport, RunStatus};
use crate::scrape::aggregate::RunTally;
use crate::scrape::normalize::normalize;
use crate::sources::SourceAdapter;
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fetch_timeout: Duration,
    pub max_jobs_limit: u32,
    pub count_unchanged_as_updated: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
            max_jobs_limit: 50,
            count_unchanged_as_updated: true,
        }
    }
}

struct OpenRun {
    report: RunReport,
    tally: Arc<RunTally>,
}

struct RunState {
    phase: RunPhase,
    progress: Option<RunProgress>,
    open: Option<OpenRun>,
    last_report: Option<RunReport>,
}

enum SourceOutcome {
    Finished,
    StoreFailed,
}

/// Handle to a run accepted by [`RunCoordinator::trigger`]. Dropping it does
/// not cancel the run.
pub struct RunHandle(JoinHandle<RunReport>);

impl RunHandle {
    pub async fn finished(self) -> Result<RunReport, JoinError> {
        self.0.await
    }
}

/// Owns the run lifecycle: at most one run at a time, every configured
/// source fanned out per run, results folded into one report.
pub struct RunCoordinator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn JobStore>,
    settings: RunSettings,
    state: Mutex<RunState>,
}

impl RunCoordinator {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn JobStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            sources,
            store,
            settings,
            state: Mutex::new(RunState {
                phase: RunPhase::Idle,
                progress: None,
                open: None,
                last_report: None,
            }),
        }
    }

    pub fn max_jobs_limit(&self) -> u32 {
        self.settings.max_jobs_limit
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the last persisted report so status survives restarts.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let report = self.store.last_run_report().await?;
        if let Some(report) = &report {
            tracing::info!(
                "Restored last run {} ({})",
                report.id,
                report.status.as_str()
            );
        }
        self.state().last_report = report;
        Ok(())
    }

    pub fn status(&self) -> RunStatus {
        let state = self.state();
        let report = match &state.open {
            Some(open) => {
                let mut live = open.report.clone();
                open.tally.fill(&mut live);
                Some(live)
            }
            None => state.last_report.clone(),
        };
        RunStatus {
            state: state.phase,
            progress: state.progress,
            report,
        }
    }

    /// Start a run unless one is already in progress.
    pub fn trigger(self: &Arc<Self>, max_jobs: u32) -> Result<RunHandle, TriggerError> {
        if max_jobs == 0 || max_jobs > self.settings.max_jobs_limit {
            return Err(TriggerError::InvalidLimit(self.settings.max_jobs_limit));
        }

        let report = RunReport::open(max_jobs);
        let tally = Arc::new(RunTally::new(self.settings.count_unchanged_as_updated));
        {
            let mut state = self.state();
            if state.phase == RunPhase::Running {
                tracing::warn!("Rejected trigger: run already in progress");
                return Err(TriggerError::ConcurrentRunRejected);
            }
            state.phase = RunPhase::Running;
            state.progress = Some(RunProgress {
                adapters_completed: 0,
                adapters_total: self.sources.len(),
            });
            state.open = Some(OpenRun {
                report: report.clone(),
                tally: tally.clone(),
            });
        }

        let coordinator = Arc::clone(self);
        Ok(RunHandle(tokio::spawn(async move {
            coordinator.execute(report, tally).await
        })))
    }

    async fn execute(&self, mut report: RunReport, tally: Arc<RunTally>) -> RunReport {
        let limit = report.max_jobs_per_company as usize;
        tracing::info!(
            "Run {} started: {} sources, at most {limit} jobs each",
            report.id,
            self.sources.len()
        );

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            tasks.spawn(run_source(
                source.clone(),
                self.store.clone(),
                tally.clone(),
                limit,
                self.settings.fetch_timeout,
            ));
        }

        let mut aborting = false;
        let mut cancelled = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(SourceOutcome::Finished) => {}
                Ok(SourceOutcome::StoreFailed) => {
                    if !aborting {
                        aborting = true;
                        tasks.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => cancelled += 1,
                Err(e) => tally.errors.push(format!("source task failed: {e}")),
            }
            if let Some(progress) = self.state().progress.as_mut() {
                progress.adapters_completed += 1;
            }
        }
        if cancelled > 0 {
            tally.errors.push(format!(
                "run aborted after store failure: {cancelled} source(s) cancelled"
            ));
        }

        tally.fill(&mut report);
        report.finished_at = Some(Utc::now());
        report.status = if report.errors.is_empty() {
            RunPhase::Completed
        } else {
            RunPhase::Failed
        };

        if let Err(e) = self.store.save_run_report(&report).await {
            tracing::error!("Failed to persist run report {}: {e}", report.id);
            report.errors.push(format!("failed to persist run report: {e}"));
            report.status = RunPhase::Failed;
        }

        tracing::info!(
            "Run {} {}: {} added, {} updated, {} unchanged, {} errors",
            report.id,
            report.status.as_str(),
            report.jobs_added,
            report.jobs_updated,
            report.jobs_unchanged,
            report.errors.len()
        );

        let mut state = self.state();
        state.phase = report.status;
        state.progress = None;
        state.open = None;
        state.last_report = Some(report.clone());
        report
    }
}

/// Fetch one source and upsert its postings in the order produced.
async fn run_source(
    source: Arc<dyn SourceAdapter>,
    store: Arc<dyn JobStore>,
    tally: Arc<RunTally>,
    limit: usize,
    timeout: Duration,
) -> SourceOutcome {
    let name = source.name().to_string();

    let postings = match tokio::time::timeout(timeout, source.fetch(limit)).await {
        Ok(Ok(postings)) => postings,
        Ok(Err(e)) => {
            tracing::warn!("{name}: fetch failed: {e}");
            tally.errors.source_failed(&name, &e);
            return SourceOutcome::Finished;
        }
        Err(_) => {
            let e = SourceError::Timeout(timeout);
            tracing::warn!("{name}: {e}");
            tally.errors.source_failed(&name, &e);
            return SourceOutcome::Finished;
        }
    };

    let company = source.company();
    let mut stored = 0usize;
    for (index, raw) in postings.into_iter().take(limit).enumerate() {
        let job_id = raw.job_id.clone();
        let job = match normalize(raw, &company, Utc::now()) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("{name}: skipping posting {index}: {e}");
                tally
                    .errors
                    .posting_skipped(&name, index, job_id.as_deref(), &e);
                continue;
            }
        };

        match store.upsert_job(&job).await {
            Ok(outcome) => {
                tally.record(outcome);
                stored += 1;
            }
            Err(e) => {
                tracing::error!("{name}: failed to upsert job {}: {e}", job.job_id);
                tally.errors.store_failed(&name, &e);
                return SourceOutcome::StoreFailed;
            }
        }
    }

    tracing::info!("{name}: {stored} postings stored");
    SourceOutcome::Finished
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::models::company::{Company, CompanyProfile};
    use crate::models::job::{Job, NewJob, UpsertOutcome};
    use crate::sources::RawPosting;
    use crate::store::MemoryStore;
    use crate::store::query::JobFilters;

    fn posting(id: &str, salary: &str) -> RawPosting {
        RawPosting {
            job_id: Some(id.to_string()),
            title: Some(format!("Engineer {id}")),
            location: Some("Bengaluru".to_string()),
            description: Some("Build things".to_string()),
            detail_url: Some(format!("https://example.com/{id}")),
            salary: Some(salary.to_string()),
            skills: vec!["Rust".to_string()],
            posted: Some("2026-10-01".to_string()),
            ..RawPosting::default()
        }
    }

    struct StaticSource {
        name: &'static str,
        postings: Vec<RawPosting>,
    }

    #[async_trait]
    impl SourceAdapter for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        fn company(&self) -> CompanyProfile {
            CompanyProfile::named(self.name)
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawPosting>, SourceError> {
            Ok(self.postings.clone())
        }
    }

    struct FailingSource(&'static str);

    #[async_trait]
    impl SourceAdapter for FailingSource {
        fn name(&self) -> &str {
            self.0
        }

        fn company(&self) -> CompanyProfile {
            CompanyProfile::named(self.0)
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawPosting>, SourceError> {
            Err(SourceError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
        }
    }

    /// Blocks in `fetch` until released, or sleeps far past any test timeout.
    struct GatedSource {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SourceAdapter for GatedSource {
        fn name(&self) -> &str {
            "gated"
        }

        fn company(&self) -> CompanyProfile {
            CompanyProfile::named("Gated")
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawPosting>, SourceError> {
            self.gate.notified().await;
            Ok(vec![posting("gated-1", "Not disclosed")])
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl JobStore for BrokenStore {
        async fn upsert_job(&self, _job: &NewJob) -> Result<UpsertOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn list_jobs(&self, _filters: &JobFilters) -> Result<Vec<Job>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_job(&self, _id: i32) -> Result<Option<Job>, StoreError> {
            Ok(None)
        }
        async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_company(&self, _id: i32) -> Result<Option<Company>, StoreError> {
            Ok(None)
        }
        async fn save_run_report(&self, _report: &RunReport) -> Result<(), StoreError> {
            Ok(())
        }
        async fn last_run_report(&self) -> Result<Option<RunReport>, StoreError> {
            Ok(None)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn shared(source: impl SourceAdapter + 'static) -> Arc<dyn SourceAdapter> {
        Arc::new(source)
    }

    fn three_postings(salary_of_second: &str) -> Vec<RawPosting> {
        vec![
            posting("j1", "10 Lacs PA"),
            posting("j2", salary_of_second),
            posting("j3", "Not disclosed"),
        ]
    }

    fn coordinator(
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn JobStore>,
    ) -> Arc<RunCoordinator> {
        Arc::new(RunCoordinator::new(sources, store, RunSettings::default()))
    }

    async fn run(coordinator: &Arc<RunCoordinator>, max_jobs: u32) -> RunReport {
        coordinator
            .trigger(max_jobs)
            .unwrap()
            .finished()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn partial_failure_counts_successes_and_fails_the_run() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(
            vec![
                shared(StaticSource {
                    name: "ola",
                    postings: three_postings("12 Lacs PA"),
                }),
                shared(FailingSource("swiggy")),
            ],
            store.clone(),
        );

        let report = run(&c, 5).await;
        assert_eq!(report.jobs_added, 3);
        assert_eq!(report.jobs_updated, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("swiggy: "));
        assert_eq!(report.status, RunPhase::Failed);

        let status = c.status();
        assert_eq!(status.state, RunPhase::Failed);
        assert_eq!(status.progress, None);
        assert_eq!(status.report, Some(report.clone()));
        assert_eq!(store.last_run_report().await.unwrap(), Some(report));
    }

    #[tokio::test]
    async fn rerun_updates_and_keeps_first_scrape_time() {
        let store = Arc::new(MemoryStore::new());
        let first = coordinator(
            vec![shared(StaticSource {
                name: "ola",
                postings: three_postings("12 Lacs PA"),
            })],
            store.clone(),
        );
        let report = run(&first, 5).await;
        assert_eq!(report.status, RunPhase::Completed);
        assert!(report.errors.is_empty());
        let before = store.list_jobs(&JobFilters::default()).await.unwrap();

        let second = coordinator(
            vec![shared(StaticSource {
                name: "ola",
                postings: three_postings("15 Lacs PA"),
            })],
            store.clone(),
        );
        let report = run(&second, 5).await;
        assert_eq!((report.jobs_added, report.jobs_updated), (0, 3));
        assert_eq!(report.status, RunPhase::Completed);

        let after = store.list_jobs(&JobFilters::default()).await.unwrap();
        assert_eq!(after.len(), 3);
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.job_id, a.job_id);
            assert_eq!(b.date_scraped, a.date_scraped);
        }
        let j2 = after.iter().find(|j| j.job_id == "j2").unwrap();
        assert_eq!(j2.salary, "15 Lacs PA");
    }

    #[tokio::test]
    async fn unchanged_rescrapes_can_be_counted_separately() {
        let store = Arc::new(MemoryStore::new());
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![shared(StaticSource {
            name: "ola",
            postings: three_postings("12 Lacs PA"),
        })];
        let settings = RunSettings {
            count_unchanged_as_updated: false,
            ..RunSettings::default()
        };
        let c = Arc::new(RunCoordinator::new(sources, store.clone(), settings));
        run(&c, 5).await;

        let report = run(&c, 5).await;
        assert_eq!(
            (report.jobs_added, report.jobs_updated, report.jobs_unchanged),
            (0, 0, 3)
        );
    }

    #[tokio::test]
    async fn second_trigger_while_running_is_rejected() {
        let gate = Arc::new(Notify::new());
        let c = coordinator(
            vec![shared(GatedSource { gate: gate.clone() })],
            Arc::new(MemoryStore::new()),
        );

        let handle = c.trigger(5).unwrap();
        assert!(matches!(
            c.trigger(5),
            Err(TriggerError::ConcurrentRunRejected)
        ));

        let status = c.status();
        assert_eq!(status.state, RunPhase::Running);
        assert_eq!(
            status.progress,
            Some(RunProgress {
                adapters_completed: 0,
                adapters_total: 1
            })
        );
        assert_eq!(status.report.as_ref().map(|r| r.max_jobs_per_company), Some(5));

        gate.notify_one();
        let report = handle.finished().await.unwrap();
        assert_eq!(report.jobs_added, 1);
        assert_eq!(c.status().state, RunPhase::Completed);

        gate.notify_one();
        assert!(c.trigger(5).is_ok());
    }

    #[tokio::test]
    async fn progress_counts_finished_sources_mid_run() {
        let gate = Arc::new(Notify::new());
        let c = coordinator(
            vec![
                shared(GatedSource { gate: gate.clone() }),
                shared(StaticSource {
                    name: "ola",
                    postings: three_postings("x"),
                }),
            ],
            Arc::new(MemoryStore::new()),
        );
        let handle = c.trigger(5).unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = c.status();
                if status.progress.is_some_and(|p| p.adapters_completed > 0) {
                    return status;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(status.state, RunPhase::Running);
        assert_eq!(
            status.progress,
            Some(RunProgress {
                adapters_completed: 1,
                adapters_total: 2
            })
        );
        assert_eq!(status.report.map(|r| r.jobs_added), Some(3));

        gate.notify_one();
        let report = handle.finished().await.unwrap();
        assert_eq!(report.jobs_added, 4);
        assert_eq!(c.status().progress, None);
    }

    #[tokio::test]
    async fn all_sources_failing() {
        let c = coordinator(
            vec![
                shared(FailingSource("ola")),
                shared(FailingSource("swiggy")),
                shared(FailingSource("zepto")),
            ],
            Arc::new(MemoryStore::new()),
        );
        let report = run(&c, 3).await;
        assert_eq!((report.jobs_added, report.jobs_updated), (0, 0));
        assert_eq!(report.status, RunPhase::Failed);
        assert_eq!(report.errors.len(), 3);
    }

    #[tokio::test]
    async fn invalid_postings_are_skipped_individually() {
        let mut postings = three_postings("12 Lacs PA");
        postings[1].description = None;
        let c = coordinator(
            vec![shared(StaticSource {
                name: "zepto",
                postings,
            })],
            Arc::new(MemoryStore::new()),
        );
        let report = run(&c, 5).await;
        assert_eq!(report.jobs_added, 2);
        assert_eq!(
            report.errors,
            vec!["zepto: skipped posting 2 (j2): missing required field(s): description"]
        );
        assert_eq!(report.status, RunPhase::Failed);
    }

    #[tokio::test]
    async fn limit_applies_even_to_oversized_batches() {
        let postings = (0..10).map(|i| posting(&format!("p{i}"), "x")).collect();
        let c = coordinator(
            vec![shared(StaticSource {
                name: "ola",
                postings,
            })],
            Arc::new(MemoryStore::new()),
        );
        let report = run(&c, 3).await;
        assert_eq!(report.jobs_added, 3);
    }

    #[tokio::test]
    async fn slow_source_times_out_without_blocking_others() {
        let store = Arc::new(MemoryStore::new());
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![
            shared(GatedSource {
                gate: Arc::new(Notify::new()),
            }),
            shared(StaticSource {
                name: "ola",
                postings: three_postings("x"),
            }),
        ];
        let settings = RunSettings {
            fetch_timeout: Duration::from_millis(50),
            ..RunSettings::default()
        };
        let c = Arc::new(RunCoordinator::new(sources, store, settings));
        let report = run(&c, 5).await;
        assert_eq!(report.jobs_added, 3);
        assert_eq!(report.errors, vec!["gated: timed out after 50ms"]);
    }

    #[tokio::test]
    async fn store_failure_fails_the_run() {
        let c = coordinator(
            vec![shared(StaticSource {
                name: "ola",
                postings: three_postings("x"),
            })],
            Arc::new(BrokenStore),
        );
        let report = run(&c, 5).await;
        assert_eq!(report.status, RunPhase::Failed);
        assert_eq!(report.jobs_added, 0);
        assert_eq!(
            report.errors,
            vec!["ola: store failure: Store unavailable: connection refused"]
        );
    }

    #[tokio::test]
    async fn rejects_out_of_range_limits() {
        let c = coordinator(vec![], Arc::new(MemoryStore::new()));
        assert_eq!(c.trigger(0).err(), Some(TriggerError::InvalidLimit(50)));
        assert_eq!(c.trigger(51).err(), Some(TriggerError::InvalidLimit(50)));
        assert_eq!(c.status().state, RunPhase::Idle);
    }

    #[tokio::test]
    async fn restore_loads_last_report() {
        let store = Arc::new(MemoryStore::new());
        let c = coordinator(vec![shared(FailingSource("ola"))], store.clone());
        let report = run(&c, 3).await;

        let fresh = coordinator(vec![], store);
        fresh.restore().await.unwrap();
        let status = fresh.status();
        assert_eq!(status.state, RunPhase::Idle);
        assert_eq!(status.report, Some(report));
    }
}
