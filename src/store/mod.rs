pub mod memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::company::Company;
use crate::models::job::{Job, NewJob, UpsertOutcome};
use crate::models::run::RunReport;
use crate::store::query::JobFilters;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for jobs, companies, skills and the last run report.
///
/// `upsert_job` must be atomic per `job_id`: concurrent callers with the
/// same identifier end with one record, and exactly one of them sees
/// `Added`. Readers must not wait behind a writer for longer than a single
/// upsert.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn upsert_job(&self, job: &NewJob) -> Result<UpsertOutcome, StoreError>;

    async fn list_jobs(&self, filters: &JobFilters) -> Result<Vec<Job>, StoreError>;

    async fn get_job(&self, id: i32) -> Result<Option<Job>, StoreError>;

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError>;

    async fn get_company(&self, id: i32) -> Result<Option<Company>, StoreError>;

    async fn save_run_report(&self, report: &RunReport) -> Result<(), StoreError>;

    async fn last_run_report(&self) -> Result<Option<RunReport>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
