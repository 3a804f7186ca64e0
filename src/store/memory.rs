use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::models::company::{Company, CompanyProfile};
use crate::models::job::{Job, NewJob, Skill, UpsertOutcome};
use crate::models::run::RunReport;
use crate::store::JobStore;
use crate::store::query::{JobFilters, listing_order};

const SHARDS: usize = 16;

#[derive(Debug, Clone)]
struct StoredJob {
    id: i32,
    company_id: i32,
    title: String,
    experience: Option<String>,
    salary: String,
    location: String,
    description: String,
    detail_url: String,
    posted_date: Option<NaiveDate>,
    date_scraped: DateTime<Utc>,
    skills: Vec<String>,
    fingerprint: String,
}

/// Process-local store. Jobs live in lock-striped shards keyed by the
/// source identifier so upserts of different identifiers never contend and
/// readers only ever wait for one shard's critical section.
pub struct MemoryStore {
    shards: Vec<RwLock<HashMap<String, StoredJob>>>,
    hasher: RandomState,
    companies: RwLock<HashMap<String, Company>>,
    last_report: RwLock<Option<RunReport>>,
    next_job_id: AtomicI32,
    next_company_id: AtomicI32,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            companies: RwLock::new(HashMap::new()),
            last_report: RwLock::new(None),
            next_job_id: AtomicI32::new(1),
            next_company_id: AtomicI32::new(1),
        }
    }

    fn shard(&self, job_id: &str) -> &RwLock<HashMap<String, StoredJob>> {
        let idx = (self.hasher.hash_one(job_id) as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn upsert_company(&self, profile: &CompanyProfile) -> i32 {
        let mut companies = write(&self.companies);
        let company = companies.entry(profile.key()).or_insert_with(|| Company {
            id: self.next_company_id.fetch_add(1, Ordering::Relaxed),
            name: profile.name.trim().to_string(),
            rating: None,
            reviews: None,
            logo_url: None,
        });
        company.refresh(profile);
        company.id
    }

    fn company_by_id(&self) -> HashMap<i32, Company> {
        read(&self.companies)
            .values()
            .map(|c| (c.id, c.clone()))
            .collect()
    }

    fn hydrate(
        job_id: &str,
        stored: &StoredJob,
        companies: &HashMap<i32, Company>,
    ) -> Option<Job> {
        let company = companies.get(&stored.company_id)?.clone();
        Some(Job {
            id: stored.id,
            job_id: job_id.to_string(),
            title: stored.title.clone(),
            company,
            experience: stored.experience.clone(),
            salary: stored.salary.clone(),
            location: stored.location.clone(),
            description: stored.description.clone(),
            detail_url: stored.detail_url.clone(),
            posted_date: stored.posted_date,
            date_scraped: stored.date_scraped,
            skills: stored
                .skills
                .iter()
                .map(|s| Skill { skill: s.clone() })
                .collect(),
        })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert_job(&self, job: &NewJob) -> Result<UpsertOutcome, StoreError> {
        let company_id = self.upsert_company(&job.company);
        let fingerprint = job.fingerprint();

        let mut shard = write(self.shard(&job.job_id));
        let outcome = match shard.get_mut(&job.job_id) {
            Some(existing) => {
                let outcome = if existing.fingerprint == fingerprint {
                    UpsertOutcome::Unchanged
                } else {
                    UpsertOutcome::Updated
                };
                existing.company_id = company_id;
                existing.title.clone_from(&job.title);
                existing.experience.clone_from(&job.experience);
                existing.salary.clone_from(&job.salary);
                existing.location.clone_from(&job.location);
                existing.description.clone_from(&job.description);
                existing.detail_url.clone_from(&job.detail_url);
                existing.posted_date = job.posted_date;
                existing.skills.clone_from(&job.skills);
                existing.fingerprint = fingerprint;
                outcome
            }
            None => {
                shard.insert(
                    job.job_id.clone(),
                    StoredJob {
                        id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
                        company_id,
                        title: job.title.clone(),
                        experience: job.experience.clone(),
                        salary: job.salary.clone(),
                        location: job.location.clone(),
                        description: job.description.clone(),
                        detail_url: job.detail_url.clone(),
                        posted_date: job.posted_date,
                        date_scraped: job.scraped_at,
                        skills: job.skills.clone(),
                        fingerprint,
                    },
                );
                UpsertOutcome::Added
            }
        };
        Ok(outcome)
    }

    async fn list_jobs(&self, filters: &JobFilters) -> Result<Vec<Job>, StoreError> {
        let companies = self.company_by_id();
        let mut jobs = Vec::new();
        for shard in &self.shards {
            let shard = read(shard);
            jobs.extend(
                shard
                    .iter()
                    .filter_map(|(job_id, stored)| Self::hydrate(job_id, stored, &companies))
                    .filter(|job| filters.matches(job)),
            );
        }
        jobs.sort_by(listing_order);
        Ok(jobs)
    }

    async fn get_job(&self, id: i32) -> Result<Option<Job>, StoreError> {
        let companies = self.company_by_id();
        for shard in &self.shards {
            let shard = read(shard);
            if let Some((job_id, stored)) = shard.iter().find(|(_, s)| s.id == id) {
                return Ok(Self::hydrate(job_id, stored, &companies));
            }
        }
        Ok(None)
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        let mut companies: Vec<Company> = read(&self.companies).values().cloned().collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn get_company(&self, id: i32) -> Result<Option<Company>, StoreError> {
        Ok(read(&self.companies).values().find(|c| c.id == id).cloned())
    }

    async fn save_run_report(&self, report: &RunReport) -> Result<(), StoreError> {
        *write(&self.last_report) = Some(report.clone());
        Ok(())
    }

    async fn last_run_report(&self) -> Result<Option<RunReport>, StoreError> {
        Ok(read(&self.last_report).clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::job::sample_new_job;
    use crate::store::query::JobQuery;

    #[tokio::test]
    async fn second_upsert_updates_and_keeps_first_scrape_time() {
        let store = MemoryStore::new();
        let first = sample_new_job("naukri-1");
        assert_eq!(store.upsert_job(&first).await.unwrap(), UpsertOutcome::Added);

        let mut second = first.clone();
        second.salary = "20-30 Lacs PA".to_string();
        second.scraped_at = first.scraped_at + chrono::Duration::hours(6);
        assert_eq!(
            store.upsert_job(&second).await.unwrap(),
            UpsertOutcome::Updated
        );

        let jobs = store.list_jobs(&JobFilters::default()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].salary, "20-30 Lacs PA");
        assert_eq!(jobs[0].date_scraped, first.scraped_at);
    }

    #[tokio::test]
    async fn identical_rescrape_is_unchanged() {
        let store = MemoryStore::new();
        let job = sample_new_job("naukri-1");
        store.upsert_job(&job).await.unwrap();
        assert_eq!(
            store.upsert_job(&job).await.unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn update_replaces_skills() {
        let store = MemoryStore::new();
        let mut job = sample_new_job("naukri-1");
        store.upsert_job(&job).await.unwrap();
        job.skills = vec!["Go".to_string()];
        store.upsert_job(&job).await.unwrap();

        let jobs = store.list_jobs(&JobFilters::default()).await.unwrap();
        assert_eq!(jobs[0].skills, vec![Skill { skill: "Go".to_string() }]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_identifier_insert_once() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_job(&sample_new_job("shared")).await.unwrap()
            }));
        }

        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap() == UpsertOutcome::Added {
                added += 1;
            }
        }
        assert_eq!(added, 1);
        assert_eq!(
            store.list_jobs(&JobFilters::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn companies_are_shared_and_refreshed() {
        let store = MemoryStore::new();
        let mut a = sample_new_job("1");
        a.company.rating = Some("3.9".to_string());
        let mut b = sample_new_job("2");
        b.company.name = " ola ".to_string();
        b.company.reviews = Some("1200 Reviews".to_string());
        store.upsert_job(&a).await.unwrap();
        store.upsert_job(&b).await.unwrap();

        let companies = store.list_companies().await.unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Ola");
        assert_eq!(companies[0].rating.as_deref(), Some("3.9"));
        assert_eq!(companies[0].reviews.as_deref(), Some("1200 Reviews"));

        let fetched = store.get_company(companies[0].id).await.unwrap();
        assert_eq!(fetched, Some(companies[0].clone()));
    }

    #[tokio::test]
    async fn listing_filters_and_orders() {
        let store = MemoryStore::new();
        let mut older = sample_new_job("b");
        older.posted_date = NaiveDate::from_ymd_opt(2026, 9, 1);
        let mut newer = sample_new_job("c");
        newer.skills = vec!["Java".to_string()];
        let mut tie = sample_new_job("a");
        tie.company = CompanyProfile::named("Zepto");
        for job in [&older, &newer, &tie] {
            store.upsert_job(job).await.unwrap();
        }

        let all = store.list_jobs(&JobFilters::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);

        let rust = JobQuery {
            skill: Some("RUST".to_string()),
            ..JobQuery::default()
        }
        .normalize();
        let ids: Vec<String> = store
            .list_jobs(&rust)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(ids, ["a", "b"]);

        let zepto = JobQuery {
            company: Some("zepto".to_string()),
            ..JobQuery::default()
        }
        .normalize();
        assert_eq!(store.list_jobs(&zepto).await.unwrap().len(), 1);

        let by_id = store.get_job(all[0].id).await.unwrap().unwrap();
        assert_eq!(by_id.job_id, "a");
        assert!(store.get_job(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keeps_only_last_run_report() {
        let store = MemoryStore::new();
        assert!(store.last_run_report().await.unwrap().is_none());
        let first = RunReport::open(3);
        let second = RunReport::open(5);
        store.save_run_report(&first).await.unwrap();
        store.save_run_report(&second).await.unwrap();
        assert_eq!(store.last_run_report().await.unwrap(), Some(second));
    }
}
