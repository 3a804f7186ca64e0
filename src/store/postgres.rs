use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::company::Company;
use crate::models::job::{Job, NewJob, Skill, UpsertOutcome};
use crate::models::run::{RunPhase, RunReport};
use crate::store::JobStore;
use crate::store::query::JobFilters;

const JOB_SELECT: &str = "SELECT j.id, j.job_id, j.title, j.experience, j.salary, j.location, \
     j.description, j.detail_url, j.posted_date, j.date_scraped, \
     c.id AS company_id, c.name AS company_name, c.rating AS company_rating, \
     c.reviews AS company_reviews, c.logo_url AS company_logo_url \
     FROM jobs j JOIN companies c ON c.id = j.company_id";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i32,
    job_id: String,
    title: String,
    experience: Option<String>,
    salary: String,
    location: String,
    description: String,
    detail_url: String,
    posted_date: Option<NaiveDate>,
    date_scraped: DateTime<Utc>,
    company_id: i32,
    company_name: String,
    company_rating: Option<String>,
    company_reviews: Option<String>,
    company_logo_url: Option<String>,
}

impl JobRow {
    fn into_job(self, skills: Vec<Skill>) -> Job {
        Job {
            id: self.id,
            job_id: self.job_id,
            title: self.title,
            company: Company {
                id: self.company_id,
                name: self.company_name,
                rating: self.company_rating,
                reviews: self.company_reviews,
                logo_url: self.company_logo_url,
            },
            experience: self.experience,
            salary: self.salary,
            location: self.location,
            description: self.description,
            detail_url: self.detail_url,
            posted_date: self.posted_date,
            date_scraped: self.date_scraped,
            skills,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    status: String,
    max_jobs_per_company: i32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    jobs_added: i32,
    jobs_updated: i32,
    jobs_unchanged: i32,
    errors: Json<Vec<String>>,
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn to_u32(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

/// Skills sorted by normalized text, each with its listing position.
/// Upserting `skills` rows locks them until commit, so every transaction
/// must take those locks in the same order.
fn skills_in_lock_order(skills: &[String]) -> Vec<(i32, &str, String)> {
    let mut ordered: Vec<(i32, &str, String)> = skills
        .iter()
        .enumerate()
        .map(|(position, name)| {
            let position = i32::try_from(position).unwrap_or(i32::MAX);
            (position, name.as_str(), Skill::normalized(name))
        })
        .collect();
    ordered.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)));
    ordered.dedup_by(|later, earlier| later.2 == earlier.2);
    ordered
}

/// Postgres-backed store. Per-identifier atomicity comes from the unique
/// `job_id` constraint and the row lock taken by `ON CONFLICT DO UPDATE`;
/// listings read committed rows and never wait on writers.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_skills(&self, rows: Vec<JobRow>) -> Result<Vec<Job>, StoreError> {
        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let skill_rows: Vec<(i32, String)> = sqlx::query_as(
            "SELECT js.job_id, s.name FROM job_skills js JOIN skills s ON s.id = js.skill_id \
             WHERE js.job_id = ANY($1) ORDER BY js.job_id, js.position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_job: HashMap<i32, Vec<Skill>> = HashMap::new();
        for (job_id, skill) in skill_rows {
            by_job.entry(job_id).or_default().push(Skill { skill });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let skills = by_job.remove(&row.id).unwrap_or_default();
                row.into_job(skills)
            })
            .collect())
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn upsert_job(&self, job: &NewJob) -> Result<UpsertOutcome, StoreError> {
        let fingerprint = job.fingerprint();
        let mut tx = self.pool.begin().await?;

        let (company_id,): (i32,) = sqlx::query_as(
            "INSERT INTO companies (name, rating, reviews, logo_url) VALUES ($1, $2, $3, $4) \
             ON CONFLICT ((lower(name))) DO UPDATE SET \
                 rating = COALESCE(EXCLUDED.rating, companies.rating), \
                 reviews = COALESCE(EXCLUDED.reviews, companies.reviews), \
                 logo_url = COALESCE(EXCLUDED.logo_url, companies.logo_url), \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(job.company.name.trim())
        .bind(&job.company.rating)
        .bind(&job.company.reviews)
        .bind(&job.company.logo_url)
        .fetch_one(&mut *tx)
        .await?;

        let previous: Option<(String,)> =
            sqlx::query_as("SELECT content_hash FROM jobs WHERE job_id = $1 FOR UPDATE")
                .bind(&job.job_id)
                .fetch_optional(&mut *tx)
                .await?;

        // date_scraped is only written by the INSERT arm.
        let (id, inserted): (i32, bool) = sqlx::query_as(
            "INSERT INTO jobs (job_id, company_id, title, experience, salary, location, \
                 description, detail_url, posted_date, date_scraped, content_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (job_id) DO UPDATE SET \
                 company_id = EXCLUDED.company_id, \
                 title = EXCLUDED.title, \
                 experience = EXCLUDED.experience, \
                 salary = EXCLUDED.salary, \
                 location = EXCLUDED.location, \
                 description = EXCLUDED.description, \
                 detail_url = EXCLUDED.detail_url, \
                 posted_date = EXCLUDED.posted_date, \
                 content_hash = EXCLUDED.content_hash, \
                 updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(&job.job_id)
        .bind(company_id)
        .bind(&job.title)
        .bind(&job.experience)
        .bind(&job.salary)
        .bind(&job.location)
        .bind(&job.description)
        .bind(&job.detail_url)
        .bind(job.posted_date)
        .bind(job.scraped_at)
        .bind(&fingerprint)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM job_skills WHERE job_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (position, name, normalized) in skills_in_lock_order(&job.skills) {
            let (skill_id,): (i32,) = sqlx::query_as(
                "INSERT INTO skills (name, normalized) VALUES ($1, $2) \
                 ON CONFLICT (normalized) DO UPDATE SET name = skills.name \
                 RETURNING id",
            )
            .bind(name)
            .bind(&normalized)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO job_skills (job_id, skill_id, position) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(skill_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let outcome = if inserted {
            UpsertOutcome::Added
        } else if previous.is_some_and(|(hash,)| hash == fingerprint) {
            UpsertOutcome::Unchanged
        } else {
            UpsertOutcome::Updated
        };
        Ok(outcome)
    }

    async fn list_jobs(&self, filters: &JobFilters) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "{JOB_SELECT} \
             WHERE ($1::text IS NULL OR lower(btrim(c.name)) = $1) \
               AND ($2::text IS NULL OR lower(btrim(j.location)) = $2) \
               AND ($3::text IS NULL OR strpos(lower(j.title), $3) > 0) \
               AND ($4::text IS NULL OR EXISTS ( \
                   SELECT 1 FROM job_skills js JOIN skills s ON s.id = js.skill_id \
                   WHERE js.job_id = j.id AND s.normalized = $4)) \
             ORDER BY j.posted_date DESC NULLS LAST, j.job_id COLLATE \"C\" ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(&filters.company)
            .bind(&filters.location)
            .bind(&filters.title)
            .bind(&filters.skill)
            .fetch_all(&self.pool)
            .await?;
        self.attach_skills(rows).await
    }

    async fn get_job(&self, id: i32) -> Result<Option<Job>, StoreError> {
        let sql = format!("{JOB_SELECT} WHERE j.id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.attach_skills(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        let companies = sqlx::query_as::<_, Company>(
            "SELECT id, name, rating, reviews, logo_url FROM companies ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(companies)
    }

    async fn get_company(&self, id: i32) -> Result<Option<Company>, StoreError> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT id, name, rating, reviews, logo_url FROM companies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(company)
    }

    async fn save_run_report(&self, report: &RunReport) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO run_reports (slot, id, status, max_jobs_per_company, started_at, \
                 finished_at, jobs_added, jobs_updated, jobs_unchanged, errors) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (slot) DO UPDATE SET \
                 id = EXCLUDED.id, status = EXCLUDED.status, \
                 max_jobs_per_company = EXCLUDED.max_jobs_per_company, \
                 started_at = EXCLUDED.started_at, finished_at = EXCLUDED.finished_at, \
                 jobs_added = EXCLUDED.jobs_added, jobs_updated = EXCLUDED.jobs_updated, \
                 jobs_unchanged = EXCLUDED.jobs_unchanged, errors = EXCLUDED.errors",
        )
        .bind(report.id)
        .bind(report.status.as_str())
        .bind(to_i32(report.max_jobs_per_company))
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(to_i32(report.jobs_added))
        .bind(to_i32(report.jobs_updated))
        .bind(to_i32(report.jobs_unchanged))
        .bind(Json(&report.errors))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_run_report(&self) -> Result<Option<RunReport>, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT id, status, max_jobs_per_company, started_at, finished_at, jobs_added, \
                 jobs_updated, jobs_unchanged, errors FROM run_reports WHERE slot = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RunReport {
            id: r.id,
            status: RunPhase::parse(&r.status).unwrap_or(RunPhase::Failed),
            max_jobs_per_company: to_u32(r.max_jobs_per_company),
            started_at: r.started_at,
            finished_at: r.finished_at,
            jobs_added: to_u32(r.jobs_added),
            jobs_updated: to_u32(r.jobs_updated),
            jobs_unchanged: to_u32(r.jobs_unchanged),
            errors: r.errors.0,
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool closed".to_string()));
        }
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
