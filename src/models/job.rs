use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::company::{Company, CompanyProfile};

/// Salary text stored when a listing does not disclose compensation.
pub const SALARY_NOT_DISCLOSED: &str = "Not disclosed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub skill: String,
}

impl Skill {
    pub fn normalized(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i32,
    pub job_id: String,
    pub title: String,
    pub company: Company,
    pub experience: Option<String>,
    pub salary: String,
    pub location: String,
    pub description: String,
    pub detail_url: String,
    pub posted_date: Option<NaiveDate>,
    pub date_scraped: DateTime<Utc>,
    pub skills: Vec<Skill>,
}

impl Job {
    pub fn has_skill(&self, normalized: &str) -> bool {
        self.skills
            .iter()
            .any(|s| Skill::normalized(&s.skill) == normalized)
    }
}

/// A validated posting ready to be merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_id: String,
    pub title: String,
    pub company: CompanyProfile,
    pub experience: Option<String>,
    pub salary: String,
    pub location: String,
    pub description: String,
    pub detail_url: String,
    pub posted_date: Option<NaiveDate>,
    pub skills: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

impl NewJob {
    /// Hex SHA-256 over the mutable fields. Two scrapes of an unchanged
    /// listing produce the same fingerprint regardless of skill order.
    pub fn fingerprint(&self) -> String {
        let mut skills: Vec<String> = self.skills.iter().map(|s| Skill::normalized(s)).collect();
        skills.sort();

        let mut hasher = Sha256::new();
        for field in [
            self.title.as_str(),
            self.company.key().as_str(),
            self.experience.as_deref().unwrap_or(""),
            self.salary.as_str(),
            self.location.as_str(),
            self.description.as_str(),
            self.detail_url.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(date) = self.posted_date {
            hasher.update(date.to_string().as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(skills.join("\u{1f}").as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    /// Re-seen identifier whose content fingerprint did not change.
    Unchanged,
}

#[cfg(test)]
pub(crate) fn sample_new_job(job_id: &str) -> NewJob {
    NewJob {
        job_id: job_id.to_string(),
        title: "Backend Engineer".to_string(),
        company: CompanyProfile::named("Ola"),
        experience: Some("2-5 Yrs".to_string()),
        salary: SALARY_NOT_DISCLOSED.to_string(),
        location: "Bengaluru".to_string(),
        description: "Build services".to_string(),
        detail_url: format!("https://example.com/jobs/{job_id}"),
        posted_date: NaiveDate::from_ymd_opt(2026, 10, 1),
        skills: vec!["Rust".to_string(), "Postgres".to_string()],
        scraped_at: Utc::now(),
    }
}
