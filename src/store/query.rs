use std::cmp::Ordering;

use serde::Deserialize;

use crate::models::job::{Job, Skill};

/// Raw listing filters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    pub company: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub skill: Option<String>,
}

/// Trimmed, lower-cased filters. Blank values are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilters {
    pub company: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub skill: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl JobQuery {
    pub fn normalize(self) -> JobFilters {
        JobFilters {
            company: clean(self.company),
            location: clean(self.location),
            title: clean(self.title),
            skill: clean(self.skill),
        }
    }
}

impl JobFilters {
    /// Conjunctive match used by stores that filter in process.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(company) = &self.company
            && job.company.name.trim().to_lowercase() != *company
        {
            return false;
        }
        if let Some(location) = &self.location
            && job.location.trim().to_lowercase() != *location
        {
            return false;
        }
        if let Some(title) = &self.title
            && !job.title.to_lowercase().contains(title.as_str())
        {
            return false;
        }
        if let Some(skill) = &self.skill
            && !job.has_skill(&Skill::normalized(skill))
        {
            return false;
        }
        true
    }
}

/// Newest posted date first (unknown dates last), then ascending identifier.
pub fn listing_order(a: &Job, b: &Job) -> Ordering {
    match (a.posted_date, b.posted_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.job_id.cmp(&b.job_id))
}
