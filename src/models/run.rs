use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(RunPhase::Idle),
            "running" => Some(RunPhase::Running),
            "completed" => Some(RunPhase::Completed),
            "failed" => Some(RunPhase::Failed),
            _ => None,
        }
    }
}

/// Outcome of one scrape run. Only the latest finalized report is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub status: RunPhase,
    pub max_jobs_per_company: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub jobs_added: u32,
    pub jobs_updated: u32,
    pub jobs_unchanged: u32,
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn open(max_jobs_per_company: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunPhase::Running,
            max_jobs_per_company,
            started_at: Utc::now(),
            finished_at: None,
            jobs_added: 0,
            jobs_updated: 0,
            jobs_unchanged: 0,
            errors: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == RunPhase::Completed
    }
}

/// Adapters finished so far in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub adapters_completed: usize,
    pub adapters_total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub state: RunPhase,
    pub progress: Option<RunProgress>,
    /// Open report while running, otherwise the last finalized one.
    pub report: Option<RunReport>,
}
