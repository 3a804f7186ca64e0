// Source adapters: one type per company listing, all behind `SourceAdapter`.

pub mod greenhouse;
pub mod naukri;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::SourceError;
use crate::models::company::CompanyProfile;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Fields as parsed from a listing, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPosting {
    pub job_id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub company_rating: Option<String>,
    pub company_reviews: Option<String>,
    pub logo_url: Option<String>,
    pub experience: Option<String>,
    pub salary: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub posted: Option<String>,
    pub detail_url: Option<String>,
}

/// Trait that all company sources implement.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name used in logs and error entries.
    fn name(&self) -> &str;

    /// Company the postings belong to when a card does not name one.
    fn company(&self) -> CompanyProfile;

    /// Fetch at most `limit` postings. An empty listing is `Ok(vec![])`.
    async fn fetch(&self, limit: usize) -> Result<Vec<RawPosting>, SourceError>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Build the adapters named in the config.
pub fn configured_sources(config: &Config) -> anyhow::Result<Vec<Arc<dyn SourceAdapter>>> {
    let client = http_client(config.fetch_timeout())?;
    let delay = config.request_delay();
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for name in &config.sources {
        let source: Arc<dyn SourceAdapter> = match name.trim().to_lowercase().as_str() {
            "ola" => Arc::new(naukri::Ola::new(client.clone(), delay)),
            "swiggy" => Arc::new(naukri::Swiggy::new(client.clone(), delay)),
            "zepto" => Arc::new(naukri::Zepto::new(client.clone(), delay)),
            "" => continue,
            other => anyhow::bail!("Unknown source: {other}"),
        };
        sources.push(source);
    }

    for entry in &config.greenhouse_boards {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (token, company) = match entry.split_once('=') {
            Some((token, company)) => (token.trim(), company.trim()),
            None => (entry, entry),
        };
        sources.push(Arc::new(greenhouse::Greenhouse::new(
            client.clone(),
            token,
            company,
        )));
    }

    if sources.is_empty() {
        anyhow::bail!("No sources configured");
    }
    Ok(sources)
}

pub(crate) fn non_empty(value: impl AsRef<str>) -> Option<String> {
    let value = value.as_ref().trim();
    (!value.is_empty()).then(|| value.to_string())
}
