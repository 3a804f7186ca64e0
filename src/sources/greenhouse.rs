use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;

use crate::error::SourceError;
use crate::models::company::CompanyProfile;
use crate::sources::{RawPosting, SourceAdapter, non_empty};

const BASE_URL: &str = "https://boards-api.greenhouse.io";

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(default)]
    jobs: Vec<BoardJob>,
}

#[derive(Debug, Deserialize)]
struct BoardJob {
    id: u64,
    title: Option<String>,
    absolute_url: Option<String>,
    location: Option<BoardLocation>,
    first_published: Option<String>,
    updated_at: Option<String>,
    /// HTML, entity-escaped once more by the API.
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoardLocation {
    name: Option<String>,
}

/// The board content field is escaped HTML: the first parse decodes the
/// entities, the second drops the tags.
fn plain_text(escaped: &str) -> String {
    let decoded: String = Html::parse_fragment(escaped).root_element().text().collect();
    let text: Vec<String> = Html::parse_fragment(&decoded)
        .root_element()
        .text()
        .map(str::to_string)
        .collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Public job board of one company hosted on Greenhouse.
pub struct Greenhouse {
    client: reqwest::Client,
    base_url: String,
    name: String,
    board_token: String,
    company: String,
}

impl Greenhouse {
    pub fn new(client: reqwest::Client, board_token: &str, company: &str) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            name: format!("greenhouse:{board_token}"),
            board_token: board_token.to_string(),
            company: company.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

fn to_posting(job: BoardJob, company: &str) -> RawPosting {
    RawPosting {
        job_id: Some(format!("greenhouse-{}", job.id)),
        title: job.title.and_then(non_empty),
        company: Some(company.to_string()),
        location: job.location.and_then(|l| l.name).and_then(non_empty),
        description: job.content.as_deref().map(plain_text).and_then(non_empty),
        posted: job.first_published.or(job.updated_at),
        detail_url: job.absolute_url.and_then(non_empty),
        ..RawPosting::default()
    }
}

#[async_trait]
impl SourceAdapter for Greenhouse {
    fn name(&self) -> &str {
        &self.name
    }

    fn company(&self) -> CompanyProfile {
        CompanyProfile::named(self.company.clone())
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawPosting>, SourceError> {
        let url = format!(
            "{}/v1/boards/{}/jobs?content=true",
            self.base_url, self.board_token
        );
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }

        let body = resp.text().await?;
        let board: BoardResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse board response: {e}")))?;

        Ok(board
            .jobs
            .into_iter()
            .take(limit)
            .map(|job| to_posting(job, &self.company))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn board() -> serde_json::Value {
        json!({
            "jobs": [
                {
                    "id": 4001,
                    "title": "Platform Engineer",
                    "absolute_url": "https://boards.greenhouse.io/acme/jobs/4001",
                    "location": { "name": "Remote - India" },
                    "first_published": "2026-10-02T09:30:00-04:00",
                    "updated_at": "2026-10-05T09:30:00-04:00",
                    "content": "&lt;p&gt;Run the &lt;strong&gt;fleet&lt;/strong&gt; &amp;amp; more&lt;/p&gt;"
                },
                { "id": 4002, "title": "Analyst", "location": null },
                { "id": 4003, "title": "Designer" }
            ],
            "meta": { "total": 3 }
        })
    }

    #[test]
    fn content_is_unescaped_and_stripped() {
        assert_eq!(
            plain_text("&lt;p&gt;Run the &lt;strong&gt;fleet&lt;/strong&gt; &amp;amp; more&lt;/p&gt;"),
            "Run the fleet & more"
        );
    }

    #[tokio::test]
    async fn fetch_maps_jobs_and_respects_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/boards/acme/jobs"))
            .and(query_param("content", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(board()))
            .mount(&server)
            .await;

        let source = Greenhouse::new(reqwest::Client::new(), "acme", "Acme")
            .with_base_url(&server.uri());
        assert_eq!(source.name(), "greenhouse:acme");

        let postings = source.fetch(2).await.unwrap();
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.job_id.as_deref(), Some("greenhouse-4001"));
        assert_eq!(first.company.as_deref(), Some("Acme"));
        assert_eq!(first.location.as_deref(), Some("Remote - India"));
        assert_eq!(first.description.as_deref(), Some("Run the fleet & more"));
        assert_eq!(first.posted.as_deref(), Some("2026-10-02T09:30:00-04:00"));

        let second = &postings[1];
        assert!(second.location.is_none());
        assert!(second.detail_url.is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let source = Greenhouse::new(reqwest::Client::new(), "acme", "Acme")
            .with_base_url(&server.uri());
        assert!(matches!(
            source.fetch(5).await.unwrap_err(),
            SourceError::Parse(_)
        ));
    }
}
