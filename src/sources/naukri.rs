use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::SourceError;
use crate::models::company::CompanyProfile;
use crate::sources::{RawPosting, SourceAdapter, non_empty};

const BASE_URL: &str = "https://www.naukri.com";
const PAGE_SIZE: usize = 20;
const MAX_PAGES: usize = 10;

struct CardSelectors {
    card: Selector,
    title: Selector,
    company: Selector,
    rating: Selector,
    reviews: Selector,
    experience: Selector,
    salary: Selector,
    location: Selector,
    description: Selector,
    skills: Selector,
    posted: Selector,
    logo: Selector,
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("bad selector {css:?}: {e}")))
}

impl CardSelectors {
    fn new() -> Result<Self, SourceError> {
        Ok(Self {
            card: selector(".srp-jobtuple-wrapper")?,
            title: selector("a.title")?,
            company: selector("a.comp-name")?,
            rating: selector("span.main-2")?,
            reviews: selector("a.review")?,
            experience: selector(".exp-wrap span[title], span.expwdth, span[title*=\"Yrs\"]")?,
            salary: selector(".sal-wrap span[title], span.sal")?,
            location: selector(".loc-wrap span[title], span.locWdth")?,
            description: selector("span.job-desc")?,
            skills: selector("ul.tags-gt li")?,
            posted: selector("span.job-post-day")?,
            logo: selector("img.logoImage")?,
        })
    }
}

fn text_of(el: ElementRef<'_>) -> Option<String> {
    let text = el.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    non_empty(collapsed).or_else(|| el.value().attr("title").and_then(non_empty))
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel).find_map(text_of)
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Parse every job card on a Naukri search-results page.
pub fn parse_listing(html: &str, base: &Url) -> Result<Vec<RawPosting>, SourceError> {
    let sel = CardSelectors::new()?;
    let document = Html::parse_document(html);

    let postings = document
        .select(&sel.card)
        .map(|card| {
            let title_link = card.select(&sel.title).next();
            RawPosting {
                job_id: card.value().attr("data-job-id").and_then(non_empty),
                title: title_link.and_then(text_of),
                company: first_text(card, &sel.company),
                company_rating: first_text(card, &sel.rating),
                company_reviews: first_text(card, &sel.reviews),
                logo_url: card
                    .select(&sel.logo)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .and_then(|src| resolve(base, src)),
                experience: first_text(card, &sel.experience),
                salary: first_text(card, &sel.salary),
                location: first_text(card, &sel.location),
                description: first_text(card, &sel.description),
                skills: card.select(&sel.skills).filter_map(text_of).collect(),
                posted: first_text(card, &sel.posted),
                detail_url: title_link
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| resolve(base, href)),
            }
        })
        .collect();
    Ok(postings)
}

/// Search-results pages for one company. Page `n > 1` lives at `{slug}-{n}`.
pub struct NaukriBoard {
    client: reqwest::Client,
    base_url: String,
    slug: &'static str,
    query: Option<&'static str>,
    delay: Duration,
}

impl NaukriBoard {
    pub fn new(
        client: reqwest::Client,
        slug: &'static str,
        query: Option<&'static str>,
        delay: Duration,
    ) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
            slug,
            query,
            delay,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn page_url(&self, page: usize) -> String {
        let path = if page <= 1 {
            self.slug.to_string()
        } else {
            format!("{}-{page}", self.slug)
        };
        match self.query {
            Some(q) => format!("{}/{path}?{q}", self.base_url),
            None => format!("{}/{path}", self.base_url),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, SourceError> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .header("Accept-Language", "en-IN,en;q=0.9")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        Ok(resp.text().await?)
    }

    pub async fn fetch(&self, limit: usize) -> Result<Vec<RawPosting>, SourceError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| SourceError::Parse(format!("bad base url: {e}")))?;
        let mut postings = Vec::new();

        for page in 1..=MAX_PAGES {
            if postings.len() >= limit {
                break;
            }
            if page > 1 {
                tokio::time::sleep(self.delay).await;
            }

            let url = self.page_url(page);
            let html = self.fetch_page(&url).await?;
            let batch = parse_listing(&html, &base)?;
            let found = batch.len();
            if page == 1 && found == 0 {
                tracing::warn!(
                    "{url}: no job cards on the first page; the listing markup may have changed"
                );
            } else {
                tracing::debug!("{url}: {found} cards");
            }

            postings.extend(batch.into_iter().take(limit - postings.len()));
            if found < PAGE_SIZE {
                break;
            }
        }
        Ok(postings)
    }
}

macro_rules! naukri_company {
    ($ty:ident, $name:literal, $company:literal, $slug:literal, $query:expr) => {
        pub struct $ty {
            board: NaukriBoard,
        }

        impl $ty {
            pub fn new(client: reqwest::Client, delay: Duration) -> Self {
                Self {
                    board: NaukriBoard::new(client, $slug, $query, delay),
                }
            }
        }

        #[async_trait]
        impl SourceAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn company(&self) -> CompanyProfile {
                CompanyProfile::named($company)
            }

            async fn fetch(&self, limit: usize) -> Result<Vec<RawPosting>, SourceError> {
                self.board.fetch(limit).await
            }
        }
    };
}

naukri_company!(Ola, "ola", "Ola", "ola-jobs-careers-706807", None);
naukri_company!(Swiggy, "swiggy", "Swiggy", "swiggy-jobs", Some("k=swiggy"));
naukri_company!(Zepto, "zepto", "Zepto", "zepto-jobs", Some("k=zepto"));
