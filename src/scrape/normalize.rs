use std::collections::HashSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::error::ValidationError;
use crate::models::company::CompanyProfile;
use crate::models::job::{NewJob, SALARY_NOT_DISCLOSED};
use crate::sources::{RawPosting, non_empty};

/// Map a parsed posting onto the canonical job shape.
///
/// `company` is the adapter's own company; names and descriptive fields
/// found on the posting take precedence over it.
pub fn normalize(
    raw: RawPosting,
    company: &CompanyProfile,
    scraped_at: DateTime<Utc>,
) -> Result<NewJob, ValidationError> {
    let job_id = raw.job_id.and_then(non_empty);
    let title = raw.title.and_then(non_empty);
    let location = raw.location.and_then(non_empty);
    let description = raw.description.and_then(non_empty);
    let detail_url = raw.detail_url.and_then(non_empty);

    let mut missing = Vec::new();
    if job_id.is_none() {
        missing.push("job_id");
    }
    if title.is_none() {
        missing.push("title");
    }
    if location.is_none() {
        missing.push("location");
    }
    if description.is_none() {
        missing.push("description");
    }
    if detail_url.is_none() {
        missing.push("detail_url");
    }

    let (Some(job_id), Some(title), Some(location), Some(description), Some(detail_url)) =
        (job_id, title, location, description, detail_url)
    else {
        return Err(ValidationError::MissingFields(missing));
    };

    let company = CompanyProfile {
        name: raw
            .company
            .and_then(non_empty)
            .unwrap_or_else(|| company.name.trim().to_string()),
        rating: raw.company_rating.and_then(non_empty).or(company.rating.clone()),
        reviews: raw
            .company_reviews
            .and_then(non_empty)
            .or(company.reviews.clone()),
        logo_url: raw.logo_url.and_then(non_empty).or(company.logo_url.clone()),
    };

    Ok(NewJob {
        job_id,
        title,
        company,
        experience: raw.experience.and_then(non_empty),
        salary: normalize_salary(raw.salary),
        location,
        description,
        detail_url,
        posted_date: raw
            .posted
            .as_deref()
            .and_then(|p| parse_posted(p, scraped_at.date_naive())),
        skills: dedupe_skills(raw.skills),
        scraped_at,
    })
}

fn normalize_salary(salary: Option<String>) -> String {
    match salary.and_then(non_empty) {
        Some(s) if !s.eq_ignore_ascii_case(SALARY_NOT_DISCLOSED) => s,
        _ => SALARY_NOT_DISCLOSED.to_string(),
    }
}

/// Trim, drop blanks and keep the first spelling of each skill.
fn dedupe_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .into_iter()
        .filter_map(non_empty)
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// Resolve a source's posted-date text to a calendar date.
///
/// Accepts ISO dates, RFC 3339 timestamps and listing phrases such as
/// "Just Now", "Few Hours Ago", "3 Days Ago" or "30+ Days Ago".
pub fn parse_posted(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.date_naive());
    }

    let lower = text.to_lowercase();
    let phrase = lower
        .strip_prefix("posted")
        .map(str::trim_start)
        .unwrap_or(&lower);

    match phrase {
        "just now" | "today" | "few hours ago" | "few minutes ago" => return Some(today),
        "yesterday" => return today.checked_sub_days(Days::new(1)),
        _ => {}
    }

    let mut words = phrase.split_whitespace();
    let count: u64 = words.next()?.trim_end_matches('+').parse().ok()?;
    let unit = words.next()?;
    let days = if unit.starts_with("minute") || unit.starts_with("hour") {
        0
    } else if unit.starts_with("day") {
        count
    } else if unit.starts_with("week") {
        count * 7
    } else if unit.starts_with("month") {
        count * 30
    } else {
        return None;
    };

    let date = today.checked_sub_days(Days::new(days))?;
    // Guard against nonsense like "9999 months ago".
    (date.year() > 1970).then_some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawPosting {
        RawPosting {
            job_id: Some(" 2410 ".to_string()),
            title: Some("SDE II".to_string()),
            location: Some("Bengaluru".to_string()),
            description: Some("Payments".to_string()),
            detail_url: Some("https://www.naukri.com/job-listings-2410".to_string()),
            skills: vec![
                " Rust ".to_string(),
                "rust".to_string(),
                "".to_string(),
                "SQL".to_string(),
            ],
            posted: Some("3 Days Ago".to_string()),
            ..RawPosting::default()
        }
    }

    fn scraped_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-14T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn normalizes_a_complete_posting() {
        let job = normalize(raw(), &CompanyProfile::named("Ola"), scraped_at()).unwrap();
        assert_eq!(job.job_id, "2410");
        assert_eq!(job.company.name, "Ola");
        assert_eq!(job.salary, SALARY_NOT_DISCLOSED);
        assert_eq!(job.skills, vec!["Rust", "SQL"]);
        assert_eq!(job.posted_date, NaiveDate::from_ymd_opt(2026, 10, 11));
        assert_eq!(job.scraped_at, scraped_at());
    }

    #[test]
    fn reports_every_missing_field() {
        let mut posting = raw();
        posting.title = Some("   ".to_string());
        posting.detail_url = None;
        let err = normalize(posting, &CompanyProfile::named("Ola"), scraped_at()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["title", "detail_url"])
        );
    }

    #[test]
    fn posting_company_overrides_adapter_default() {
        let mut posting = raw();
        posting.company = Some("Ola Electric".to_string());
        posting.company_rating = Some("3.6".to_string());
        let default = CompanyProfile {
            reviews: Some("900 Reviews".to_string()),
            ..CompanyProfile::named("Ola")
        };
        let job = normalize(posting, &default, scraped_at()).unwrap();
        assert_eq!(job.company.name, "Ola Electric");
        assert_eq!(job.company.rating.as_deref(), Some("3.6"));
        assert_eq!(job.company.reviews.as_deref(), Some("900 Reviews"));
    }

    #[test]
    fn salary_text_is_kept_and_sentinel_is_canonical() {
        assert_eq!(normalize_salary(Some("12-18 Lacs PA".to_string())), "12-18 Lacs PA");
        assert_eq!(normalize_salary(Some("not DISCLOSED".to_string())), SALARY_NOT_DISCLOSED);
        assert_eq!(normalize_salary(Some(" ".to_string())), SALARY_NOT_DISCLOSED);
    }

    #[test]
    fn posted_phrases_resolve_against_scrape_day() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2026, 10, d);
        assert_eq!(parse_posted("Just Now", today), Some(today));
        assert_eq!(parse_posted("Few Hours Ago", today), Some(today));
        assert_eq!(parse_posted("1 Day Ago", today), day(13));
        assert_eq!(parse_posted("Posted 2 days ago", today), day(12));
        assert_eq!(parse_posted("1 week ago", today), day(7));
        assert_eq!(
            parse_posted("30+ Days Ago", today),
            NaiveDate::from_ymd_opt(2026, 9, 14)
        );
        assert_eq!(parse_posted("2026-10-01", today), day(1));
        assert_eq!(parse_posted("2026-10-02T23:30:00-04:00", today), day(2));
        assert_eq!(parse_posted("Hiring now!", today), None);
    }
}
