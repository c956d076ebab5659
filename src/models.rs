use chrono::{Local, NaiveDateTime};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Job board a listing was scraped from. Unknown boards keep their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Linkedin,
    Indeed,
    Glassdoor,
    Naukri,
    Internshala,
    Unstop,
    AngelList,
    Dice,
    Monster,
    ZipRecruiter,
    Other(String),
}

impl Platform {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "linkedin" => Platform::Linkedin,
            "indeed" => Platform::Indeed,
            "glassdoor" => Platform::Glassdoor,
            "naukri" => Platform::Naukri,
            "internshala" => Platform::Internshala,
            "unstop" => Platform::Unstop,
            "angellist" | "wellfound" => Platform::AngelList,
            "dice" => Platform::Dice,
            "monster" => Platform::Monster,
            "ziprecruiter" => Platform::ZipRecruiter,
            other => Platform::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Indeed => "indeed",
            Platform::Glassdoor => "glassdoor",
            Platform::Naukri => "naukri",
            Platform::Internshala => "internshala",
            Platform::Unstop => "unstop",
            Platform::AngelList => "angellist",
            Platform::Dice => "dice",
            Platform::Monster => "monster",
            Platform::ZipRecruiter => "ziprecruiter",
            Platform::Other(name) => name,
        }
    }
}

impl From<String> for Platform {
    fn from(value: String) -> Self {
        Platform::parse(&value)
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How fresh a posting is, bucketed from the board's "posted" text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Hours,
    Days(Option<u32>),
    Weeks(Option<u32>),
    Months,
    Unknown,
}

impl Recency {
    pub fn parse(posted: &str) -> Self {
        let lower = posted.to_lowercase();
        let count = regex::Regex::new(r"(\d+)")
            .ok()
            .and_then(|re| re.captures(&lower))
            .and_then(|caps| caps[1].parse::<u32>().ok());

        if lower.contains("hour") || lower.contains("minute") || lower.contains("just now") {
            Recency::Hours
        } else if lower.contains("today") {
            Recency::Days(Some(0))
        } else if lower.contains("day") {
            Recency::Days(count)
        } else if lower.contains("week") {
            Recency::Weeks(count)
        } else if lower.contains("month") {
            Recency::Months
        } else {
            Recency::Unknown
        }
    }

    /// Higher is newer.
    pub fn score(&self) -> u32 {
        match self {
            Recency::Hours => 100,
            Recency::Days(Some(days)) => 50u32.saturating_sub(*days),
            Recency::Days(None) => 50,
            Recency::Weeks(Some(weeks)) => 20u32.saturating_sub(weeks.saturating_mul(7)),
            Recency::Weeks(None) => 20,
            Recency::Months => 5,
            Recency::Unknown => 0,
        }
    }
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// A scraped posting. Identity is the URL; never modified after scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub posted_date: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default = "default_platform")]
    pub platform: Platform,
    #[serde(default = "now_local")]
    pub scraped_at: NaiveDateTime,
}

fn default_platform() -> Platform {
    Platform::Other("unknown".to_string())
}

impl JobListing {
    pub fn recency(&self) -> Recency {
        Recency::parse(&self.posted_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobLevel {
    Entry,
    #[default]
    #[serde(rename = "Mid-Level")]
    MidLevel,
    Senior,
    Lead,
    Principal,
    Director,
}

impl JobLevel {
    /// Years of experience a level implies when the posting states none.
    pub fn min_years(&self) -> u32 {
        match self {
            JobLevel::Entry => 0,
            JobLevel::MidLevel => 2,
            JobLevel::Senior => 5,
            JobLevel::Lead => 7,
            JobLevel::Principal => 8,
            JobLevel::Director => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobLevel::Entry => "Entry",
            JobLevel::MidLevel => "Mid-Level",
            JobLevel::Senior => "Senior",
            JobLevel::Lead => "Lead",
            JobLevel::Principal => "Principal",
            JobLevel::Director => "Director",
        }
    }
}

/// Structured extraction of a listing's free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub job_level: JobLevel,
    #[serde(default)]
    pub education_requirements: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub salary_range: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    #[serde(default)]
    pub field: String,
}

/// The applicant: what scoring compares against and what generators tailor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(skip)]
    pub resume_text: String,
}

/// Query parameters boards and mailers add for attribution. Anything else
/// (Indeed's `jk`, a posting id) identifies the job and is kept.
const TRACKING_PARAMS: &[&str] = &[
    "trk", "trkinfo", "refid", "trackingid", "lipi", "ref", "referer", "referrer", "src",
    "from", "tk", "vjs", "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "_hsenc", "_hsmi",
    "igshid",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Strip tracking parameters and the fragment from a job URL.
pub fn clean_tracking_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let Ok(mut parsed) = Url::parse(url) else {
        let end = url.find('#').unwrap_or(url.len());
        return Some(url[..end].to_string());
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    parsed.set_fragment(None);
    parsed.set_query(None);
    if !kept.is_empty() {
        parsed.query_pairs_mut().extend_pairs(kept);
    }
    Some(parsed.to_string())
}

/// Key used for duplicate detection.
pub fn url_key(url: &str, canonicalize: bool) -> String {
    if canonicalize {
        clean_tracking_url(url).unwrap_or_default()
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse_round_trips_names() {
        assert_eq!(Platform::parse("LinkedIn"), Platform::Linkedin);
        assert_eq!(Platform::parse("wellfound"), Platform::AngelList);
        assert_eq!(Platform::parse("ZipRecruiter").as_str(), "ziprecruiter");
        assert_eq!(
            Platform::parse("hackernews"),
            Platform::Other("hackernews".to_string())
        );
    }

    #[test]
    fn test_listing_deserializes_with_defaults() {
        let json = r#"{
            "title": "Data Engineer",
            "company": "Acme",
            "url": "https://jobs.example.com/1",
            "platform": "Indeed",
            "skills": ["sql", "python", "sql"]
        }"#;
        let listing: JobListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.platform, Platform::Indeed);
        assert_eq!(listing.skills.len(), 2);
        assert!(listing.description.is_empty());
        assert_eq!(listing.recency(), Recency::Unknown);
    }

    #[test]
    fn test_recency_buckets() {
        assert_eq!(Recency::parse("2 hours ago"), Recency::Hours);
        assert_eq!(Recency::parse("3 days ago"), Recency::Days(Some(3)));
        assert_eq!(Recency::parse("1 week ago"), Recency::Weeks(Some(1)));
        assert_eq!(Recency::parse("a month ago"), Recency::Months);
        assert_eq!(Recency::parse(""), Recency::Unknown);

        assert!(Recency::parse("5 minutes ago").score() > Recency::parse("1 day ago").score());
        assert_eq!(Recency::parse("4 weeks ago").score(), 0);
    }

    #[test]
    fn test_recency_survives_absurd_counts() {
        assert_eq!(Recency::parse("999999999 weeks ago").score(), 0);
        assert_eq!(Recency::parse("4294967295 days ago").score(), 0);
        // too large for u32: count is dropped, bucket kept
        assert_eq!(Recency::parse("99999999999 weeks ago"), Recency::Weeks(None));
    }

    #[test]
    fn test_job_level_serde_names() {
        let level: JobLevel = serde_json::from_str("\"Mid-Level\"").unwrap();
        assert_eq!(level, JobLevel::MidLevel);
        assert_eq!(JobLevel::Entry.min_years(), 0);
        assert_eq!(JobLevel::Director.min_years(), 10);
    }

    #[test]
    fn test_clean_tracking_url_strips_query_params() {
        let url1 = "https://www.linkedin.com/jobs/view/123456?refId=abcd&trackingId=xyz";
        assert_eq!(
            clean_tracking_url(url1),
            Some("https://www.linkedin.com/jobs/view/123456".to_string())
        );

        let url2 = "https://jobs.example.com/posting/12345";
        assert_eq!(clean_tracking_url(url2), Some(url2.to_string()));

        assert_eq!(clean_tracking_url(""), None);

        let url3 = "https://example.com/job#apply";
        assert_eq!(
            clean_tracking_url(url3),
            Some("https://example.com/job".to_string())
        );
    }

    #[test]
    fn test_url_key_is_exact_unless_canonicalizing() {
        let url = "https://example.com/job/1?utm_source=mail";
        assert_eq!(url_key(url, false), url);
        assert_eq!(url_key(url, true), "https://example.com/job/1");
        assert_ne!(url_key("https://Example.com/a", false), url_key("https://example.com/a", false));
    }

    #[test]
    fn test_canonical_key_keeps_posting_ids() {
        let first = url_key("https://www.indeed.com/viewjob?jk=aaa111&from=serp&utm_source=mail", true);
        let second = url_key("https://www.indeed.com/viewjob?jk=bbb222", true);
        assert_eq!(first, "https://www.indeed.com/viewjob?jk=aaa111");
        assert_eq!(second, "https://www.indeed.com/viewjob?jk=bbb222");
        assert_ne!(first, second);

        assert_eq!(
            url_key("https://www.indeed.com/viewjob?tk=1h2&jk=aaa111#apply", true),
            first
        );
        assert_eq!(
            url_key("https://jobs.example.com/apply?id=7&UTM_Campaign=x&gclid=abc", true),
            "https://jobs.example.com/apply?id=7"
        );
    }
}
