//! One scraper for every job board, driven by per-platform selector maps.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::admission::{uniform_secs, ThreadRandom};
use crate::config::SearchConfig;
use crate::models::{JobListing, Platform};

/// Titles at least this similar from the same company are treated as one posting.
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.95;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Where to search and how to read a board's result cards.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// Search page URL with `{query}` and `{location}` placeholders.
    pub search_url: &'static str,
    pub base_url: &'static str,
    pub card: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub location: &'static str,
    pub link: &'static str,
    pub posted_date: &'static str,
    pub salary: &'static str,
    pub job_type: &'static str,
    pub description: &'static [&'static str],
}

impl PlatformProfile {
    pub fn builtin(platform: &Platform) -> Option<Self> {
        let profile = match platform {
            Platform::Linkedin => Self {
                platform: Platform::Linkedin,
                search_url: "https://www.linkedin.com/jobs/search?keywords={query}&location={location}",
                base_url: "https://www.linkedin.com",
                card: ".job-search-card, .base-card",
                title: ".base-search-card__title, .job-search-card__title",
                company: ".base-search-card__subtitle, .job-search-card__subtitle-link",
                location: ".job-search-card__location",
                link: "a.base-card__full-link, .job-search-card__title-link",
                posted_date: "time, .job-search-card__listdate",
                salary: ".job-search-card__salary-info",
                job_type: ".job-search-card__workplace-type",
                description: &[
                    ".show-more-less-html__markup",
                    ".description__text",
                    ".jobs-description__content",
                ],
            },
            Platform::Indeed => Self {
                platform: Platform::Indeed,
                search_url: "https://www.indeed.com/jobs?q={query}&l={location}",
                base_url: "https://www.indeed.com",
                card: ".job_seen_beacon, [data-jk]",
                title: "[data-testid='job-title'], .jobTitle span[title], h2 a span",
                company: "[data-testid='company-name'], .companyName",
                location: "[data-testid='text-location'], .companyLocation",
                link: "h2 a, .jobTitle a",
                posted_date: ".date, [data-testid='myJobsStateDate']",
                salary: ".salary-snippet, [data-testid='attribute_snippet_testid'], .estimated-salary",
                job_type: ".jobMetadata, .metadata",
                description: &["#jobDescriptionText", ".jobsearch-jobDescriptionText"],
            },
            Platform::Internshala => Self {
                platform: Platform::Internshala,
                search_url: "https://internshala.com/jobs/keywords-{query}/location-{location}",
                base_url: "https://internshala.com",
                card: ".individual_internship",
                title: ".job-title a, .profile h3 a, .job-internship-name a",
                company: ".company-name, .company h4 a",
                location: ".location_link, .locations span",
                link: ".job-title a, .profile h3 a, .job-internship-name a",
                posted_date: ".status, .posted_by_container",
                salary: ".stipend, .salary",
                job_type: ".internship_type, .job_type",
                description: &[".internship_details .text-container", ".about_company_text_container"],
            },
            _ => return None,
        };
        Some(profile)
    }

    pub fn search_url(&self, query: &str, location: &str) -> Result<Url> {
        let url = self
            .search_url
            .replace("{query}", query.trim())
            .replace("{location}", location.trim());
        Url::parse(&url).with_context(|| format!("Invalid search URL: {}", url))
    }
}

#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub query: String,
    pub location: String,
    pub max_results: usize,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(card: &ElementRef, sel: &Selector) -> String {
    card.select(sel)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Extract listings from one page of search results.
pub fn parse_cards(html: &str, profile: &PlatformProfile, now: NaiveDateTime) -> Result<Vec<JobListing>> {
    let document = Html::parse_document(html);
    let base = Url::parse(profile.base_url)?;

    let card = selector(profile.card)?;
    let title = selector(profile.title)?;
    let company = selector(profile.company)?;
    let location = selector(profile.location)?;
    let link = selector(profile.link)?;
    let posted = selector(profile.posted_date)?;
    let salary = selector(profile.salary)?;
    let job_type = selector(profile.job_type)?;

    let mut listings = Vec::new();
    for element in document.select(&card) {
        let job_title = first_text(&element, &title);
        let href = element
            .select(&link)
            .find_map(|a| a.value().attr("href"))
            .and_then(|href| base.join(href.trim()).ok());

        let (job_title, url) = match (job_title.is_empty(), href) {
            (false, Some(url)) => (job_title, url.to_string()),
            _ => {
                tracing::debug!("skipping {} card without title or link", profile.platform);
                continue;
            }
        };

        listings.push(JobListing {
            title: job_title,
            company: first_text(&element, &company),
            location: first_text(&element, &location),
            description: String::new(),
            url,
            posted_date: first_text(&element, &posted),
            job_type: first_text(&element, &job_type),
            salary: first_text(&element, &salary),
            skills: Default::default(),
            platform: profile.platform.clone(),
            scraped_at: now,
        });
    }

    Ok(listings)
}

/// Main text of a job detail page, trying the profile's selectors then `<body>`.
pub fn extract_description(html: &str, profile: &PlatformProfile) -> Option<String> {
    let document = Html::parse_document(html);
    for css in profile.description.iter().copied().chain(["article", "main", "body"]) {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        if let Some(text) = document
            .select(&sel)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .map(|t| collapse_whitespace(&t))
            .find(|t| !t.is_empty())
        {
            return Some(text);
        }
    }
    None
}

/// Drop exact URL repeats and near-identical titles from the same company.
pub fn collapse_near_duplicates(listings: Vec<JobListing>) -> Vec<JobListing> {
    let mut kept: Vec<JobListing> = Vec::new();
    for listing in listings {
        let duplicate = kept.iter().any(|k| {
            k.url == listing.url
                || (k.company.eq_ignore_ascii_case(&listing.company)
                    && strsim::normalized_levenshtein(
                        &k.title.to_lowercase(),
                        &listing.title.to_lowercase(),
                    ) >= NEAR_DUPLICATE_SIMILARITY)
        });
        if duplicate {
            tracing::debug!("collapsing near-duplicate {} at {}", listing.title, listing.company);
        } else {
            kept.push(listing);
        }
    }
    kept
}

/// Newest first; ties keep page order.
pub fn sort_by_recency(listings: &mut [JobListing]) {
    listings.sort_by_key(|l| std::cmp::Reverse(l.recency().score()));
}

pub struct SelectorScraper {
    profile: PlatformProfile,
    client: reqwest::blocking::Client,
    fetch_descriptions: bool,
}

impl SelectorScraper {
    pub fn new(profile: PlatformProfile) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            profile,
            client,
            fetch_descriptions: true,
        })
    }

    pub fn for_platform(name: &str) -> Result<Self> {
        let platform = Platform::parse(name);
        let profile = PlatformProfile::builtin(&platform)
            .ok_or_else(|| anyhow!("No scraper profile for platform '{}'", name))?;
        Self::new(profile)
    }

    pub fn without_descriptions(mut self) -> Self {
        self.fetch_descriptions = false;
        self
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("{} returned {}", url, response.status()));
        }
        response.text().context("Failed to read response body")
    }

    fn pause(&self) {
        let secs = uniform_secs(&mut ThreadRandom, 1, 3);
        std::thread::sleep(Duration::from_secs(secs));
    }

    pub fn scrape(&self, criteria: &SearchCriteria, now: NaiveDateTime) -> Result<Vec<JobListing>> {
        let url = self.profile.search_url(&criteria.query, &criteria.location)?;
        tracing::info!("searching {} for '{}' in {}", self.profile.platform, criteria.query, criteria.location);

        let html = self.fetch(url.as_str())?;
        let cards = parse_cards(&html, &self.profile, now)?;
        let found = cards.len();

        let mut listings = collapse_near_duplicates(cards);
        sort_by_recency(&mut listings);
        listings.truncate(criteria.max_results);
        tracing::info!("{}: {} cards, {} after de-duplication", self.profile.platform, found, listings.len());

        if self.fetch_descriptions {
            for listing in listings.iter_mut() {
                self.pause();
                match self.fetch(&listing.url) {
                    Ok(page) => {
                        listing.description = extract_description(&page, &self.profile).unwrap_or_default();
                    }
                    Err(e) => tracing::warn!("no description for {}: {:#}", listing.url, e),
                }
            }
        }

        Ok(listings)
    }
}

/// Every configured title × location × platform search, one after another.
/// A failing search is logged and skipped; the rest still run.
pub fn search_all(config: &SearchConfig, now: NaiveDateTime) -> Result<Vec<JobListing>> {
    if config.job_titles.is_empty() {
        return Err(anyhow!("No job titles configured under [search]"));
    }

    let mut listings = Vec::new();
    for platform in &config.platforms {
        let scraper = match SelectorScraper::for_platform(platform) {
            Ok(s) if config.fetch_descriptions => s,
            Ok(s) => s.without_descriptions(),
            Err(e) => {
                tracing::warn!("{:#}", e);
                continue;
            }
        };
        for title in &config.job_titles {
            for location in &config.locations {
                let criteria = SearchCriteria {
                    query: title.clone(),
                    location: location.clone(),
                    max_results: config.max_jobs_per_search,
                };
                match scraper.scrape(&criteria, now) {
                    Ok(found) => listings.extend(found),
                    Err(e) => tracing::warn!("search '{}' on {} failed: {:#}", title, platform, e),
                }
            }
        }
    }
    Ok(listings)
}
