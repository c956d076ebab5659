//! Admission gate: decides whether a scored listing becomes an application.
//!
//! Checks run in a fixed order (duplicate, exclusions, rate and time window,
//! score threshold, priority draw) and the first failing check is reported.
//! The gate never mutates rate state; callers record an admission only once
//! the application has actually been created.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt;

use crate::config::{Config, LimitConfig};
use crate::models::{url_key, JobListing};
use crate::scoring::{JobScore, Priority};

pub const MEDIUM_ADMIT_PROBABILITY: f64 = 0.7;
pub const LOW_ADMIT_PROBABILITY: f64 = 0.3;
/// Low-priority jobs only get in while the day is below this share of the cap.
pub const LOW_PRIORITY_CAPACITY: f64 = 0.8;

/// Source of uniform draws in [0, 1).
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&mut self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.0.r#gen::<f64>()
    }
}

/// Uniform whole seconds in `[min, max]`.
pub fn uniform_secs(rng: &mut dyn RandomSource, min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as f64;
    (min + (rng.next_f64() * span) as u64).min(max)
}

/// Anything that can tell whether a URL key was already applied to.
pub trait DuplicateIndex {
    fn is_duplicate(&self, url: &str) -> bool;
}

impl DuplicateIndex for HashSet<String> {
    fn is_duplicate(&self, url: &str) -> bool {
        self.contains(url)
    }
}

/// Daily and hourly counters, reset lazily when the clock passes into a new
/// day or hour. A process idle across several buckets lands directly in the
/// current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitState {
    pub daily_count: u32,
    pub hourly_count: u32,
    pub session_count: u32,
    pub last_reset_date: Option<NaiveDate>,
    pub last_reset_hour: Option<NaiveDateTime>,
}

fn hour_bucket(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_hms_opt(now.hour(), 0, 0).unwrap_or(now)
}

impl RateLimitState {
    /// Start from counts recovered from the store (e.g. after a restart).
    pub fn seeded(daily_count: u32, hourly_count: u32, now: NaiveDateTime) -> Self {
        Self {
            daily_count,
            hourly_count,
            session_count: 0,
            last_reset_date: Some(now.date()),
            last_reset_hour: Some(hour_bucket(now)),
        }
    }

    pub fn daily_count_at(&self, now: NaiveDateTime) -> u32 {
        if self.last_reset_date == Some(now.date()) {
            self.daily_count
        } else {
            0
        }
    }

    pub fn hourly_count_at(&self, now: NaiveDateTime) -> u32 {
        if self.last_reset_hour == Some(hour_bucket(now)) {
            self.hourly_count
        } else {
            0
        }
    }

    pub fn roll_over(&mut self, now: NaiveDateTime) {
        if self.last_reset_date != Some(now.date()) {
            if let Some(previous) = self.last_reset_date {
                tracing::debug!("daily counter reset ({} -> {})", previous, now.date());
            }
            self.daily_count = 0;
            self.last_reset_date = Some(now.date());
        }
        let bucket = hour_bucket(now);
        if self.last_reset_hour != Some(bucket) {
            self.hourly_count = 0;
            self.last_reset_hour = Some(bucket);
        }
    }

    pub fn record_admission(&mut self, now: NaiveDateTime) {
        self.roll_over(now);
        self.daily_count += 1;
        self.hourly_count += 1;
        self.session_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    Duplicate,
    ExcludedCompany(String),
    ExcludedKeyword(String),
    SessionLimit(u32),
    DailyLimit(u32),
    HourlyLimit(u32),
    OutsideHours(u32),
    Weekend,
    BelowThreshold(f64),
    PoorFit(f64),
    NotSelected(Priority),
}

impl DenyReason {
    /// Stable short name, used to group denials in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            DenyReason::Duplicate => "duplicate",
            DenyReason::ExcludedCompany(_) => "excluded_company",
            DenyReason::ExcludedKeyword(_) => "excluded_keyword",
            DenyReason::SessionLimit(_) => "session_limit",
            DenyReason::DailyLimit(_) => "daily_limit",
            DenyReason::HourlyLimit(_) => "hourly_limit",
            DenyReason::OutsideHours(_) => "outside_hours",
            DenyReason::Weekend => "weekend",
            DenyReason::BelowThreshold(_) => "below_threshold",
            DenyReason::PoorFit(_) => "poor_fit",
            DenyReason::NotSelected(_) => "not_selected",
        }
    }

    /// Limits and time windows apply to every later job in the batch too.
    pub fn is_rate_gate(&self) -> bool {
        matches!(
            self,
            DenyReason::SessionLimit(_)
                | DenyReason::DailyLimit(_)
                | DenyReason::HourlyLimit(_)
                | DenyReason::OutsideHours(_)
                | DenyReason::Weekend
        )
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Duplicate => write!(f, "Already applied to this job URL"),
            DenyReason::ExcludedCompany(c) => write!(f, "Company matches excluded entry '{}'", c),
            DenyReason::ExcludedKeyword(k) => write!(f, "Listing contains excluded keyword '{}'", k),
            DenyReason::SessionLimit(n) => write!(f, "Session application limit reached ({})", n),
            DenyReason::DailyLimit(n) => write!(f, "Daily application limit reached ({})", n),
            DenyReason::HourlyLimit(n) => write!(f, "Hourly application limit reached ({})", n),
            DenyReason::OutsideHours(h) => write!(f, "Hour {} is outside the allowed application hours", h),
            DenyReason::Weekend => write!(f, "Weekend applications are disabled"),
            DenyReason::BelowThreshold(s) => write!(f, "Score {:.2} is below the minimum", s),
            DenyReason::PoorFit(s) => write!(f, "Candidate fit {:.2} is below the minimum", s),
            DenyReason::NotSelected(p) => write!(f, "Not selected in {} priority draw", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Admit(Priority),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit(_))
    }

    pub fn reason(&self) -> String {
        match self {
            Decision::Admit(priority) => format!("Admitted ({} priority)", priority),
            Decision::Deny(reason) => reason.to_string(),
        }
    }
}

pub struct AdmissionGate {
    exclude_companies: Vec<String>,
    exclude_keywords: Vec<String>,
    limits: LimitConfig,
    min_total_score: f64,
    min_match_score: f64,
    canonicalize_urls: bool,
}

impl AdmissionGate {
    pub fn new(config: &Config) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            exclude_companies: lower(&config.filters.exclude_companies),
            exclude_keywords: lower(&config.filters.exclude_keywords),
            limits: config.limits.clone(),
            min_total_score: config.filters.min_total_score,
            min_match_score: config.filters.min_match_score,
            canonicalize_urls: config.history.canonicalize_urls,
        }
    }

    pub fn url_key(&self, url: &str) -> String {
        url_key(url, self.canonicalize_urls)
    }

    pub fn should_admit(
        &self,
        listing: &JobListing,
        score: &JobScore,
        state: &RateLimitState,
        known: &dyn DuplicateIndex,
        now: NaiveDateTime,
        rng: &mut dyn RandomSource,
    ) -> Decision {
        if known.is_duplicate(&self.url_key(&listing.url)) {
            return Decision::Deny(DenyReason::Duplicate);
        }

        if let Some(reason) = self.check_exclusions(listing) {
            return Decision::Deny(reason);
        }

        if let Some(reason) = self.check_rate(state, now) {
            return Decision::Deny(reason);
        }

        if score.total_score < self.min_total_score {
            return Decision::Deny(DenyReason::BelowThreshold(score.total_score));
        }

        let daily = state.daily_count_at(now);
        let admitted = match score.priority {
            Priority::High => true,
            Priority::Medium => rng.next_f64() < MEDIUM_ADMIT_PROBABILITY,
            Priority::Low => {
                rng.next_f64() < LOW_ADMIT_PROBABILITY
                    && (daily as f64) < self.limits.daily_limit as f64 * LOW_PRIORITY_CAPACITY
            }
        };

        if admitted {
            Decision::Admit(score.priority)
        } else {
            Decision::Deny(DenyReason::NotSelected(score.priority))
        }
    }

    fn check_exclusions(&self, listing: &JobListing) -> Option<DenyReason> {
        let company = listing.company.to_lowercase();
        if let Some(hit) = self.exclude_companies.iter().find(|c| company.contains(c.as_str())) {
            return Some(DenyReason::ExcludedCompany(hit.clone()));
        }

        let text = format!("{} {}", listing.title, listing.description).to_lowercase();
        self.exclude_keywords
            .iter()
            .find(|k| text.contains(k.as_str()))
            .map(|k| DenyReason::ExcludedKeyword(k.clone()))
    }

    /// Candidates below the configured fit are never queued for admission.
    pub fn check_fit(&self, fit: f64) -> Option<DenyReason> {
        (fit < self.min_match_score).then_some(DenyReason::PoorFit(fit))
    }

    /// Rate and time-window checks alone, usable before any scoring work.
    pub fn check_rate(&self, state: &RateLimitState, now: NaiveDateTime) -> Option<DenyReason> {
        let limits = &self.limits;

        if state.session_count >= limits.session_limit {
            return Some(DenyReason::SessionLimit(limits.session_limit));
        }
        if state.daily_count_at(now) >= limits.daily_limit {
            return Some(DenyReason::DailyLimit(limits.daily_limit));
        }
        if state.hourly_count_at(now) >= limits.hourly_limit {
            return Some(DenyReason::HourlyLimit(limits.hourly_limit));
        }
        if !limits.allowed_hours.contains(&now.hour()) {
            return Some(DenyReason::OutsideHours(now.hour()));
        }
        if !limits.weekend_applications && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return Some(DenyReason::Weekend);
        }
        None
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
#[cfg(test)]
pub struct FixedRandom {
    values: Vec<f64>,
    next: usize,
}

#[cfg(test)]
impl FixedRandom {
    pub fn new(values: &[f64]) -> Self {
        Self {
            values: values.to_vec(),
            next: 0,
        }
    }

    pub fn always(value: f64) -> Self {
        Self::new(&[value])
    }
}

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn next_f64(&mut self) -> f64 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}
