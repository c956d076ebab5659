//! Job match scoring.
//!
//! Six sub-scores, each clamped to [0, 1], combined with a configurable
//! weight vector into a total in [0, 1] and bucketed into a priority tier.
//! Scoring is total: missing or empty inputs contribute 0 instead of failing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::{ScoreWeights, ScoringConfig};
use crate::models::{CandidateProfile, Education, JobListing, JobRequirements};

pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.8;
pub const MEDIUM_PRIORITY_THRESHOLD: f64 = 0.6;

/// Used when either the posting's pay or the candidate's target is unknown.
pub const NEUTRAL_SALARY_SCORE: f64 = 0.7;
pub const NEUTRAL_COMPANY_SCORE: f64 = 0.5;

// Absorbs float accumulation so a weighted sum that is "exactly" on a
// threshold lands in the higher tier.
const TIER_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_total(total: f64) -> Self {
        if total + TIER_EPSILON >= HIGH_PRIORITY_THRESHOLD {
            Priority::High
        } else if total + TIER_EPSILON >= MEDIUM_PRIORITY_THRESHOLD {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobScore {
    pub relevance_score: f64,
    pub company_score: f64,
    pub salary_score: f64,
    pub location_score: f64,
    pub experience_match: f64,
    pub skills_match: f64,
    pub total_score: f64,
    pub priority: Priority,
}

pub struct JobScorer {
    weights: ScoreWeights,
    relevant_keywords: Vec<String>,
    preferred_companies: Vec<String>,
    blacklisted_companies: Vec<String>,
    min_salary: Option<u64>,
}

impl JobScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            weights: config.weights,
            relevant_keywords: lower(&config.relevant_keywords),
            preferred_companies: lower(&config.preferred_companies),
            blacklisted_companies: lower(&config.blacklisted_companies),
            min_salary: config.min_salary,
        }
    }

    pub fn score(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> JobScore {
        let relevance_score =
            relevance_score(&listing.title, &listing.description, &self.relevant_keywords);
        let company_score = self.company_score(&listing.company);

        let pay = parse_salary_range(&listing.salary).or(requirements.salary_range);
        let salary_score = salary_score(pay, self.min_salary);

        let location_score = location_score(&listing.location, &listing.job_type);

        let required_years = requirements
            .experience_years
            .unwrap_or_else(|| requirements.job_level.min_years());
        let experience_match = experience_match(required_years, candidate.experience_years);

        let skills_match = skills_match(&candidate.skills, requirements);

        let w = &self.weights;
        let total_score = (relevance_score * w.relevance
            + company_score * w.company
            + salary_score * w.salary
            + location_score * w.location
            + experience_match * w.experience
            + skills_match * w.skills)
            .clamp(0.0, 1.0);

        JobScore {
            relevance_score,
            company_score,
            salary_score,
            location_score,
            experience_match,
            skills_match,
            total_score,
            priority: Priority::from_total(total_score),
        }
    }

    /// How well the candidate meets the job's stated requirements: skills
    /// 0.6, experience 0.3, education 0.1. Used to filter and order a batch;
    /// it does not feed `total_score`.
    pub fn candidate_fit(&self, requirements: &JobRequirements, candidate: &CandidateProfile) -> f64 {
        let required_years = requirements
            .experience_years
            .unwrap_or_else(|| requirements.job_level.min_years());

        (skills_match(&candidate.skills, requirements) * 0.6
            + experience_match(required_years, candidate.experience_years) * 0.3
            + education_match(&requirements.education_requirements, &candidate.education) * 0.1)
            .clamp(0.0, 1.0)
    }

    fn company_score(&self, company: &str) -> f64 {
        let company = company.to_lowercase();
        if self.preferred_companies.iter().any(|p| company.contains(p.as_str())) {
            1.0
        } else if self.blacklisted_companies.iter().any(|b| company.contains(b.as_str())) {
            0.0
        } else {
            NEUTRAL_COMPANY_SCORE
        }
    }
}

fn relevance_score(title: &str, description: &str, keywords: &[String]) -> f64 {
    let title = title.to_lowercase();
    let description = description.to_lowercase();

    let mut score = 0.0;
    for keyword in keywords {
        if title.contains(keyword.as_str()) {
            score += 0.3;
        }
        if description.contains(keyword.as_str()) {
            score += 0.1;
        }
    }
    f64::min(score, 1.0)
}

fn salary_score(pay: Option<(u64, u64)>, min_salary: Option<u64>) -> f64 {
    match (pay, min_salary) {
        (Some((_, max)), Some(target)) if target > 0 => (max as f64 / target as f64).clamp(0.0, 1.0),
        _ => NEUTRAL_SALARY_SCORE,
    }
}

fn location_score(location: &str, work_style: &str) -> f64 {
    let location = location.to_lowercase();
    let work_style = work_style.to_lowercase();

    if location.contains("remote") || work_style.contains("remote") {
        1.0
    } else if location.contains("hybrid") || work_style.contains("hybrid") {
        0.8
    } else {
        0.6
    }
}

fn experience_match(required_years: u32, candidate_years: u32) -> f64 {
    if required_years <= candidate_years {
        1.0
    } else if required_years <= candidate_years + 2 {
        0.7
    } else {
        0.3
    }
}

/// Share of the job's skills (required and preferred) the candidate has.
fn skills_match(candidate: &BTreeSet<String>, requirements: &JobRequirements) -> f64 {
    let job_skills: BTreeSet<String> = requirements
        .required_skills
        .iter()
        .chain(requirements.preferred_skills.iter())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if job_skills.is_empty() {
        return 0.0;
    }

    let candidate: BTreeSet<String> = candidate.iter().map(|s| s.trim().to_lowercase()).collect();
    let matched = job_skills.intersection(&candidate).count();
    matched as f64 / job_skills.len() as f64
}

/// 1 bachelor, 2 master, 3 doctorate.
fn word_rank(word: &str) -> Option<u8> {
    if word.starts_with("phd") || word.starts_with("ph.d") || word.starts_with("doctor") {
        Some(3)
    } else if word.starts_with("master")
        || matches!(word, "ms" | "msc" | "m.sc" | "mba" | "m.tech" | "mtech")
    {
        Some(2)
    } else if word.starts_with("bachelor")
        || matches!(word, "bs" | "bsc" | "b.sc" | "b.tech" | "btech" | "b.e")
    {
        Some(1)
    } else {
        None
    }
}

fn degree_rank(text: &str) -> Option<u8> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '/' | '\''))
        .filter_map(word_rank)
        .max()
}

/// 1.0 when nothing is asked for or the candidate's best degree meets the
/// lowest one asked for, 0.5 when the candidate lists no education.
fn education_match(required: &[String], education: &[Education]) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    if education.is_empty() {
        return 0.5;
    }

    let held = education.iter().filter_map(|e| degree_rank(&e.degree)).max();
    let asked = required.iter().filter_map(|r| degree_rank(r)).min();
    match (held, asked) {
        (Some(held), Some(asked)) if held >= asked => 1.0,
        (Some(_), None) => 1.0,
        _ => 0.7,
    }
}

/// Parse free-text pay ("$120k - $150k", "10-15 LPA", "$45/hour") into a
/// yearly (min, max) range.
pub fn parse_salary_range(text: &str) -> Option<(u64, u64)> {
    let lower = text.to_lowercase();
    let re = Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*(k\b|lpa\b|lakhs?\b|l\b)?").ok()?;

    let amounts: Vec<(f64, Option<f64>)> = re
        .captures_iter(&lower)
        .filter_map(|caps| {
            let value = caps[1].replace(',', "").parse::<f64>().ok()?;
            let unit = caps.get(2).map(|m| match m.as_str() {
                "k" => 1_000.0,
                _ => 100_000.0,
            });
            Some((value, unit))
        })
        .take(2)
        .collect();

    let (first, second) = match amounts.as_slice() {
        [] => return None,
        [only] => (*only, *only),
        [a, b, ..] => (*a, *b),
    };

    // "10-15 LPA": the unit on one bound applies to both
    let unit = first.1.or(second.1).unwrap_or(1.0);
    let per_year = if lower.contains("hour") || lower.contains("/hr") {
        2_080.0
    } else if lower.contains("month") || lower.contains("/mo") {
        12.0
    } else {
        1.0
    };

    let to_yearly = |value: f64, own_unit: Option<f64>| -> u64 {
        (value * own_unit.unwrap_or(unit) * per_year).round() as u64
    };

    let min = to_yearly(first.0, first.1);
    let max = to_yearly(second.0, second.1);
    if min == 0 && max == 0 {
        return None;
    }
    Some((min.min(max), min.max(max)))
}
