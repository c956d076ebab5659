use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{CandidateProfile, Education};

const WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scoring weights must sum to 1.0 (got {0:.3})")]
    WeightSum(f64),

    #[error("scoring weight '{0}' is negative")]
    NegativeWeight(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("allowed hour {0} is not a valid hour of day")]
    InvalidHour(u32),

    #[error("delay range is empty: min {0}s > max {1}s")]
    DelayRange(u64, u64),

    #[error("{0} {1} is outside [0, 1]")]
    ScoreThreshold(&'static str, f64),
}

/// Everything a run needs, loaded from TOML and merged onto the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub filters: FilterConfig,
    pub limits: LimitConfig,
    pub submission: SubmissionConfig,
    pub history: HistoryConfig,
    pub generation: GenerationConfig,
    pub candidate: CandidateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub job_titles: Vec<String>,
    pub locations: Vec<String>,
    pub platforms: Vec<String>,
    pub max_jobs_per_search: usize,
    /// Open each result to read the full description.
    pub fetch_descriptions: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            job_titles: Vec::new(),
            locations: vec!["Remote".to_string()],
            platforms: vec!["linkedin".to_string()],
            max_jobs_per_search: 50,
            fetch_descriptions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub relevance: f64,
    pub company: f64,
    pub salary: f64,
    pub location: f64,
    pub experience: f64,
    pub skills: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance: 0.3,
            company: 0.2,
            salary: 0.15,
            location: 0.1,
            experience: 0.15,
            skills: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.relevance + self.company + self.salary + self.location + self.experience + self.skills
    }

    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("relevance", self.relevance),
            ("company", self.company),
            ("salary", self.salary),
            ("location", self.location),
            ("experience", self.experience),
            ("skills", self.skills),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub relevant_keywords: Vec<String>,
    pub preferred_companies: Vec<String>,
    pub blacklisted_companies: Vec<String>,
    /// Yearly salary the candidate targets. Without it salary scores neutral.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_salary: Option<u64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            relevant_keywords: ["python", "data", "engineer", "developer", "analyst"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preferred_companies: Vec::new(),
            blacklisted_companies: Vec::new(),
            min_salary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub exclude_companies: Vec<String>,
    pub exclude_keywords: Vec<String>,
    /// Jobs scoring below this are denied before the priority draw. 0 disables.
    pub min_total_score: f64,
    /// Minimum candidate fit (skills, experience, education). 0 disables.
    pub min_match_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub daily_limit: u32,
    pub hourly_limit: u32,
    pub session_limit: u32,
    pub allowed_hours: Vec<u32>,
    pub weekend_applications: bool,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50,
            hourly_limit: 10,
            session_limit: 100,
            allowed_hours: vec![9, 10, 11, 14, 15, 16],
            weekend_applications: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    DryRun,
    Webdriver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    pub apply_immediately: bool,
    pub review_before_apply: bool,
    pub delay_secs: (u64, u64),
    pub handler: HandlerKind,
    pub webdriver_url: String,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            apply_immediately: false,
            review_before_apply: true,
            delay_secs: (300, 600),
            handler: HandlerKind::DryRun,
            webdriver_url: "http://localhost:4444".to_string(),
        }
    }
}

impl SubmissionConfig {
    /// Submit right after creation instead of waiting for review.
    pub fn auto_submit(&self) -> bool {
        self.apply_immediately && !self.review_before_apply
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Strip query strings and fragments before comparing URLs.
    pub canonicalize_urls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeStrategy {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// "template" (offline), a short model name such as "api-sonnet", or
    /// "<claude-cli|anthropic|openai>:<model id>".
    pub provider: String,
    pub resume_strategy: ResumeStrategy,
    pub cover_letter_template: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "template".to_string(),
            resume_strategy: ResumeStrategy::Moderate,
            cover_letter_template: "professional".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    pub name: String,
    pub skills: Vec<String>,
    pub experience_years: u32,
    pub education: Vec<Education>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_path: Option<PathBuf>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "autoapply") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("autoapply.toml")
        }
    }

    pub fn default_data_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "autoapply") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&text)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.scoring.weights;
        for (name, value) in weights.named() {
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight(name));
            }
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }

        if self.limits.daily_limit == 0 {
            return Err(ConfigError::ZeroLimit("daily_limit"));
        }
        if self.limits.hourly_limit == 0 {
            return Err(ConfigError::ZeroLimit("hourly_limit"));
        }
        if self.limits.session_limit == 0 {
            return Err(ConfigError::ZeroLimit("session_limit"));
        }
        if let Some(hour) = self.limits.allowed_hours.iter().find(|h| **h > 23) {
            return Err(ConfigError::InvalidHour(*hour));
        }

        let (min, max) = self.submission.delay_secs;
        if min > max {
            return Err(ConfigError::DelayRange(min, max));
        }

        for (name, threshold) in [
            ("min_total_score", self.filters.min_total_score),
            ("min_match_score", self.filters.min_match_score),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::ScoreThreshold(name, threshold));
            }
        }

        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("applications"))
    }

    /// Build the candidate profile, reading the resume text if one is configured.
    pub fn candidate_profile(&self) -> Result<CandidateProfile> {
        let resume_text = match &self.candidate.resume_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read resume file: {}", path.display()))?,
            None => String::new(),
        };

        Ok(CandidateProfile {
            name: self.candidate.name.clone(),
            skills: self.candidate.skills.iter().map(|s| s.trim().to_lowercase()).collect(),
            education: self.candidate.education.clone(),
            experience_years: self.candidate.experience_years,
            resume_text,
        })
    }
}
