//! Files a run leaves behind: per-application folders, the session document,
//! and the exported report. JSON is always written to a temp file in the
//! target directory and renamed into place.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::application::{ApplicationStatus, JobApplication, Materials};
use crate::config::Config;

const TOP_MATCHES: usize = 5;

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

pub fn application_dir(output_dir: &Path, job_id: &str) -> PathBuf {
    output_dir.join(job_id)
}

/// Write resume.txt and cover_letter.txt, recording where they went.
pub fn write_materials(dir: &Path, materials: &mut Materials) -> Result<()> {
    let resume_path = dir.join("resume.txt");
    write_atomic(&resume_path, materials.resume.as_bytes())?;
    materials.resume_path = Some(resume_path);

    let cover_letter_path = dir.join("cover_letter.txt");
    write_atomic(&cover_letter_path, materials.cover_letter.as_bytes())?;
    materials.cover_letter_path = Some(cover_letter_path);
    Ok(())
}

/// Flat key-value record of one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSummary {
    pub job_id: String,
    pub job_title: String,
    pub company_name: String,
    pub job_url: String,
    pub platform: String,
    pub match_score: f64,
    pub relevance_score: f64,
    pub company_score: f64,
    pub salary_score: f64,
    pub location_score: f64,
    pub experience_match: f64,
    pub skills_match: f64,
    pub priority: String,
    pub status: ApplicationStatus,
    pub approved: bool,
    pub created_at: NaiveDateTime,
    pub applied_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub notes: String,
}

impl From<&JobApplication> for ApplicationSummary {
    fn from(app: &JobApplication) -> Self {
        let score = &app.score;
        Self {
            job_id: app.job_id.clone(),
            job_title: app.listing.title.clone(),
            company_name: app.listing.company.clone(),
            job_url: app.listing.url.clone(),
            platform: app.listing.platform.to_string(),
            match_score: score.total_score,
            relevance_score: score.relevance_score,
            company_score: score.company_score,
            salary_score: score.salary_score,
            location_score: score.location_score,
            experience_match: score.experience_match,
            skills_match: score.skills_match,
            priority: score.priority.to_string(),
            status: app.status,
            approved: app.approved,
            created_at: app.created_at,
            applied_at: app.applied_at,
            error_message: app.error_message.clone(),
            notes: app.notes.clone(),
        }
    }
}

/// (Re)write `<output_dir>/<job_id>/application_summary.json`.
pub fn write_summary(output_dir: &Path, app: &JobApplication) -> Result<PathBuf> {
    let path = application_dir(output_dir, &app.job_id).join("application_summary.json");
    write_json_atomic(&path, &ApplicationSummary::from(app))?;
    Ok(path)
}

/// Counters collected while a batch runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub session_start: Option<NaiveDateTime>,
    pub session_end: Option<NaiveDateTime>,
    pub jobs_found: usize,
    pub jobs_analyzed: usize,
    pub applications_created: usize,
    pub applications_submitted: usize,
    pub generation_failures: usize,
    pub parse_failures: usize,
    /// Denials keyed by reason kind.
    pub denied: BTreeMap<String, usize>,
}

impl SessionStats {
    pub fn deny(&mut self, kind: &str) {
        *self.denied.entry(kind.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopMatch {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub total_score: f64,
    pub priority: String,
    pub status: ApplicationStatus,
}

/// End-of-run report: always produced, even when some jobs failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub by_status: BTreeMap<String, usize>,
    pub denied: BTreeMap<String, usize>,
    pub top_matches: Vec<TopMatch>,
    pub average_score: f64,
    pub stats: SessionStats,
    pub session_file: Option<PathBuf>,
}

impl RunSummary {
    pub fn new(applications: &[JobApplication], stats: SessionStats) -> Self {
        let mut by_status = BTreeMap::new();
        for status in ApplicationStatus::ALL {
            by_status.insert(status.to_string(), 0);
        }
        for app in applications {
            *by_status.entry(app.status.to_string()).or_insert(0) += 1;
        }

        let scored: Vec<&JobApplication> = applications
            .iter()
            .filter(|a| a.status != ApplicationStatus::Duplicate)
            .collect();

        let average_score = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|a| a.score.total_score).sum::<f64>() / scored.len() as f64
        };

        let mut ranked = scored;
        ranked.sort_by(|a, b| {
            b.score
                .total_score
                .partial_cmp(&a.score.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top_matches = ranked
            .into_iter()
            .take(TOP_MATCHES)
            .map(|a| TopMatch {
                job_id: a.job_id.clone(),
                title: a.listing.title.clone(),
                company: a.listing.company.clone(),
                total_score: a.score.total_score,
                priority: a.score.priority.to_string(),
                status: a.status,
            })
            .collect();

        Self {
            by_status,
            denied: stats.denied.clone(),
            top_matches,
            average_score,
            stats,
            session_file: None,
        }
    }

    pub fn count(&self, status: ApplicationStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub job_titles: Vec<String>,
    pub locations: Vec<String>,
    pub platforms: Vec<String>,
    pub min_total_score: f64,
    pub min_match_score: f64,
    pub resume_strategy: String,
    pub cover_letter_template: String,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            job_titles: config.search.job_titles.clone(),
            locations: config.search.locations.clone(),
            platforms: config.search.platforms.clone(),
            min_total_score: config.filters.min_total_score,
            min_match_score: config.filters.min_match_score,
            resume_strategy: format!("{:?}", config.generation.resume_strategy).to_lowercase(),
            cover_letter_template: config.generation.cover_letter_template.clone(),
        }
    }
}

/// Session-level aggregate written once at the end of each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub config: SessionSettings,
    pub statistics: SessionStats,
    pub applications: Vec<ApplicationSummary>,
}

pub fn write_session(
    output_dir: &Path,
    config: &Config,
    stats: &SessionStats,
    applications: &[JobApplication],
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let doc = SessionDocument {
        config: SessionSettings::from(config),
        statistics: stats.clone(),
        applications: applications.iter().map(ApplicationSummary::from).collect(),
    };
    let path = output_dir.join(format!("session_{}.json", now.format("%Y%m%d_%H%M%S")));
    write_json_atomic(&path, &doc)?;
    Ok(path)
}

/// Everything in the store, for `autoapply report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationsReport {
    pub generated_at: NaiveDateTime,
    pub total_applications: usize,
    pub by_status: BTreeMap<String, usize>,
    pub applications: Vec<ApplicationSummary>,
}

pub fn export_report(path: &Path, applications: &[JobApplication], now: NaiveDateTime) -> Result<()> {
    let mut by_status = BTreeMap::new();
    for app in applications {
        *by_status.entry(app.status.to_string()).or_insert(0) += 1;
    }
    let report = ApplicationsReport {
        generated_at: now,
        total_applications: applications.len(),
        by_status,
        applications: applications.iter().map(ApplicationSummary::from).collect(),
    };
    write_json_atomic(path, &report)
}
