use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::JobListing;
use crate::scoring::JobScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    InProgress,
    Applied,
    Failed,
    Skipped,
    Duplicate,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 6] = [
        ApplicationStatus::Pending,
        ApplicationStatus::InProgress,
        ApplicationStatus::Applied,
        ApplicationStatus::Failed,
        ApplicationStatus::Skipped,
        ApplicationStatus::Duplicate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::Skipped => "skipped",
            ApplicationStatus::Duplicate => "duplicate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Applied
                | ApplicationStatus::Failed
                | ApplicationStatus::Skipped
                | ApplicationStatus::Duplicate
        )
    }

    /// Statuses only ever move forward; nothing re-enters a state.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Duplicate)
                | (Pending, Skipped)
                | (InProgress, Applied)
                | (InProgress, Failed)
                | (InProgress, Skipped)
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move application {job_id} from {from} to {to}")]
pub struct TransitionError {
    pub job_id: String,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Generated resume and cover letter for one application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Materials {
    pub resume: String,
    pub cover_letter: String,
    #[serde(default)]
    pub resume_path: Option<PathBuf>,
    #[serde(default)]
    pub cover_letter_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobApplication {
    pub job_id: String,
    pub listing: JobListing,
    pub score: JobScore,
    pub materials: Option<Materials>,
    pub status: ApplicationStatus,
    pub approved: bool,
    pub created_at: NaiveDateTime,
    pub applied_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub notes: String,
}

/// `company_title_YYYYmmddHHMMSS`, filesystem-safe.
pub fn make_job_id(company: &str, title: &str, at: NaiveDateTime) -> String {
    format!("{}_{}_{}", company.trim(), title.trim(), at.format("%Y%m%d%H%M%S"))
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

impl JobApplication {
    pub fn new(listing: JobListing, score: JobScore, now: NaiveDateTime) -> Self {
        Self {
            job_id: make_job_id(&listing.company, &listing.title, now),
            listing,
            score,
            materials: None,
            status: ApplicationStatus::Pending,
            approved: false,
            created_at: now,
            applied_at: None,
            error_message: None,
            notes: String::new(),
        }
    }

    fn transition(&mut self, next: ApplicationStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Materials are generated and saved; the application awaits submission.
    pub fn attach_materials(&mut self, materials: Materials) -> Result<(), TransitionError> {
        self.transition(ApplicationStatus::InProgress)?;
        self.materials = Some(materials);
        Ok(())
    }

    pub fn mark_duplicate(&mut self) -> Result<(), TransitionError> {
        self.transition(ApplicationStatus::Duplicate)
    }

    pub fn mark_applied(&mut self, at: NaiveDateTime) -> Result<(), TransitionError> {
        self.transition(ApplicationStatus::Applied)?;
        self.applied_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ApplicationStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn mark_skipped(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(ApplicationStatus::Skipped)?;
        self.notes = format!("Rejected: {}", reason);
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), TransitionError> {
        if self.status != ApplicationStatus::InProgress {
            return Err(TransitionError {
                job_id: self.job_id.clone(),
                from: self.status,
                to: ApplicationStatus::Applied,
            });
        }
        self.approved = true;
        Ok(())
    }
}
