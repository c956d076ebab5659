use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::application::{ApplicationStatus, JobApplication};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn ts(at: NaiveDateTime) -> String {
    at.format(TS_FORMAT).to_string()
}

fn parse_ts(value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub applied_at: NaiveDateTime,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        crate::config::Config::default_data_dir().join("autoapply.db")
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applied_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applications (
                job_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                platform TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'applied', 'failed', 'skipped', 'duplicate')),
                approved INTEGER NOT NULL DEFAULT 0,
                total_score REAL NOT NULL,
                priority TEXT NOT NULL,
                created_at TEXT NOT NULL,
                applied_at TEXT,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_applied_at ON applied_history(applied_at);
            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_applications_created ON applications(created_at);
            "#,
        )?;
        Ok(())
    }

    // --- History ---

    pub fn is_duplicate(&self, url: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM applied_history WHERE url = ?1",
                [url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a URL to history. Returns false if it was already recorded.
    pub fn record_applied(&self, url: &str, at: NaiveDateTime) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO applied_history (url, applied_at) VALUES (?1, ?2)",
            params![url, ts(at)],
        )?;
        Ok(inserted > 0)
    }

    pub fn count_since(&self, since: NaiveDateTime) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM applied_history WHERE applied_at >= ?1",
            [ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Most recent first.
    pub fn recent_applied(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, applied_at FROM applied_history ORDER BY applied_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let applied_at: String = row.get(1)?;
            Ok(HistoryEntry {
                url: row.get(0)?,
                applied_at: parse_ts(&applied_at)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read history")
    }

    /// Every URL a new listing could collide with: history plus open applications.
    pub fn known_urls(&self) -> Result<HashSet<String>> {
        let mut urls = HashSet::new();

        let mut stmt = self.conn.prepare("SELECT url FROM applied_history")?;
        for url in stmt.query_map([], |row| row.get::<_, String>(0))? {
            urls.insert(url?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT url FROM applications WHERE status IN ('pending', 'in_progress')")?;
        for url in stmt.query_map([], |row| row.get::<_, String>(0))? {
            urls.insert(url?);
        }

        Ok(urls)
    }

    // --- Applications ---

    pub fn insert_application(&self, app: &JobApplication) -> Result<()> {
        let payload = serde_json::to_string(app)?;
        self.conn
            .execute(
                "INSERT INTO applications
                    (job_id, url, title, company, platform, status, approved,
                     total_score, priority, created_at, applied_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    app.job_id,
                    app.listing.url,
                    app.listing.title,
                    app.listing.company,
                    app.listing.platform.as_str(),
                    app.status.as_str(),
                    app.approved,
                    app.score.total_score,
                    app.score.priority.as_str(),
                    ts(app.created_at),
                    app.applied_at.map(ts),
                    payload,
                ],
            )
            .with_context(|| format!("Failed to store application {}", app.job_id))?;
        Ok(())
    }

    pub fn update_application(&self, app: &JobApplication) -> Result<()> {
        let payload = serde_json::to_string(app)?;
        let updated = self.conn.execute(
            "UPDATE applications
             SET status = ?1, approved = ?2, applied_at = ?3, payload = ?4
             WHERE job_id = ?5",
            params![
                app.status.as_str(),
                app.approved,
                app.applied_at.map(ts),
                payload,
                app.job_id,
            ],
        )?;
        if updated == 0 {
            return Err(anyhow!("Application {} not found", app.job_id));
        }
        Ok(())
    }

    pub fn job_id_exists(&self, job_id: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT job_id FROM applications WHERE job_id = ?1",
                [job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_application(&self, job_id: &str) -> Result<Option<JobApplication>> {
        let result = self.conn.query_row(
            "SELECT payload FROM applications WHERE job_id = ?1",
            [job_id],
            Self::row_to_application,
        );
        match result {
            Ok(app) => Ok(Some(app)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first, optionally restricted to one status.
    pub fn list_applications(&self, status: Option<ApplicationStatus>) -> Result<Vec<JobApplication>> {
        let mut sql = String::from("SELECT payload FROM applications");
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC, job_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s.as_str()], Self::row_to_application)?
        } else {
            stmt.query_map([], Self::row_to_application)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    /// IN_PROGRESS applications a reviewer has approved, oldest first.
    pub fn approved_applications(&self) -> Result<Vec<JobApplication>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM applications
             WHERE status = 'in_progress' AND approved = 1
             ORDER BY created_at, job_id",
        )?;
        let rows = stmt.query_map([], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list approved applications")
    }

    /// Applications created at or after `since`; seeds rate counters after a restart.
    pub fn count_applications_since(&self, since: NaiveDateTime) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM applications WHERE created_at >= ?1 AND status != 'duplicate'",
            [ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<JobApplication> {
        let payload: String = row.get(0)?;
        serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Materials;
    use crate::models::{JobListing, Platform};
    use crate::scoring::{JobScore, Priority};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn application(url: &str, created: NaiveDateTime) -> JobApplication {
        let listing = JobListing {
            title: "Data Analyst".to_string(),
            company: "Globex".to_string(),
            location: "Remote".to_string(),
            description: String::new(),
            url: url.to_string(),
            posted_date: String::new(),
            job_type: String::new(),
            salary: String::new(),
            skills: Default::default(),
            platform: Platform::Linkedin,
            scraped_at: created,
        };
        let score = JobScore {
            relevance_score: 0.4,
            company_score: 0.5,
            salary_score: 0.7,
            location_score: 1.0,
            experience_match: 1.0,
            skills_match: 0.5,
            total_score: 0.66,
            priority: Priority::Medium,
        };
        JobApplication::new(listing, score, created)
    }

    #[test]
    fn test_history_is_an_ordered_set() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.is_duplicate("https://a.example/1").unwrap());

        assert!(db.record_applied("https://a.example/1", at(14, 9)).unwrap());
        assert!(db.record_applied("https://a.example/2", at(14, 10)).unwrap());
        assert!(!db.record_applied("https://a.example/1", at(15, 9)).unwrap());

        assert!(db.is_duplicate("https://a.example/1").unwrap());
        assert!(!db.is_duplicate("https://A.example/1").unwrap());
        assert_eq!(db.count_since(at(14, 10)).unwrap(), 1);
        assert_eq!(db.count_since(at(1, 0)).unwrap(), 2);

        let recent = db.recent_applied(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://a.example/2");
        assert_eq!(recent[1].applied_at, at(14, 9));
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autoapply.db");
        {
            let db = Database::open(&path).unwrap();
            db.record_applied("https://a.example/1", at(14, 9)).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.is_duplicate("https://a.example/1").unwrap());
    }

    #[test]
    fn test_application_round_trip_and_update() {
        let db = Database::open_in_memory().unwrap();
        let mut app = application("https://a.example/3", at(14, 9));
        db.insert_application(&app).unwrap();
        assert!(db.job_id_exists(&app.job_id).unwrap());

        app.attach_materials(Materials {
            resume: "resume".to_string(),
            cover_letter: "letter".to_string(),
            ..Default::default()
        })
        .unwrap();
        app.approve().unwrap();
        db.update_application(&app).unwrap();

        let stored = db.get_application(&app.job_id).unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::InProgress);
        assert!(stored.approved);
        assert_eq!(stored.materials.unwrap().cover_letter, "letter");

        assert_eq!(db.approved_applications().unwrap().len(), 1);
        assert!(db.get_application("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_unknown_application_fails() {
        let db = Database::open_in_memory().unwrap();
        let app = application("https://a.example/4", at(14, 9));
        assert!(db.update_application(&app).is_err());
    }

    #[test]
    fn test_list_filters_by_status() {
        let db = Database::open_in_memory().unwrap();
        let pending = application("https://a.example/5", at(14, 9));
        let mut skipped = application("https://a.example/6", at(14, 10));
        skipped.mark_skipped("policy").unwrap();
        db.insert_application(&pending).unwrap();
        db.insert_application(&skipped).unwrap();

        assert_eq!(db.list_applications(None).unwrap().len(), 2);
        let only = db.list_applications(Some(ApplicationStatus::Skipped)).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].listing.url, "https://a.example/6");
    }

    #[test]
    fn test_known_urls_include_open_applications_only() {
        let db = Database::open_in_memory().unwrap();
        db.record_applied("https://a.example/h", at(13, 9)).unwrap();

        let open = application("https://a.example/open", at(14, 9));
        let mut failed = application("https://a.example/failed", at(14, 10));
        failed.attach_materials(Materials::default()).unwrap();
        failed.mark_failed("timeout").unwrap();
        db.insert_application(&open).unwrap();
        db.insert_application(&failed).unwrap();

        let known = db.known_urls().unwrap();
        assert!(known.contains("https://a.example/h"));
        assert!(known.contains("https://a.example/open"));
        assert!(!known.contains("https://a.example/failed"));
    }

    #[test]
    fn test_count_applications_since() {
        let db = Database::open_in_memory().unwrap();
        db.insert_application(&application("https://a.example/7", at(13, 15))).unwrap();
        db.insert_application(&application("https://a.example/8", at(14, 9))).unwrap();
        db.insert_application(&application("https://a.example/9", at(14, 10))).unwrap();

        assert_eq!(db.count_applications_since(at(14, 0)).unwrap(), 2);
        assert_eq!(db.count_applications_since(at(14, 10)).unwrap(), 1);
    }
}
