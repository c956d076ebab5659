//! The batch loop: score, admit, generate, and (optionally) submit.
//!
//! Everything runs on one thread, one job at a time. Submissions are separated
//! by a random throttle delay and never overlap.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::admission::{
    uniform_secs, AdmissionGate, Decision, RandomSource, RateLimitState, ThreadRandom,
};
use crate::ai::{build_generator, MaterialGenerator};
use crate::application::{ApplicationStatus, JobApplication};
use crate::config::Config;
use crate::db::Database;
use crate::models::{CandidateProfile, JobListing, JobRequirements};
use crate::report::{self, RunSummary, SessionStats};
use crate::requirements::{build_parser, RequirementsParser};
use crate::scoring::{JobScore, JobScorer};
use crate::submit::{HandlerRegistry, Outcome, SubmissionHandler};

/// Blocking wait between submissions.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct Pipeline {
    config: Config,
    db: Database,
    gate: AdmissionGate,
    scorer: JobScorer,
    parser: Box<dyn RequirementsParser>,
    generator: Box<dyn MaterialGenerator>,
    registry: HandlerRegistry,
    candidate: CandidateProfile,
    rng: Box<dyn RandomSource>,
    sleeper: Box<dyn Sleeper>,
}

/// A scored listing waiting for its admission draw.
struct Scored {
    listing: JobListing,
    requirements: JobRequirements,
    score: JobScore,
}

fn day_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN)
}

fn hour_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .and_hms_opt(now.hour(), 0, 0)
        .unwrap_or(now)
}

impl Pipeline {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let candidate = config.candidate_profile()?;
        let parser = build_parser(&config.generation)?;
        let generator = build_generator(&config.generation)?;
        let registry = HandlerRegistry::from_config(&config.submission)?;

        Ok(Self {
            gate: AdmissionGate::new(&config),
            scorer: JobScorer::new(&config.scoring),
            parser,
            generator,
            registry,
            candidate,
            rng: Box::new(ThreadRandom),
            sleeper: Box::new(ThreadSleeper),
            config,
            db,
        })
    }

    pub fn with_rng(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[cfg(test)]
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[cfg(test)]
    pub fn with_generator(mut self, generator: Box<dyn MaterialGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn output_dir(&self) -> PathBuf {
        self.config.output_dir()
    }

    /// Recover today's and this hour's admissions from the store.
    fn seed_rate_state(&self, now: NaiveDateTime) -> Result<RateLimitState> {
        let daily = self.db.count_applications_since(day_start(now))?;
        let hourly = self.db.count_applications_since(hour_start(now))?;
        tracing::debug!("seeded rate counters: {} today, {} this hour", daily, hourly);
        Ok(RateLimitState::seeded(daily, hourly, now))
    }

    fn unique_job_id(&self, app: &JobApplication, taken: &HashSet<String>) -> Result<String> {
        let base = app.job_id.clone();
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate) || self.db.job_id_exists(&candidate)? {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }

    fn record_denial(stats: &mut SessionStats, listing: &JobListing, decision: &Decision) {
        if let Decision::Deny(reason) = decision {
            stats.deny(reason.kind());
            if reason.is_rate_gate() {
                tracing::info!("{} at {}: {}", listing.title, listing.company, reason);
            } else {
                tracing::debug!("{} at {}: {}", listing.title, listing.company, reason);
            }
        }
    }

    /// Build an application for an admitted listing, generate its materials
    /// and write them to disk. The result is IN_PROGRESS but not yet stored.
    pub fn create_application(
        &self,
        listing: JobListing,
        requirements: &JobRequirements,
        score: JobScore,
        at: NaiveDateTime,
        taken: &HashSet<String>,
    ) -> Result<JobApplication> {
        let mut app = JobApplication::new(listing, score, at);
        app.job_id = self.unique_job_id(&app, taken)?;

        let mut materials = self
            .generator
            .generate(&app.listing, requirements, &self.candidate)
            .with_context(|| format!("Material generation failed for {}", app.job_id))?;
        let dir = report::application_dir(&self.output_dir(), &app.job_id);
        report::write_materials(&dir, &mut materials)?;
        app.attach_materials(materials)?;
        Ok(app)
    }

    pub fn run_batch(
        &mut self,
        listings: Vec<JobListing>,
        now: &dyn Fn() -> NaiveDateTime,
    ) -> Result<RunSummary> {
        let started = now();
        let mut stats = SessionStats {
            session_start: Some(started),
            jobs_found: listings.len(),
            ..Default::default()
        };
        let mut rate = self.seed_rate_state(started)?;
        let known: HashSet<String> = self
            .db
            .known_urls()?
            .iter()
            .map(|url| self.gate.url_key(url))
            .collect();
        let mut seen = HashSet::new();
        let mut job_ids = HashSet::new();
        let mut results: Vec<JobApplication> = Vec::new();
        let mut queue: Vec<Scored> = Vec::new();

        tracing::info!("processing {} listings", listings.len());

        for listing in listings {
            let at = now();
            let key = self.gate.url_key(&listing.url);

            // A URL gets one admission attempt per batch, whatever its outcome.
            if known.contains(&key) || !seen.insert(key) {
                let score = self
                    .scorer
                    .score(&listing, &JobRequirements::default(), &self.candidate);
                let mut app = JobApplication::new(listing, score, at);
                app.mark_duplicate()?;
                tracing::debug!("{}: already seen {}", app.job_id, app.listing.url);
                stats.deny("duplicate");
                results.push(app);
                continue;
            }

            if let Some(reason) = self.gate.check_rate(&rate, at) {
                Self::record_denial(&mut stats, &listing, &Decision::Deny(reason));
                continue;
            }

            let requirements = match self.parser.parse(&listing) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("could not parse {}: {:#}", listing.url, e);
                    stats.parse_failures += 1;
                    continue;
                }
            };

            let score = self.scorer.score(&listing, &requirements, &self.candidate);
            stats.jobs_analyzed += 1;

            let fit = self.scorer.candidate_fit(&requirements, &self.candidate);
            if let Some(reason) = self.gate.check_fit(fit) {
                Self::record_denial(&mut stats, &listing, &Decision::Deny(reason));
                continue;
            }

            queue.push(Scored {
                listing,
                requirements,
                score,
            });
        }

        // Highest total first; quotas are spent on the strongest jobs.
        queue.sort_by(|a, b| b.score.total_score.total_cmp(&a.score.total_score));
        tracing::debug!("{} listings queued for admission", queue.len());

        for Scored {
            listing,
            requirements,
            score,
        } in queue
        {
            let at = now();
            let decision =
                self.gate
                    .should_admit(&listing, &score, &rate, &known, at, self.rng.as_mut());
            if !decision.is_admitted() {
                Self::record_denial(&mut stats, &listing, &decision);
                continue;
            }

            let app = match self.create_application(listing, &requirements, score, at, &job_ids) {
                Ok(app) => app,
                Err(e) => {
                    tracing::error!("{:#}", e);
                    stats.generation_failures += 1;
                    continue;
                }
            };

            self.db.insert_application(&app)?;
            report::write_summary(&self.output_dir(), &app)?;
            rate.record_admission(at);
            job_ids.insert(app.job_id.clone());
            stats.applications_created += 1;

            tracing::info!(
                "created {} ({} priority, score {:.2})",
                app.job_id,
                app.score.priority,
                app.score.total_score
            );
            results.push(app);
        }

        if self.config.submission.auto_submit() {
            let pending: Vec<&mut JobApplication> = results
                .iter_mut()
                .filter(|a| a.status == ApplicationStatus::InProgress)
                .collect();
            stats.applications_submitted += self.submit_sequence(pending, now)?;
        }

        let finished = now();
        stats.session_end = Some(finished);
        let session_file =
            report::write_session(&self.output_dir(), &self.config, &stats, &results, finished)?;

        let mut summary = RunSummary::new(&results, stats);
        summary.session_file = Some(session_file);
        Ok(summary)
    }

    /// Hand one IN_PROGRESS application to its handler and apply the outcome.
    /// Dry runs leave the application where it was.
    pub fn submit(
        application: &mut JobApplication,
        handler: &dyn SubmissionHandler,
        at: NaiveDateTime,
    ) -> ApplicationStatus {
        if application.status != ApplicationStatus::InProgress {
            tracing::warn!(
                "{} is {}, only in-progress applications are submitted",
                application.job_id,
                application.status
            );
            return application.status;
        }
        tracing::info!("submitting {} via {}", application.job_id, handler.name());

        let outcome = match handler.submit(application) {
            Ok(Outcome::Submitted) => application.mark_applied(at),
            Ok(Outcome::Incomplete) => application.mark_failed(format!("{} did not complete the submission", handler.name())),
            Ok(Outcome::Simulated) => {
                tracing::info!("{}: nothing sent, still in progress", application.job_id);
                return application.status;
            }
            Err(e) => application.mark_failed(format!("{:#}", e)),
        };

        match outcome {
            Ok(()) if application.status == ApplicationStatus::Applied => {
                tracing::info!("applied to {} at {}", application.listing.title, application.listing.company);
            }
            Ok(()) => tracing::error!(
                "submission failed for {}: {}",
                application.job_id,
                application.error_message.as_deref().unwrap_or("unknown error")
            ),
            Err(e) => tracing::warn!("{}", e),
        }
        application.status
    }

    fn throttle(&mut self) {
        let (min, max) = self.config.submission.delay_secs;
        let secs = uniform_secs(self.rng.as_mut(), min, max);
        tracing::info!("waiting {}s before next submission", secs);
        self.sleeper.sleep(Duration::from_secs(secs));
    }

    /// Submit one after another with a throttle delay between attempts.
    /// Every outcome is persisted before the next attempt starts.
    fn submit_sequence(
        &mut self,
        applications: Vec<&mut JobApplication>,
        now: &dyn Fn() -> NaiveDateTime,
    ) -> Result<usize> {
        let mut applied = 0;
        for (i, app) in applications.into_iter().enumerate() {
            if i > 0 {
                self.throttle();
            }

            let at = now();
            let handler = self.registry.handler_for(&app.listing.platform);
            if Self::submit(app, handler, at) == ApplicationStatus::Applied {
                self.db.record_applied(&self.gate.url_key(&app.listing.url), at)?;
                applied += 1;
            }
            self.db.update_application(app)?;
            report::write_summary(&self.output_dir(), app)?;
        }
        Ok(applied)
    }

    /// Submit reviewed applications: approved ones, or every open one with `all`.
    pub fn submit_approved(
        &mut self,
        all: bool,
        now: &dyn Fn() -> NaiveDateTime,
    ) -> Result<Vec<JobApplication>> {
        let mut applications = if all {
            self.db.list_applications(Some(ApplicationStatus::InProgress))?
        } else {
            self.db.approved_applications()?
        };
        tracing::info!("{} applications to submit", applications.len());

        self.submit_sequence(applications.iter_mut().collect(), now)?;
        Ok(applications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::FixedRandom;
    use crate::ai::TemplateGenerator;
    use crate::config::HandlerKind;
    use crate::application::Materials;
    use crate::models::Platform;
    use crate::submit::tests::RecordingHandler;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;

    // 2026-10-14 is a Wednesday; 10:15 is inside the default hours.
    fn wednesday() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    fn clock() -> impl Fn() -> NaiveDateTime {
        wednesday
    }

    struct RecordingSleeper(Rc<RefCell<Vec<Duration>>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.0.borrow_mut().push(duration);
        }
    }

    /// Fails for listings whose title mentions "broken".
    struct FlakyGenerator(TemplateGenerator);

    impl MaterialGenerator for FlakyGenerator {
        fn generate(
            &self,
            listing: &JobListing,
            requirements: &JobRequirements,
            candidate: &CandidateProfile,
        ) -> Result<Materials> {
            if listing.title.to_lowercase().contains("broken") {
                return Err(anyhow!("model timed out"));
            }
            self.0.generate(listing, requirements, candidate)
        }
    }

    fn listing(title: &str, url: &str) -> JobListing {
        JobListing {
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: "Python and SQL required. Build data pipelines.".to_string(),
            url: url.to_string(),
            posted_date: "1 day ago".to_string(),
            job_type: "Full-time".to_string(),
            salary: String::new(),
            skills: Default::default(),
            platform: Platform::Linkedin,
            scraped_at: wednesday(),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        db_path: PathBuf,
        sleeps: Rc<RefCell<Vec<Duration>>>,
    }

    impl Fixture {
        fn new(edit: impl FnOnce(&mut Config)) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.output_dir = Some(dir.path().join("out"));
            config.candidate.name = "Sam Doe".to_string();
            config.candidate.skills = vec!["python".to_string(), "sql".to_string()];
            config.candidate.experience_years = 3;
            edit(&mut config);
            Self {
                db_path: dir.path().join("autoapply.db"),
                _dir: dir,
                config,
                sleeps: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn pipeline(&self) -> Pipeline {
            let db = Database::open(&self.db_path).unwrap();
            Pipeline::new(self.config.clone(), db)
                .unwrap()
                .with_rng(Box::new(FixedRandom::always(0.0)))
                .with_sleeper(Box::new(RecordingSleeper(Rc::clone(&self.sleeps))))
                .with_generator(Box::new(FlakyGenerator(TemplateGenerator::new(
                    &self.config.generation,
                ))))
        }
    }

    fn auto_submit(config: &mut Config) {
        config.submission.apply_immediately = true;
        config.submission.review_before_apply = false;
        config.submission.delay_secs = (5, 5);
    }

    #[test]
    fn test_same_url_twice_in_one_run_is_duplicate() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Engineer", "https://jobs.example.com/1"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.count(ApplicationStatus::InProgress), 1);
        assert_eq!(summary.count(ApplicationStatus::Duplicate), 1);
        assert_eq!(summary.denied.get("duplicate"), Some(&1));
        assert_eq!(pipeline.db().list_applications(None).unwrap().len(), 1);
    }

    #[test]
    fn test_history_hit_is_duplicate() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        pipeline
            .db()
            .record_applied("https://jobs.example.com/old", wednesday())
            .unwrap();

        let summary = pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/old")], &clock())
            .unwrap();
        assert_eq!(summary.count(ApplicationStatus::Duplicate), 1);
        assert_eq!(summary.stats.applications_created, 0);
    }

    #[test]
    fn test_generation_failure_drops_job_and_continues() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(
                vec![
                    listing("Broken Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Analyst", "https://jobs.example.com/2"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.stats.generation_failures, 1);
        assert_eq!(summary.stats.applications_created, 1);
        let stored = pipeline.db().list_applications(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].listing.title, "Data Analyst");
    }

    #[test]
    fn test_created_application_has_files_on_disk() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/1")], &clock())
            .unwrap();

        let app = &pipeline.db().list_applications(None).unwrap()[0];
        let dir = fixture.config.output_dir().join(&app.job_id);
        assert!(dir.join("resume.txt").exists());
        assert!(dir.join("cover_letter.txt").exists());
        assert!(dir.join("application_summary.json").exists());
        assert_eq!(app.status, ApplicationStatus::InProgress);

        let session = summary.session_file.unwrap();
        assert!(session.exists());
        assert!(session.file_name().unwrap().to_string_lossy().starts_with("session_"));
    }

    #[test]
    fn test_create_application_attaches_materials() {
        let fixture = Fixture::new(|_| {});
        let pipeline = fixture.pipeline();
        let job = listing("Data Engineer", "https://jobs.example.com/1");
        let requirements = JobRequirements {
            required_skills: vec!["python".to_string()],
            ..Default::default()
        };
        let score = pipeline.scorer.score(&job, &requirements, &pipeline.candidate);

        let mut taken = HashSet::new();
        let app = pipeline
            .create_application(job.clone(), &requirements, score, wednesday(), &taken)
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::InProgress);
        let materials = app.materials.as_ref().unwrap();
        assert!(materials.resume_path.as_ref().unwrap().exists());
        assert!(materials.cover_letter.contains("Data Engineer"));

        taken.insert(app.job_id.clone());
        let second = pipeline
            .create_application(job, &requirements, score, wednesday(), &taken)
            .unwrap();
        assert_eq!(second.job_id, format!("{}_2", app.job_id));

        let err = pipeline
            .create_application(
                listing("Broken Role", "https://jobs.example.com/2"),
                &requirements,
                score,
                wednesday(),
                &taken,
            )
            .unwrap_err();
        assert!(format!("{:#}", err).contains("model timed out"));
    }

    #[test]
    fn test_excluded_keyword_is_counted() {
        let fixture = Fixture::new(|c| c.filters.exclude_keywords = vec!["unpaid".to_string()]);
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(
                vec![listing("Unpaid Data Intern", "https://jobs.example.com/1")],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.denied.get("excluded_keyword"), Some(&1));
        assert_eq!(summary.stats.applications_created, 0);
    }

    #[test]
    fn test_auto_submit_throttles_between_attempts() {
        let fixture = Fixture::new(auto_submit);
        let (handler, seen) = RecordingHandler::new("recording", Ok(Outcome::Submitted));
        let mut pipeline = fixture
            .pipeline()
            .with_registry(HandlerRegistry::new(Box::new(handler)));

        let summary = pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Analyst", "https://jobs.example.com/2"),
                    listing("Python Developer", "https://jobs.example.com/3"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(seen.borrow().len(), 3);
        assert_eq!(
            *fixture.sleeps.borrow(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
        assert_eq!(summary.count(ApplicationStatus::Applied), 3);
        assert_eq!(summary.stats.applications_submitted, 3);
        assert!(pipeline.db().is_duplicate("https://jobs.example.com/2").unwrap());
    }

    #[test]
    fn test_submission_failure_marks_failed_and_continues() {
        let fixture = Fixture::new(auto_submit);
        let (handler, seen) = RecordingHandler::new("broken", Err("form not found".to_string()));
        let mut pipeline = fixture
            .pipeline()
            .with_registry(HandlerRegistry::new(Box::new(handler)));

        let summary = pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Analyst", "https://jobs.example.com/2"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(summary.count(ApplicationStatus::Failed), 2);
        assert_eq!(fixture.sleeps.borrow().len(), 1);

        let failed = pipeline
            .db()
            .list_applications(Some(ApplicationStatus::Failed))
            .unwrap();
        assert_eq!(failed[0].error_message.as_deref(), Some("form not found"));
        assert!(!pipeline.db().is_duplicate("https://jobs.example.com/1").unwrap());
    }

    #[test]
    fn test_hourly_limit_survives_restart() {
        let fixture = Fixture::new(|c| c.limits.hourly_limit = 1);

        let first = fixture
            .pipeline()
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Analyst", "https://jobs.example.com/2"),
                ],
                &clock(),
            )
            .unwrap();
        assert_eq!(first.stats.applications_created, 1);
        assert_eq!(first.denied.get("hourly_limit"), Some(&1));

        let second = fixture
            .pipeline()
            .run_batch(vec![listing("Python Developer", "https://jobs.example.com/3")], &clock())
            .unwrap();
        assert_eq!(second.stats.applications_created, 0);
        assert_eq!(second.denied.get("hourly_limit"), Some(&1));
    }

    #[test]
    fn test_outside_hours_creates_nothing() {
        let fixture = Fixture::new(|c| c.limits.allowed_hours = vec![22]);
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/1")], &clock())
            .unwrap();
        assert_eq!(summary.denied.get("outside_hours"), Some(&1));
        assert_eq!(summary.stats.jobs_analyzed, 0);
    }

    #[test]
    fn test_submit_approved_only_sends_approved() {
        let fixture = Fixture::new(|_| {});
        let (handler, seen) = RecordingHandler::new("recording", Ok(Outcome::Submitted));
        let mut pipeline = fixture
            .pipeline()
            .with_registry(HandlerRegistry::new(Box::new(handler)));

        pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Analyst", "https://jobs.example.com/2"),
                ],
                &clock(),
            )
            .unwrap();

        let mut open = pipeline
            .db()
            .list_applications(Some(ApplicationStatus::InProgress))
            .unwrap();
        assert_eq!(open.len(), 2);
        let chosen = &mut open[0];
        chosen.approve().unwrap();
        pipeline.db().update_application(chosen).unwrap();

        let submitted = pipeline.submit_approved(false, &clock()).unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].status, ApplicationStatus::Applied);
        assert_eq!(*seen.borrow(), vec![chosen.job_id.clone()]);
        assert!(fixture.sleeps.borrow().is_empty());

        let rest = pipeline.submit_approved(true, &clock()).unwrap();
        assert_eq!(rest.len(), 1);
        assert_ne!(rest[0].job_id, chosen.job_id);
    }

    #[test]
    fn test_submit_outcomes() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/1")], &clock())
            .unwrap();
        let mut app = pipeline.db().list_applications(None).unwrap().remove(0);

        let (accepts, _) = RecordingHandler::new("accepts", Ok(Outcome::Submitted));
        let status = Pipeline::submit(&mut app, &accepts, wednesday());
        assert_eq!(status, ApplicationStatus::Applied);
        assert_eq!(app.applied_at, Some(wednesday()));

        // Terminal applications stay where they are.
        let status = Pipeline::submit(&mut app, &accepts, wednesday());
        assert_eq!(status, ApplicationStatus::Applied);

        let (declines, _) = RecordingHandler::new("declines", Ok(Outcome::Incomplete));
        let mut other = JobApplication::new(
            listing("Data Analyst", "https://jobs.example.com/2"),
            app.score,
            wednesday(),
        );
        other.attach_materials(Materials::default()).unwrap();
        assert_eq!(
            Pipeline::submit(&mut other, &declines, wednesday()),
            ApplicationStatus::Failed
        );
        assert!(other.error_message.unwrap().contains("declines"));
    }

    #[test]
    fn test_pending_application_is_not_handed_to_handler() {
        let (handler, seen) = RecordingHandler::new("recording", Ok(Outcome::Submitted));
        let score = JobScorer::new(&Config::default().scoring).score(
            &listing("Data Engineer", "https://jobs.example.com/1"),
            &JobRequirements::default(),
            &CandidateProfile::default(),
        );
        let mut pending = JobApplication::new(
            listing("Data Engineer", "https://jobs.example.com/1"),
            score,
            wednesday(),
        );

        let status = Pipeline::submit(&mut pending, &handler, wednesday());
        assert_eq!(status, ApplicationStatus::Pending);
        assert_eq!(pending.status, ApplicationStatus::Pending);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_dry_run_submission_leaves_history_alone() {
        let fixture = Fixture::new(|_| {});
        let mut pipeline = fixture.pipeline();
        pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/1")], &clock())
            .unwrap();

        let submitted = pipeline.submit_approved(true, &clock()).unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].status, ApplicationStatus::InProgress);
        assert!(submitted[0].applied_at.is_none());
        assert!(!pipeline.db().is_duplicate("https://jobs.example.com/1").unwrap());

        let stored = pipeline
            .db()
            .list_applications(Some(ApplicationStatus::InProgress))
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_dry_run_auto_submit_counts_nothing() {
        let fixture = Fixture::new(|c| {
            auto_submit(c);
            c.submission.handler = HandlerKind::DryRun;
        });
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(vec![listing("Data Engineer", "https://jobs.example.com/1")], &clock())
            .unwrap();

        assert_eq!(summary.stats.applications_submitted, 0);
        assert_eq!(summary.count(ApplicationStatus::InProgress), 1);
        assert_eq!(summary.count(ApplicationStatus::Applied), 0);
    }

    #[test]
    fn test_same_url_denied_once_is_still_duplicate() {
        let fixture = Fixture::new(|_| {});
        // Medium priority: the first copy loses its draw, the second would win.
        let mut pipeline = fixture
            .pipeline()
            .with_rng(Box::new(FixedRandom::new(&[0.9, 0.1])));
        let summary = pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Data Engineer", "https://jobs.example.com/1"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.count(ApplicationStatus::Duplicate), 1);
        assert_eq!(summary.count(ApplicationStatus::InProgress), 0);
        assert_eq!(summary.denied.get("not_selected"), Some(&1));
        assert_eq!(summary.denied.get("duplicate"), Some(&1));
        assert_eq!(summary.stats.jobs_analyzed, 1);
    }

    #[test]
    fn test_only_created_applications_use_quota() {
        let fixture = Fixture::new(|c| c.limits.hourly_limit = 1);
        // Equal scores keep input order: a lost draw, a generation failure,
        // then the one that should take the single hourly slot.
        let mut pipeline = fixture
            .pipeline()
            .with_rng(Box::new(FixedRandom::new(&[0.9, 0.0, 0.0])));
        let summary = pipeline
            .run_batch(
                vec![
                    listing("Data Engineer", "https://jobs.example.com/1"),
                    listing("Broken Data Engineer", "https://jobs.example.com/2"),
                    listing("Data Analyst", "https://jobs.example.com/3"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.denied.get("not_selected"), Some(&1));
        assert_eq!(summary.stats.generation_failures, 1);
        assert_eq!(summary.stats.applications_created, 1);
        assert!(summary.denied.get("hourly_limit").is_none());

        let stored = pipeline.db().list_applications(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].listing.title, "Data Analyst");
    }

    #[test]
    fn test_strongest_listing_gets_the_last_slot() {
        let fixture = Fixture::new(|c| c.limits.hourly_limit = 1);
        let mut pipeline = fixture.pipeline();
        let summary = pipeline
            .run_batch(
                vec![
                    listing("Office Coordinator", "https://jobs.example.com/1"),
                    listing("Data Engineer", "https://jobs.example.com/2"),
                ],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.stats.applications_created, 1);
        assert_eq!(summary.denied.get("hourly_limit"), Some(&1));
        let stored = pipeline.db().list_applications(None).unwrap();
        assert_eq!(stored[0].listing.title, "Data Engineer");
    }

    #[test]
    fn test_poor_fit_is_filtered_before_admission() {
        let fixture = Fixture::new(|c| c.filters.min_match_score = 0.6);
        let mut pipeline = fixture.pipeline();
        let mut rust_job = listing("Data Engineer", "https://jobs.example.com/1");
        rust_job.description = "Rust and Kafka required.".to_string();

        let summary = pipeline
            .run_batch(
                vec![rust_job, listing("Data Analyst", "https://jobs.example.com/2")],
                &clock(),
            )
            .unwrap();

        assert_eq!(summary.denied.get("poor_fit"), Some(&1));
        assert_eq!(summary.stats.applications_created, 1);
        assert_eq!(summary.stats.jobs_analyzed, 2);
    }
}
