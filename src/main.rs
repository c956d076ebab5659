mod admission;
mod ai;
mod application;
mod config;
mod db;
mod models;
mod pipeline;
mod report;
mod requirements;
mod scoring;
mod scraper;
mod submit;
mod tui;

use admission::SeededRandom;
use anyhow::{anyhow, Context, Result};
use application::{ApplicationStatus, JobApplication};
use chrono::{Local, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use config::Config;
use db::Database;
use models::{url_key, JobListing};
use pipeline::Pipeline;
use report::RunSummary;
use scoring::JobScorer;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autoapply")]
#[command(about = "Score job listings, gate them by rate limits, and submit applications")]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (default: platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init,

    /// Show the effective configuration
    Config,

    /// Score a single listing (JSON file) without creating anything
    Score {
        /// Path to a JSON job listing
        listing: PathBuf,
    },

    /// Search, score, admit, and generate materials
    Run {
        /// Read listings from a JSON array instead of scraping
        #[arg(short, long)]
        listings: Option<PathBuf>,

        /// Seed for the admission draw and throttle delays
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Review generated applications in a terminal UI
    Review,

    /// Submit approved applications
    Submit {
        /// Submit every open application, approved or not
        #[arg(long)]
        all: bool,
    },

    /// List applications
    List {
        /// Filter by status (pending, in_progress, applied, failed, skipped)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one application
    Show {
        /// Application job ID
        job_id: String,
    },

    /// Show recently applied URLs
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export every application to a JSON report
    Report {
        /// Output file
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("autoapply=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoapply=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn read_listings(path: &Path) -> Result<Vec<JobListing>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read listings file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid listings file: {}", path.display()))
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    println!("\nRun summary:");
    println!("  Listings found:       {}", stats.jobs_found);
    println!("  Listings scored:      {}", stats.jobs_analyzed);
    println!("  Applications created: {}", stats.applications_created);
    println!("  Submitted:            {}", stats.applications_submitted);
    if stats.generation_failures > 0 {
        println!("  Generation failures:  {}", stats.generation_failures);
    }
    if stats.parse_failures > 0 {
        println!("  Parse failures:       {}", stats.parse_failures);
    }
    println!("  Average score:        {:.2}", summary.average_score);

    println!("\nBy status:");
    for (status, count) in &summary.by_status {
        if *count > 0 {
            println!("  {:<12} {}", status, count);
        }
    }

    if !summary.denied.is_empty() {
        println!("\nDenied:");
        for (reason, count) in &summary.denied {
            println!("  {:<16} {}", reason, count);
        }
    }

    if !summary.top_matches.is_empty() {
        println!("\nTop matches:");
        for m in &summary.top_matches {
            println!(
                "  {:.2} {:<6} {:<30} {:<20} {}",
                m.total_score,
                m.priority,
                truncate(&m.title, 28),
                truncate(&m.company, 18),
                m.status
            );
        }
    }

    if let Some(path) = &summary.session_file {
        println!("\nSession written to {}", path.display());
    }
}

fn print_applications(applications: &[JobApplication]) {
    println!(
        "{:<12} {:>5} {:<6} {:<28} {:<20} {:<4} {}",
        "STATUS", "SCORE", "PRIO", "TITLE", "COMPANY", "OK", "JOB ID"
    );
    println!("{}", "-".repeat(100));
    for app in applications {
        println!(
            "{:<12} {:>5.2} {:<6} {:<28} {:<20} {:<4} {}",
            app.status,
            app.score.total_score,
            app.score.priority,
            truncate(&app.listing.title, 26),
            truncate(&app.listing.company, 18),
            if app.approved { "yes" } else { "" },
            app.job_id
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let db_path = cli.db.clone().unwrap_or_else(Database::default_path);

    match cli.command {
        Commands::Init => {
            if config_path.exists() {
                println!("Config already exists at {}", config_path.display());
            } else {
                Config::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
            let db = Database::open(&db_path)?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Config => {
            let config = Config::load(&config_path)?;
            println!("# config: {}", config_path.display());
            println!("# database: {}", db_path.display());
            println!("# output: {}\n", config.output_dir().display());
            print!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
        }

        Commands::Score { listing } => {
            let config = Config::load(&config_path)?;
            let text = std::fs::read_to_string(&listing)
                .with_context(|| format!("Failed to read listing: {}", listing.display()))?;
            let listing: JobListing = serde_json::from_str(&text).context("Invalid listing JSON")?;

            let parser = requirements::build_parser(&config.generation)?;
            let requirements = parser.parse(&listing)?;
            let candidate = config.candidate_profile()?;
            let scorer = JobScorer::new(&config.scoring);
            let score = scorer.score(&listing, &requirements, &candidate);
            let fit = scorer.candidate_fit(&requirements, &candidate);

            println!("{} at {}", listing.title, listing.company);
            println!("Level: {}", requirements.job_level.as_str());
            if !requirements.required_skills.is_empty() {
                println!("Required: {}", requirements.required_skills.join(", "));
            }
            if !requirements.preferred_skills.is_empty() {
                println!("Preferred: {}", requirements.preferred_skills.join(", "));
            }
            println!();
            println!("  relevance   {:.2}", score.relevance_score);
            println!("  company     {:.2}", score.company_score);
            println!("  salary      {:.2}", score.salary_score);
            println!("  location    {:.2}", score.location_score);
            println!("  experience  {:.2}", score.experience_match);
            println!("  skills      {:.2}", score.skills_match);
            println!("  total       {:.2} ({} priority)", score.total_score, score.priority);
            println!("  fit         {:.2}", fit);
            if !requirements.education_requirements.is_empty() {
                println!("Education: {}", requirements.education_requirements.join(", "));
            }

            if db_path.exists() {
                let db = Database::open(&db_path)?;
                let key = url_key(&listing.url, config.history.canonicalize_urls);
                if db.is_duplicate(&key)? {
                    println!("\nAlready applied to this URL.");
                }
            }
        }

        Commands::Run { listings, seed } => {
            let config = Config::load(&config_path)?;
            let listings = match listings {
                Some(path) => read_listings(&path)?,
                None => scraper::search_all(&config.search, now())?,
            };
            if listings.is_empty() {
                println!("No listings found.");
                return Ok(());
            }

            let db = Database::open(&db_path)?;
            let mut pipeline = Pipeline::new(config, db)?;
            if let Some(seed) = seed {
                pipeline = pipeline.with_rng(Box::new(SeededRandom::new(seed)));
            }
            let summary = pipeline.run_batch(listings, &now)?;
            print_summary(&summary);
        }

        Commands::Review => {
            let config = Config::load(&config_path)?;
            let db = Database::open(&db_path)?;
            tui::run_review(&db, config.output_dir())?;
        }

        Commands::Submit { all } => {
            let config = Config::load(&config_path)?;
            let db = Database::open(&db_path)?;
            let mut pipeline = Pipeline::new(config, db)?;
            let submitted = pipeline.submit_approved(all, &now)?;
            if submitted.is_empty() {
                println!("Nothing to submit. Approve applications with `autoapply review`.");
            } else {
                print_applications(&submitted);
                let open = submitted
                    .iter()
                    .filter(|a| a.status == ApplicationStatus::InProgress)
                    .count();
                if open > 0 {
                    println!("\n{} still in progress (dry-run handler sends nothing).", open);
                }
            }
        }

        Commands::List { status } => {
            let status = status
                .map(|s| {
                    ApplicationStatus::parse(&s).ok_or_else(|| anyhow!("Unknown status '{}'", s))
                })
                .transpose()?;
            let db = Database::open(&db_path)?;
            let applications = db.list_applications(status)?;
            if applications.is_empty() {
                println!("No applications found.");
            } else {
                print_applications(&applications);
            }
        }

        Commands::Show { job_id } => {
            let db = Database::open(&db_path)?;
            match db.get_application(&job_id)? {
                Some(app) => {
                    println!("{}", app.job_id);
                    println!("Title: {}", app.listing.title);
                    println!("Company: {}", app.listing.company);
                    println!("Platform: {}", app.listing.platform);
                    println!("URL: {}", app.listing.url);
                    println!("Status: {}{}", app.status, if app.approved { " (approved)" } else { "" });
                    println!("Score: {:.2} ({} priority)", app.score.total_score, app.score.priority);
                    println!("Created: {}", app.created_at);
                    if let Some(applied_at) = app.applied_at {
                        println!("Applied: {}", applied_at);
                    }
                    if let Some(error) = &app.error_message {
                        println!("Error: {}", error);
                    }
                    if !app.notes.is_empty() {
                        println!("Notes: {}", app.notes);
                    }
                    if let Some(materials) = &app.materials {
                        if let Some(path) = &materials.resume_path {
                            println!("Resume: {}", path.display());
                        }
                        if let Some(path) = &materials.cover_letter_path {
                            println!("Cover letter: {}", path.display());
                        }
                    }
                }
                None => {
                    println!("Application {} not found.", job_id);
                }
            }
        }

        Commands::History { limit } => {
            let db = Database::open(&db_path)?;
            let today = db.count_since(now().date().and_time(NaiveTime::MIN))?;
            let entries = db.recent_applied(limit)?;
            if entries.is_empty() {
                println!("No applications submitted yet.");
            } else {
                println!("{:<20} URL", "APPLIED AT");
                println!("{}", "-".repeat(80));
                for entry in entries {
                    println!("{:<20} {}", entry.applied_at.format("%Y-%m-%d %H:%M"), entry.url);
                }
            }
            println!("\n{} submitted today.", today);
        }

        Commands::Report { output } => {
            let db = Database::open(&db_path)?;
            let applications = db.list_applications(None)?;
            report::export_report(&output, &applications, now())?;
            println!("Exported {} applications to {}", applications.len(), output.display());
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
