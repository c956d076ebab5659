use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::path::{Path, PathBuf};

use crate::application::{ApplicationStatus, JobApplication};
use crate::db::Database;
use crate::report;
use crate::scoring::Priority;

/// Review queue over the IN_PROGRESS applications.
struct ReviewState {
    applications: Vec<JobApplication>,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

enum Action {
    Approve,
    Unapprove,
    Skip,
}

impl ReviewState {
    fn new(applications: Vec<JobApplication>) -> Self {
        Self {
            applications,
            selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn current(&self) -> Option<&JobApplication> {
        self.applications.get(self.selected)
    }

    fn next(&mut self) {
        if !self.applications.is_empty() && self.selected < self.applications.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    /// Apply a review decision to the selected application and persist it.
    fn apply(&mut self, action: Action, db: &Database, output_dir: &Path) -> Result<()> {
        let Some(app) = self.applications.get_mut(self.selected) else {
            return Ok(());
        };

        match action {
            Action::Approve => app.approve()?,
            Action::Unapprove => {
                if app.status == ApplicationStatus::InProgress {
                    app.approved = false;
                }
            }
            Action::Skip => app.mark_skipped("skipped during review")?,
        }

        db.update_application(app)?;
        report::write_summary(output_dir, app)?;
        tracing::info!("{}: {} (approved: {})", app.job_id, app.status, app.approved);
        self.message = Some(format!("{} -> {}", app.job_id, app.status));
        Ok(())
    }
}

pub fn run_review(db: &Database, output_dir: PathBuf) -> Result<()> {
    let applications = db.list_applications(Some(ApplicationStatus::InProgress))?;
    if applications.is_empty() {
        println!("No applications awaiting review.");
        return Ok(());
    }

    let mut state = ReviewState::new(applications);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db, &output_dir);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result?;
    let approved = state.applications.iter().filter(|a| a.approved).count();
    println!(
        "{} approved. Run `autoapply submit` to send them.",
        approved
    );
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut ReviewState,
    db: &Database,
    output_dir: &Path,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let action = match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => {
                    state.next();
                    None
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    state.prev();
                    None
                }
                KeyCode::Char('J') | KeyCode::PageDown => {
                    state.scroll_down();
                    None
                }
                KeyCode::Char('K') | KeyCode::PageUp => {
                    state.scroll_up();
                    None
                }
                KeyCode::Char('a') => Some(Action::Approve),
                KeyCode::Char('u') => Some(Action::Unapprove),
                KeyCode::Char('s') => Some(Action::Skip),
                _ => None,
            };
            if let Some(action) = action {
                if let Err(e) = state.apply(action, db, output_dir) {
                    state.message = Some(format!("{:#}", e));
                }
            }
            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &ReviewState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(65),
        ])
        .split(frame.area());

    // Left panel: queue
    let items: Vec<ListItem> = state
        .applications
        .iter()
        .map(|app| {
            let marker = match (app.status, app.approved) {
                (ApplicationStatus::InProgress, true) => "+",
                (ApplicationStatus::InProgress, false) => " ",
                (ApplicationStatus::Skipped, _) => "x",
                _ => "?",
            };
            let title = if app.listing.title.chars().count() > 35 {
                format!("{}...", app.listing.title.chars().take(32).collect::<String>())
            } else {
                app.listing.title.clone()
            };
            ListItem::new(format!(
                "{} {:.2} {} | {}",
                marker, app.score.total_score, title, app.listing.company
            ))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Review ({}) ", state.applications.len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: application detail
    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Application "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer help
    let help_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let footer = match &state.message {
        Some(message) => format!(" {}", message),
        None => " j/k:navigate  J/K:scroll  a:approve u:unapprove s:skip  q:quit".to_string(),
    };
    let help = Paragraph::new(footer).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, help_area[1]);
}

fn priority_style(priority: Priority) -> Style {
    match priority {
        Priority::High => Style::default().fg(Color::Green),
        Priority::Medium => Style::default().fg(Color::Yellow),
        Priority::Low => Style::default().fg(Color::DarkGray),
    }
}

fn build_detail(state: &ReviewState) -> Text<'_> {
    let Some(app) = state.current() else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        app.listing.title.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {} ({})", app.listing.company, app.listing.platform)));
    if !app.listing.location.is_empty() {
        lines.push(Line::from(format!("Location: {}", app.listing.location)));
    }
    lines.push(Line::from(format!("URL: {}", app.listing.url)));

    let status = if app.approved {
        format!("Status: {} (approved)", app.status)
    } else {
        format!("Status: {}", app.status)
    };
    lines.push(Line::from(status));
    lines.push(Line::from(""));

    // Score breakdown
    let score = &app.score;
    lines.push(Line::from(Span::styled(
        format!("Score {:.2} ({} priority)", score.total_score, score.priority),
        priority_style(score.priority).add_modifier(Modifier::BOLD),
    )));
    for (label, value) in [
        ("relevance", score.relevance_score),
        ("company", score.company_score),
        ("salary", score.salary_score),
        ("location", score.location_score),
        ("experience", score.experience_match),
        ("skills", score.skills_match),
    ] {
        lines.push(Line::from(format!("  {:<11} {:.2}", label, value)));
    }
    lines.push(Line::from(""));

    match &app.materials {
        Some(materials) => {
            lines.push(Line::from(Span::styled(
                "COVER LETTER",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for line in textwrap::fill(&materials.cover_letter, 70).lines() {
                lines.push(Line::from(format!("  {}", line)));
            }
            lines.push(Line::from(""));

            lines.push(Line::from(Span::styled(
                "RESUME",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            for line in materials.resume.lines() {
                lines.push(Line::from(format!("  {}", line)));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "(No materials generated)",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Materials;
    use crate::models::{JobListing, Platform};
    use crate::scoring::JobScore;
    use chrono::NaiveDate;

    fn application(title: &str) -> JobApplication {
        let now = NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let listing = JobListing {
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: String::new(),
            url: format!("https://jobs.example.com/{}", title.len()),
            posted_date: String::new(),
            job_type: String::new(),
            salary: String::new(),
            skills: Default::default(),
            platform: Platform::Indeed,
            scraped_at: now,
        };
        let score = JobScore {
            relevance_score: 1.0,
            company_score: 0.5,
            salary_score: 0.7,
            location_score: 1.0,
            experience_match: 1.0,
            skills_match: 1.0,
            total_score: 0.85,
            priority: Priority::High,
        };
        let mut app = JobApplication::new(listing, score, now);
        app.attach_materials(Materials {
            resume: "Sam Doe".to_string(),
            cover_letter: "Dear hiring team".to_string(),
            ..Default::default()
        })
        .unwrap();
        app
    }

    #[test]
    fn test_review_actions_persist() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let apps = vec![application("Data Engineer"), application("Analyst")];
        for app in &apps {
            db.insert_application(app).unwrap();
        }

        let mut state = ReviewState::new(apps);
        state.apply(Action::Approve, &db, dir.path()).unwrap();
        state.next();
        state.apply(Action::Skip, &db, dir.path()).unwrap();

        let approved = db.approved_applications().unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].listing.title, "Data Engineer");

        let skipped = db.list_applications(Some(ApplicationStatus::Skipped)).unwrap();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].notes.starts_with("Rejected:"));
        assert!(dir
            .path()
            .join(&skipped[0].job_id)
            .join("application_summary.json")
            .exists());

        state.prev();
        state.apply(Action::Unapprove, &db, dir.path()).unwrap();
        assert!(db.approved_applications().unwrap().is_empty());
    }

    #[test]
    fn test_skipped_application_cannot_be_approved() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let app = application("Data Engineer");
        db.insert_application(&app).unwrap();

        let mut state = ReviewState::new(vec![app]);
        state.apply(Action::Skip, &db, dir.path()).unwrap();
        assert!(state.apply(Action::Approve, &db, dir.path()).is_err());
    }

    #[test]
    fn test_navigation_stays_in_bounds() {
        let mut state = ReviewState::new(vec![application("Data Engineer"), application("Analyst")]);
        state.prev();
        assert_eq!(state.selected, 0);
        state.next();
        state.next();
        assert_eq!(state.selected, 1);
        state.scroll_down();
        state.prev();
        assert_eq!(state.scroll_offset, 0);
    }
}
