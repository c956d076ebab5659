//! Submission handlers and the platform routing table.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thirtyfour::prelude::*;

use crate::application::JobApplication;
use crate::config::{HandlerKind, SubmissionConfig};
use crate::models::Platform;

/// What a handler did with one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The site accepted the application.
    Submitted,
    /// The site was reached but the apply flow did not finish.
    Incomplete,
    /// Nothing was sent.
    Simulated,
}

/// Thin adapter that performs the actual submission for one application.
pub trait SubmissionHandler {
    fn name(&self) -> &str;
    fn submit(&self, application: &JobApplication) -> Result<Outcome>;
}

/// Routes applications to a handler by platform, falling back to a generic one.
pub struct HandlerRegistry {
    handlers: HashMap<Platform, Box<dyn SubmissionHandler>>,
    fallback: Box<dyn SubmissionHandler>,
}

impl HandlerRegistry {
    pub fn new(fallback: Box<dyn SubmissionHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, platform: Platform, handler: Box<dyn SubmissionHandler>) {
        self.handlers.insert(platform, handler);
    }

    pub fn handler_for(&self, platform: &Platform) -> &dyn SubmissionHandler {
        self.handlers
            .get(platform)
            .map(|h| h.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn from_config(config: &SubmissionConfig) -> Result<Self> {
        match config.handler {
            HandlerKind::DryRun => Ok(Self::new(Box::new(DryRunHandler))),
            HandlerKind::Webdriver => {
                let runtime = Arc::new(
                    tokio::runtime::Runtime::new().context("Failed to start async runtime")?,
                );
                let handler = |selectors: ApplySelectors| -> Box<dyn SubmissionHandler> {
                    Box::new(WebDriverHandler::new(
                        &config.webdriver_url,
                        selectors,
                        Arc::clone(&runtime),
                    ))
                };

                let mut registry = Self::new(handler(ApplySelectors::generic()));
                for platform in [Platform::Linkedin, Platform::Indeed, Platform::Internshala] {
                    if let Some(selectors) = ApplySelectors::for_platform(&platform) {
                        registry.register(platform, handler(selectors));
                    }
                }
                Ok(registry)
            }
        }
    }
}

/// Logs what would be submitted and sends nothing.
pub struct DryRunHandler;

impl SubmissionHandler for DryRunHandler {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn submit(&self, application: &JobApplication) -> Result<Outcome> {
        let Some(materials) = &application.materials else {
            tracing::warn!("{}: no materials attached", application.job_id);
            return Ok(Outcome::Incomplete);
        };
        tracing::info!(
            "[dry-run] would apply to {} at {} ({}), resume {} bytes, cover letter {} bytes",
            application.listing.title,
            application.listing.company,
            application.listing.url,
            materials.resume.len(),
            materials.cover_letter.len()
        );
        Ok(Outcome::Simulated)
    }
}

/// CSS selectors for one platform's apply flow, tried in order.
#[derive(Debug, Clone)]
pub struct ApplySelectors {
    pub platform: String,
    pub apply_buttons: Vec<&'static str>,
    pub confirm_buttons: Vec<&'static str>,
}

impl ApplySelectors {
    pub fn for_platform(platform: &Platform) -> Option<Self> {
        let (apply_buttons, confirm_buttons) = match platform {
            Platform::Linkedin => (
                vec![
                    "button.jobs-apply-button",
                    "button[aria-label*='Easy Apply']",
                    ".jobs-s-apply button",
                ],
                vec![
                    "button[aria-label='Submit application']",
                    "button[aria-label='Review your application']",
                ],
            ),
            Platform::Indeed => (
                vec!["#indeedApplyButton", "button[id*='indeedApply']", ".jobsearch-IndeedApplyButton-newDesign"],
                vec!["button[type='submit']", ".ia-continueButton"],
            ),
            Platform::Internshala => (
                vec!["#continue_button", "button.btn-primary.top_apply_now_cta", ".easy_apply"],
                vec!["#submit", "input[type='submit']"],
            ),
            _ => return None,
        };
        Some(Self {
            platform: platform.to_string(),
            apply_buttons,
            confirm_buttons,
        })
    }

    pub fn generic() -> Self {
        Self {
            platform: "generic".to_string(),
            apply_buttons: vec![
                "button[class*='apply']",
                "a[class*='apply']",
                "button[aria-label*='Apply']",
                "a[href*='apply']",
            ],
            confirm_buttons: vec!["button[type='submit']", "input[type='submit']"],
        }
    }
}

/// Drives a browser through a WebDriver server (chromedriver, selenium).
pub struct WebDriverHandler {
    name: String,
    server_url: String,
    selectors: ApplySelectors,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl WebDriverHandler {
    pub fn new(server_url: &str, selectors: ApplySelectors, runtime: Arc<tokio::runtime::Runtime>) -> Self {
        Self {
            name: format!("webdriver:{}", selectors.platform),
            server_url: server_url.to_string(),
            selectors,
            runtime,
        }
    }

    async fn click_first(driver: &WebDriver, selectors: &[&str]) -> Option<String> {
        for selector in selectors {
            if let Ok(element) = driver.find(By::Css(*selector)).await {
                if element.click().await.is_ok() {
                    return Some(selector.to_string());
                }
            }
        }
        None
    }

    async fn apply(&self, driver: &WebDriver, url: &str) -> Result<Outcome> {
        driver
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let Some(selector) = Self::click_first(driver, &self.selectors.apply_buttons).await else {
            tracing::warn!("no apply button found on {}", url);
            return Ok(Outcome::Incomplete);
        };
        tracing::debug!("clicked apply button {}", selector);
        tokio::time::sleep(Duration::from_secs(2)).await;

        match Self::click_first(driver, &self.selectors.confirm_buttons).await {
            Some(selector) => {
                tracing::debug!("clicked confirm button {}", selector);
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(Outcome::Submitted)
            }
            None => {
                tracing::warn!("apply flow on {} needs manual completion", url);
                Ok(Outcome::Incomplete)
            }
        }
    }

    async fn run(&self, url: &str) -> Result<Outcome> {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(&self.server_url, caps)
            .await
            .with_context(|| format!("Failed to connect to WebDriver at {}", self.server_url))?;

        let outcome = self.apply(&driver, url).await;
        // Close the session whatever happened on the page.
        if let Err(e) = driver.quit().await {
            tracing::warn!("failed to close WebDriver session: {}", e);
        }
        outcome
    }
}

impl SubmissionHandler for WebDriverHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, application: &JobApplication) -> Result<Outcome> {
        if application.materials.is_none() {
            return Err(anyhow!("{} has no materials to submit", application.job_id));
        }
        self.runtime.block_on(self.run(&application.listing.url))
    }
}
