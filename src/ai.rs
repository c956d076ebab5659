use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use crate::application::Materials;
use crate::config::{GenerationConfig, ResumeStrategy};
use crate::models::{CandidateProfile, JobListing, JobRequirements};

// --- Providers ---

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

/// Where a `generation.provider` model is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The local `claude` CLI; no key needed.
    ClaudeCli,
    /// Anthropic Messages API, key in `ANTHROPIC_API_KEY`.
    Anthropic,
    /// OpenAI chat completions, key in `OPENAI_API_KEY`.
    OpenAI,
}

impl Backend {
    fn parse(prefix: &str) -> Option<Self> {
        match prefix {
            "claude-cli" => Some(Backend::ClaudeCli),
            "anthropic" => Some(Backend::Anthropic),
            "openai" => Some(Backend::OpenAI),
            _ => None,
        }
    }
}

/// Short names accepted for `generation.provider`, besides "template" and
/// the explicit `<backend>:<model id>` form.
const MODELS: &[(&str, Backend, &str)] = &[
    ("claude-sonnet", Backend::ClaudeCli, "claude-sonnet-4-5-20250929"),
    ("claude-haiku", Backend::ClaudeCli, "claude-haiku-4-5-20251001"),
    ("api-sonnet", Backend::Anthropic, "claude-sonnet-4-5-20250929"),
    ("api-haiku", Backend::Anthropic, "claude-haiku-4-5-20251001"),
    ("gpt-4o", Backend::OpenAI, "gpt-4o"),
    ("gpt-4o-mini", Backend::OpenAI, "gpt-4o-mini"),
];

/// Map a `generation.provider` value to a backend and model id.
pub fn resolve_provider(name: &str) -> Result<(Backend, String)> {
    let name = name.trim();
    if let Some((_, backend, model)) = MODELS.iter().find(|(short, _, _)| *short == name) {
        return Ok((*backend, model.to_string()));
    }
    if let Some((prefix, model)) = name.split_once(':') {
        if let Some(backend) = Backend::parse(prefix) {
            if !model.trim().is_empty() {
                return Ok((backend, model.trim().to_string()));
            }
        }
    }

    let known: Vec<&str> = MODELS.iter().map(|(short, _, _)| *short).collect();
    Err(anyhow!(
        "Unknown generation provider '{}'. Use \"template\" (offline, the default), one of {}, \
         or <claude-cli|anthropic|openai>:<model id>",
        name,
        known.join(", ")
    ))
}

pub fn create_provider(name: &str) -> Result<Box<dyn AIProvider>> {
    let (backend, model_id) = resolve_provider(name)?;
    tracing::debug!("provider '{}' resolves to {:?} {}", name, backend, model_id);
    match backend {
        Backend::ClaudeCli => Ok(Box::new(CliProvider::new(model_id)?)),
        Backend::Anthropic | Backend::OpenAI => Ok(Box::new(HttpProvider::new(backend, model_id)?)),
    }
}

// --- HTTP APIs ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Both APIs accept the same minimal request body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct TextBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<TextBlock>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<Choice>,
}

/// Pull the generated text out of a successful response body.
fn reply_text(backend: Backend, body: &str) -> Result<String> {
    let text = match backend {
        Backend::Anthropic => {
            let reply: MessagesReply =
                serde_json::from_str(body).context("Failed to parse Anthropic response")?;
            reply.content.into_iter().map(|block| block.text).collect::<String>()
        }
        Backend::OpenAI => {
            let reply: ChatReply =
                serde_json::from_str(body).context("Failed to parse OpenAI response")?;
            reply
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .unwrap_or_default()
        }
        Backend::ClaudeCli => body.to_string(),
    };

    if text.trim().is_empty() {
        return Err(anyhow!("{:?} returned no text", backend));
    }
    Ok(text)
}

/// Anthropic or OpenAI over blocking reqwest.
pub struct HttpProvider {
    backend: Backend,
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl HttpProvider {
    pub fn new(backend: Backend, model_id: String) -> Result<Self> {
        let key_var = match backend {
            Backend::OpenAI => "OPENAI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        let api_key = env::var(key_var).with_context(|| {
            format!("{} is not set; export it or set generation.provider = \"template\"", key_var)
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            backend,
            api_key,
            model_id,
            client,
        })
    }
}

impl AIProvider for HttpProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model_id,
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let request = match self.backend {
            Backend::OpenAI => self
                .client
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key),
            _ => self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
        };

        let response = request
            .json(&body)
            .send()
            .with_context(|| format!("Request to {} failed", self.model_id))?;
        let status = response.status();
        let text = response.text().context("Failed to read response body")?;
        if !status.is_success() {
            return Err(anyhow!("{} returned {}: {}", self.model_id, status, text));
        }
        reply_text(self.backend, &text)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Local CLI ---

/// Shells out to `claude -p`.
pub struct CliProvider {
    model_id: String,
}

impl CliProvider {
    pub fn new(model_id: String) -> Result<Self> {
        std::process::Command::new("claude")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .context("'claude' CLI not found; use an api-* or gpt-* provider, or \"template\"")?;
        Ok(Self { model_id })
    }
}

impl AIProvider for CliProvider {
    fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        let output = std::process::Command::new("claude")
            .arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&self.model_id)
            .output()
            .context("Failed to run 'claude' CLI")?;

        if !output.status.success() {
            return Err(anyhow!(
                "claude CLI exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let stdout = String::from_utf8(output.stdout).context("claude CLI printed invalid UTF-8")?;
        reply_text(Backend::ClaudeCli, &stdout)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Requirement extraction ---

/// Skills an LLM pulled out of a posting, lowercased.
#[derive(Debug, Default, PartialEq)]
pub struct SkillSplit {
    pub required: Vec<String>,
    pub preferred: Vec<String>,
}

fn skill_list(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|s| s.trim().trim_matches(|c| c == '*' || c == '.').to_lowercase())
        .filter(|s| !s.is_empty() && s != "none")
        .collect()
}

/// Reads `REQUIRED:` and `PREFERRED:` lines; anything else is chatter.
pub fn parse_skill_split(response: &str) -> SkillSplit {
    let mut split = SkillSplit::default();
    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        match label.trim().trim_matches('*').to_uppercase().as_str() {
            "REQUIRED" => split.required = skill_list(rest),
            "PREFERRED" => split.preferred = skill_list(rest),
            _ => {}
        }
    }
    split
}

pub fn ask_for_skills(provider: &dyn AIProvider, listing: &JobListing) -> Result<SkillSplit> {
    let prompt = format!(
        "List the skills and technologies this job posting asks for.\n\
        Put a skill under REQUIRED when the posting demands it and under PREFERRED when it is \
        optional or a bonus. Use short lowercase names (\"python\", \"power bi\").\n\n\
        Answer with exactly two lines and nothing else:\n\
        REQUIRED: skill, skill\n\
        PREFERRED: skill, skill\n\n\
        Title: {}\n\
        Posting:\n{}",
        listing.title, listing.description
    );

    let response = provider
        .complete(&prompt, 1024)
        .with_context(|| format!("Skill extraction failed for {}", listing.url))?;
    Ok(parse_skill_split(&response))
}

// --- Material generation ---

/// Produces the resume and cover letter for one application.
pub trait MaterialGenerator {
    fn generate(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> Result<Materials>;
}

pub fn build_generator(config: &GenerationConfig) -> Result<Box<dyn MaterialGenerator>> {
    if config.provider == "template" {
        return Ok(Box::new(TemplateGenerator::new(config)));
    }
    let provider = create_provider(&config.provider)?;
    tracing::info!("generating materials with {}", provider.model_name());
    Ok(Box::new(AiMaterialGenerator::new(provider, config)))
}

fn job_skills(requirements: &JobRequirements) -> BTreeSet<String> {
    requirements
        .required_skills
        .iter()
        .chain(requirements.preferred_skills.iter())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn strategy_instruction(strategy: ResumeStrategy) -> &'static str {
    match strategy {
        ResumeStrategy::Conservative => {
            "Make minimal changes. Preserve the original wording and only reorder content so the most relevant items come first."
        }
        ResumeStrategy::Moderate => {
            "Make balanced improvements. Rephrase the summary and bullets to use the job's terminology where the resume supports it."
        }
        ResumeStrategy::Aggressive => {
            "Optimize strongly for this role. Rewrite the summary, reorder every section by relevance, and surface every matching skill."
        }
    }
}

/// Offline generator: assembles materials from the candidate profile.
pub struct TemplateGenerator {
    strategy: ResumeStrategy,
    template: String,
}

impl TemplateGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            strategy: config.resume_strategy,
            template: config.cover_letter_template.clone(),
        }
    }

    fn base_resume(candidate: &CandidateProfile) -> String {
        if !candidate.resume_text.trim().is_empty() {
            return candidate.resume_text.trim_end().to_string();
        }

        let mut resume = String::new();
        if !candidate.name.is_empty() {
            resume.push_str(&format!("{}\n\n", candidate.name));
        }
        resume.push_str(&format!("Experience: {} years\n", candidate.experience_years));
        if !candidate.skills.is_empty() {
            let skills: Vec<&str> = candidate.skills.iter().map(String::as_str).collect();
            resume.push_str(&format!("Skills: {}\n", skills.join(", ")));
        }
        for edu in &candidate.education {
            if edu.field.is_empty() {
                resume.push_str(&format!("Education: {}\n", edu.degree));
            } else {
                resume.push_str(&format!("Education: {} in {}\n", edu.degree, edu.field));
            }
        }
        resume
    }

    fn resume(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> String {
        let mut tailored = String::new();

        tailored.push_str(&format!("# Resume - Tailored for: {}\n\n", listing.title));
        tailored.push_str(&format!("**Position**: {} at {}\n\n", listing.title, listing.company));
        if !listing.salary.is_empty() {
            tailored.push_str(&format!("**Compensation**: {}\n\n", listing.salary));
        }

        let wanted = job_skills(requirements);
        let matched: Vec<&str> = candidate
            .skills
            .iter()
            .filter(|s| wanted.contains(*s))
            .map(String::as_str)
            .collect();

        match self.strategy {
            ResumeStrategy::Conservative => {}
            ResumeStrategy::Moderate => {
                if !matched.is_empty() {
                    tailored.push_str(&format!("**Relevant skills**: {}\n\n", matched.join(", ")));
                }
            }
            ResumeStrategy::Aggressive => {
                tailored.push_str(&format!(
                    "**Summary**: {}-level candidate with {} years of experience targeting {} roles.\n\n",
                    requirements.job_level.as_str(),
                    candidate.experience_years,
                    listing.title
                ));
                if !matched.is_empty() {
                    tailored.push_str(&format!("**Relevant skills**: {}\n\n", matched.join(", ")));
                }
                let other: Vec<&str> = candidate
                    .skills
                    .iter()
                    .filter(|s| !wanted.contains(*s))
                    .map(String::as_str)
                    .collect();
                if !other.is_empty() {
                    tailored.push_str(&format!("**Additional skills**: {}\n\n", other.join(", ")));
                }
            }
        }

        tailored.push_str("---\n\n");
        tailored.push_str(&Self::base_resume(candidate));
        tailored.push('\n');
        tailored
    }

    fn cover_letter(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> String {
        let wanted = job_skills(requirements);
        let matched: Vec<&str> = candidate
            .skills
            .iter()
            .filter(|s| wanted.contains(*s))
            .map(String::as_str)
            .collect();
        let skills = if matched.is_empty() {
            "the skills this role calls for".to_string()
        } else {
            matched.join(", ")
        };
        let years = candidate.experience_years;
        let title = &listing.title;
        let company = &listing.company;

        let paragraphs: Vec<String> = match self.template.as_str() {
            "enthusiastic" => vec![
                format!("I was thrilled to see the {title} opening at {company}!"),
                format!("Over {years} years I have built real things with {skills}, and this role looks like exactly the kind of work I love doing."),
                format!("I would be excited to bring that energy to {company}. Thank you for considering my application."),
            ],
            "technical" => vec![
                format!("I am applying for the {title} position at {company}."),
                format!("My technical background covers {skills}, applied across {years} years of hands-on engineering work."),
                "I would welcome the chance to discuss how that experience maps onto the problems your team is solving.".to_string(),
            ],
            "concise" => vec![
                format!("Please consider me for the {title} role at {company}: {years} years of experience, strongest in {skills}."),
            ],
            other => {
                if other != "professional" {
                    tracing::warn!("unknown cover letter template '{}', using 'professional'", other);
                }
                vec![
                    format!("I am writing to express my interest in the {title} position at {company}."),
                    format!("With {years} years of experience and a background in {skills}, I am confident I can contribute to your team from day one."),
                    "Thank you for your time and consideration. I look forward to hearing from you.".to_string(),
                ]
            }
        };

        let greeting = "Dear Hiring Manager,";
        let body: Vec<String> = paragraphs
            .iter()
            .map(|p| textwrap::fill(p, 80))
            .collect();
        let signature = if candidate.name.is_empty() {
            "Sincerely".to_string()
        } else {
            format!("Sincerely,\n{}", candidate.name)
        };

        format!("{}\n\n{}\n\n{}\n", greeting, body.join("\n\n"), signature)
    }
}

impl MaterialGenerator for TemplateGenerator {
    fn generate(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> Result<Materials> {
        Ok(Materials {
            resume: self.resume(listing, requirements, candidate),
            cover_letter: self.cover_letter(listing, requirements, candidate),
            ..Default::default()
        })
    }
}

/// Generator backed by an LLM provider.
pub struct AiMaterialGenerator {
    provider: Box<dyn AIProvider>,
    strategy: ResumeStrategy,
    template: String,
}

impl AiMaterialGenerator {
    pub fn new(provider: Box<dyn AIProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            strategy: config.resume_strategy,
            template: config.cover_letter_template.clone(),
        }
    }

    fn job_text(listing: &JobListing, requirements: &JobRequirements) -> String {
        let mut text = format!(
            "Job Title: {}\nEmployer: {}\nLocation: {}\n",
            listing.title, listing.company, listing.location
        );
        if !requirements.required_skills.is_empty() {
            text.push_str(&format!("Required skills: {}\n", requirements.required_skills.join(", ")));
        }
        if !requirements.preferred_skills.is_empty() {
            text.push_str(&format!("Preferred skills: {}\n", requirements.preferred_skills.join(", ")));
        }
        text.push_str(&format!("\nJob Posting:\n{}", listing.description));
        text
    }
}

impl MaterialGenerator for AiMaterialGenerator {
    fn generate(
        &self,
        listing: &JobListing,
        requirements: &JobRequirements,
        candidate: &CandidateProfile,
    ) -> Result<Materials> {
        let job_text = Self::job_text(listing, requirements);
        let base = TemplateGenerator::base_resume(candidate);
        tracing::debug!("generating materials for {} with {}", listing.url, self.provider.model_name());

        let resume_prompt = format!(
            "You are an expert resume writer. Generate a COMPLETE, TAILORED resume for the job below.\n\n\
            IMPORTANT RULES:\n\
            - Stay 100% truthful: only use facts from the provided resume\n\
            - {}\n\
            - Generate the resume in clean markdown format\n\n\
            {}\n\n\
            === BASE RESUME ===\n{}\n\n\
            Generate the complete tailored resume now:",
            strategy_instruction(self.strategy),
            job_text,
            base
        );
        let resume = self
            .provider
            .complete(&resume_prompt, 8192)
            .with_context(|| format!("Resume generation failed for {}", listing.url))?;

        let letter_prompt = format!(
            "Write a {} cover letter for the following job application.\n\
            Use only facts from the resume. Keep it under 350 words and return only the letter text.\n\n\
            {}\n\n\
            Candidate resume:\n{}",
            self.template, job_text, base
        );
        let cover_letter = self
            .provider
            .complete(&letter_prompt, 2048)
            .with_context(|| format!("Cover letter generation failed for {}", listing.url))?;

        if resume.trim().is_empty() || cover_letter.trim().is_empty() {
            return Err(anyhow!("Empty materials returned by {}", self.provider.model_name()));
        }

        Ok(Materials {
            resume: resume.trim().to_string(),
            cover_letter: cover_letter.trim().to_string(),
            ..Default::default()
        })
    }
}
