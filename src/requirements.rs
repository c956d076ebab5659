//! Turning a listing's free text into structured requirements.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;

use crate::ai::{ask_for_skills, create_provider, AIProvider};
use crate::config::GenerationConfig;
use crate::models::{JobLevel, JobListing, JobRequirements};
use crate::scoring::parse_salary_range;

pub trait RequirementsParser {
    fn parse(&self, listing: &JobListing) -> Result<JobRequirements>;
}

pub fn build_parser(config: &GenerationConfig) -> Result<Box<dyn RequirementsParser>> {
    if config.provider == "template" {
        return Ok(Box::new(HeuristicParser::new()?));
    }
    let provider = create_provider(&config.provider)?;
    Ok(Box::new(AiRequirementsParser::new(provider)?))
}

const SKILL_VOCABULARY: &[&str] = &[
    "python", "java", "javascript", "typescript", "rust", "golang", "c++", "c#", "ruby", "php",
    "scala", "kotlin", "swift", "sql", "nosql", "postgresql", "mysql", "mongodb", "redis",
    "docker", "kubernetes", "aws", "azure", "gcp", "terraform", "linux", "git", "react",
    "angular", "vue", "node", "django", "flask", "spark", "hadoop", "kafka", "airflow",
    "pandas", "numpy", "tensorflow", "pytorch", "machine learning", "deep learning", "nlp",
    "excel", "tableau", "power bi", "graphql", "ci/cd", "etl", "statistics",
];

const REQUIRED_MARKERS: &[&str] = &[
    "required", "must have", "must-have", "essential", "mandatory", "necessary", "minimum",
    "at least", "strong", "proficient", "expert",
];

const PREFERRED_MARKERS: &[&str] = &[
    "preferred", "nice to have", "nice-to-have", "bonus", "plus", "advantage", "desirable",
    "beneficial", "helpful",
];

/// Occurrence of `term` in `text` not embedded in a longer word.
fn contains_term(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

/// Regex and vocabulary extraction; needs no network.
pub struct HeuristicParser {
    sentence_split: Regex,
    years: Vec<Regex>,
    education: Regex,
    levels: Vec<(Regex, JobLevel)>,
}

impl HeuristicParser {
    pub fn new() -> Result<Self> {
        let re = |pattern: &str| Regex::new(pattern).context("Invalid requirements pattern");
        Ok(Self {
            sentence_split: re(r"[.!;]\s+|\n")?,
            years: vec![
                re(r"(\d+)\+?\s*(?:years?|yrs?)\s+(?:of\s+)?(?:\w+\s+)?experience")?,
                re(r"minimum\s+(?:of\s+)?(\d+)\s+(?:years?|yrs?)")?,
                re(r"at\s+least\s+(\d+)\s+(?:years?|yrs?)")?,
                re(r"(\d+)\+\s*(?:years?|yrs?)")?,
            ],
            education: re(
                r"\b(?:bachelor'?s?|master'?s?|phd|mba|b\.tech|m\.tech|bs|ms)\b(?:\s+degree)?(?:\s+in\s+[a-z]+(?:\s+[a-z]+){0,2})?",
            )?,
            levels: vec![
                (re(r"\b(?:director|head of|vp)\b")?, JobLevel::Director),
                (re(r"\b(?:principal|staff)\b")?, JobLevel::Principal),
                (re(r"\blead\b")?, JobLevel::Lead),
                (re(r"\b(?:senior|sr\.?)\b")?, JobLevel::Senior),
                (re(r"\b(?:junior|jr\.?|entry[ -]level|intern|internship|graduate|fresher|trainee)\b")?, JobLevel::Entry),
                (re(r"\b(?:mid[ -]level|intermediate)\b")?, JobLevel::MidLevel),
            ],
        })
    }

    /// A skill is required when a sentence mentioning it carries a required
    /// marker, preferred when one carries a preferred marker, and required
    /// otherwise.
    fn categorize_skills(&self, text: &str, tagged: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
        let sentences: Vec<&str> = self.sentence_split.split(text).collect();
        let mut required = Vec::new();
        let mut preferred = Vec::new();

        for skill in SKILL_VOCABULARY {
            let mentions: Vec<&&str> = sentences.iter().filter(|s| contains_term(s, skill)).collect();
            if mentions.is_empty() {
                continue;
            }
            let marked = |markers: &[&str]| {
                mentions
                    .iter()
                    .any(|s| markers.iter().any(|m| s.contains(m)))
            };
            if marked(REQUIRED_MARKERS) {
                required.push(skill.to_string());
            } else if marked(PREFERRED_MARKERS) {
                preferred.push(skill.to_string());
            } else {
                required.push(skill.to_string());
            }
        }

        for skill in tagged {
            let skill = skill.trim().to_lowercase();
            if !skill.is_empty() && !required.contains(&skill) && !preferred.contains(&skill) {
                preferred.push(skill);
            }
        }

        (required, preferred)
    }

    fn job_level(&self, title: &str, text: &str) -> JobLevel {
        // The title is the stronger signal.
        for haystack in [title, text] {
            if let Some((_, level)) = self.levels.iter().find(|(re, _)| re.is_match(haystack)) {
                return *level;
            }
        }
        JobLevel::default()
    }

    fn experience_years(&self, text: &str) -> Option<u32> {
        self.years.iter().find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps[1].parse::<u32>().ok())
        })
    }

    fn education(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for m in self.education.find_iter(text) {
            let value = m.as_str().trim().to_string();
            if !found.contains(&value) {
                found.push(value);
            }
        }
        found
    }

    fn salary(listing: &JobListing, text: &str) -> Option<(u64, u64)> {
        if !listing.salary.trim().is_empty() {
            return parse_salary_range(&listing.salary);
        }
        text.lines()
            .filter(|line| {
                line.contains('$') || ["salary", "lpa", "ctc", "compensation", "stipend"]
                    .iter()
                    .any(|k| line.contains(k))
            })
            .find_map(parse_salary_range)
    }
}

impl RequirementsParser for HeuristicParser {
    fn parse(&self, listing: &JobListing) -> Result<JobRequirements> {
        let title = listing.title.to_lowercase();
        let text = listing.description.to_lowercase();

        let (required_skills, preferred_skills) = self.categorize_skills(&text, &listing.skills);

        Ok(JobRequirements {
            required_skills,
            preferred_skills,
            job_level: self.job_level(&title, &text),
            education_requirements: self.education(&text),
            experience_years: self.experience_years(&text),
            salary_range: Self::salary(listing, &text),
        })
    }
}

/// Skills categorized by an LLM; level, years, education and pay still come
/// from the heuristics.
pub struct AiRequirementsParser {
    provider: Box<dyn AIProvider>,
    heuristics: HeuristicParser,
}

impl AiRequirementsParser {
    pub fn new(provider: Box<dyn AIProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            heuristics: HeuristicParser::new()?,
        })
    }
}

impl RequirementsParser for AiRequirementsParser {
    fn parse(&self, listing: &JobListing) -> Result<JobRequirements> {
        let mut requirements = self.heuristics.parse(listing)?;
        let skills = ask_for_skills(self.provider.as_ref(), listing)?;
        requirements.required_skills = skills.required;
        requirements.preferred_skills = skills.preferred;
        Ok(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::tests::ScriptedProvider;
    use crate::models::Platform;

    fn listing(title: &str, description: &str) -> JobListing {
        JobListing {
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: description.to_string(),
            url: "https://jobs.example.com/1".to_string(),
            posted_date: String::new(),
            job_type: String::new(),
            salary: String::new(),
            skills: Default::default(),
            platform: Platform::Indeed,
            scraped_at: chrono::Local::now().naive_local(),
        }
    }

    #[test]
    fn test_required_and_preferred_skills() {
        let parser = HeuristicParser::new().unwrap();
        let reqs = parser
            .parse(&listing(
                "Senior Data Engineer",
                "Required: strong Python and SQL skills.\n\
                 Experience with Docker is a plus.\n\
                 You will use PostgreSQL daily.\n\
                 3+ years of experience building pipelines.\n\
                 Bachelor's degree in Computer Science.",
            ))
            .unwrap();

        assert!(reqs.required_skills.contains(&"python".to_string()));
        assert!(reqs.required_skills.contains(&"sql".to_string()));
        assert!(reqs.required_skills.contains(&"postgresql".to_string()));
        assert_eq!(reqs.preferred_skills, vec!["docker".to_string()]);
        assert_eq!(reqs.job_level, JobLevel::Senior);
        assert_eq!(reqs.experience_years, Some(3));
        assert_eq!(reqs.education_requirements, vec!["bachelor's degree in computer science".to_string()]);
    }

    #[test]
    fn test_terms_need_word_boundaries() {
        assert!(contains_term("we use c++ and java", "c++"));
        assert!(contains_term("we use c++ and java", "java"));
        assert!(!contains_term("javascript only", "java"));
        assert!(!contains_term("postgresql", "sql"));
        assert!(contains_term("node.js backend", "node"));
    }

    #[test]
    fn test_level_from_title_first() {
        let parser = HeuristicParser::new().unwrap();
        let reqs = parser
            .parse(&listing("Data Analyst Intern", "Report to the senior analyst."))
            .unwrap();
        assert_eq!(reqs.job_level, JobLevel::Entry);

        let reqs = parser.parse(&listing("Data Analyst", "Nothing about seniority.")).unwrap();
        assert_eq!(reqs.job_level, JobLevel::MidLevel);
        assert_eq!(reqs.experience_years, None);
        assert!(reqs.required_skills.is_empty());
    }

    #[test]
    fn test_salary_from_field_or_description() {
        let parser = HeuristicParser::new().unwrap();
        let mut job = listing("Engineer", "Salary: $100,000 - $130,000 per year.");
        assert_eq!(parser.parse(&job).unwrap().salary_range, Some((100_000, 130_000)));

        job.salary = "$90k - $110k".to_string();
        assert_eq!(parser.parse(&job).unwrap().salary_range, Some((90_000, 110_000)));
    }

    #[test]
    fn test_tagged_skills_become_preferred() {
        let parser = HeuristicParser::new().unwrap();
        let mut job = listing("Engineer", "Must have Rust experience.");
        job.skills.insert("Tokio".to_string());
        job.skills.insert("rust".to_string());

        let reqs = parser.parse(&job).unwrap();
        assert_eq!(reqs.required_skills, vec!["rust".to_string()]);
        assert_eq!(reqs.preferred_skills, vec!["tokio".to_string()]);
    }

    #[test]
    fn test_ai_parser_overrides_skills() {
        let provider = ScriptedProvider::new(&["REQUIRED: Python, Airflow\nPREFERRED: dbt"]);
        let parser = AiRequirementsParser::new(Box::new(provider)).unwrap();
        let reqs = parser
            .parse(&listing("Senior Data Engineer", "5 years of experience required."))
            .unwrap();

        assert_eq!(reqs.required_skills, vec!["python", "airflow"]);
        assert_eq!(reqs.preferred_skills, vec!["dbt"]);
        assert_eq!(reqs.job_level, JobLevel::Senior);
        assert_eq!(reqs.experience_years, Some(5));
    }

    #[test]
    fn test_ai_parser_error_propagates() {
        let parser = AiRequirementsParser::new(Box::new(ScriptedProvider::new(&[]))).unwrap();
        assert!(parser.parse(&listing("Engineer", "")).is_err());
    }
}
