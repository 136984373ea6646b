use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const OPENING_PROMPT: &str = "You are a technical interviewer conducting an interview for an AI Application Developer position.
You are evaluating the candidate's expertise in:
- AI/ML frameworks and technologies
- Large Language Models (LLMs) and their applications
- API integration and development
- Full-stack development with AI components

Start with a friendly greeting and ask an initial technical question.
Keep your responses concise and natural.
Focus on practical experience and technical knowledge.";

pub const FOLLOW_UP_PROMPT: &str = "You are a professional interviewer conducting a job interview.
Review the conversation history and the candidate's latest answer.
Provide a relevant follow-up question based on their response.
Keep your responses concise and natural.
Focus on evaluating their skills and experience.";

pub const FINAL_REVIEW_PROMPT: &str = r#"You are an expert interviewer and evaluator. Review the complete interview conversation and provide:
1. A score out of 100
2. Detailed feedback on:
   - Communication skills
   - Technical knowledge
   - Problem-solving ability
   - Cultural fit
Format your response as JSON with the following structure:
{
  "score": number,
  "feedback": {
    "communication": string,
    "technical": string,
    "problemSolving": string,
    "culturalFit": string,
    "overall": string
  }
}"#;

pub const EVALUATION_PROMPT: &str = r#"You are an AI interview evaluator. Analyze the candidate's interview responses and score them on the following criteria:
1. Communication Skills (25 points)
2. Technical Knowledge (25 points)
3. Problem-Solving Ability (25 points)
4. Cultural Fit & Soft Skills (25 points)

Respond STRICTLY as JSON:
{
  "score": <0-100>,
  "categoryScores": {"communication": <0-25>, "technical": <0-25>, "problemSolving": <0-25>, "culturalFit": <0-25>},
  "feedback": "<constructive feedback>",
  "strengths": ["<strength>", ...]
}"#;

/// System prompts used by the interviewer client.
///
/// Defaults are compiled in; a prompts directory may override any of them with
/// a markdown file named after the prompt (`opening.md`, `follow_up.md`,
/// `final_review.md`, `evaluation.md`).
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    pub opening: String,
    pub follow_up: String,
    pub final_review: String,
    pub evaluation: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            opening: OPENING_PROMPT.to_string(),
            follow_up: FOLLOW_UP_PROMPT.to_string(),
            final_review: FINAL_REVIEW_PROMPT.to_string(),
            evaluation: EVALUATION_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    pub fn with_overrides(mut overrides: HashMap<String, String>) -> Self {
        let mut prompts = Self::default();
        for (key, slot) in [
            ("opening", &mut prompts.opening),
            ("follow_up", &mut prompts.follow_up),
            ("final_review", &mut prompts.final_review),
            ("evaluation", &mut prompts.evaluation),
        ] {
            if let Some(text) = overrides.remove(key) {
                tracing::info!("Using prompt override for '{}'", key);
                *slot = text.trim().to_string();
            }
        }
        for key in overrides.keys() {
            tracing::warn!("Ignoring unknown prompt file '{}.md'", key);
        }
        prompts
    }

    /// Loads overrides from `dir` if given, otherwise returns the defaults.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Ok(Self::with_overrides(load_prompts(dir)?)),
            None => Ok(Self::default()),
        }
    }
}

pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}
