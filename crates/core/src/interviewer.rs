use crate::interview_service::{Evaluation, InterviewReview};
use crate::prompt_loader::Prompts;
use crate::session_state::{Role, Turn};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

/// The language model that plays the interviewer.
///
/// The API service depends on this trait rather than on [`InterviewerClient`],
/// so handlers can be exercised against a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Interviewer: Send + Sync {
    /// Greeting plus the first question.
    async fn opening_question(&self) -> Result<String>;

    async fn follow_up(&self, history: &[Turn], answer: &str) -> Result<String>;

    /// Overall score out of 100 with per-area written feedback.
    async fn final_review(&self, history: &[Turn]) -> Result<InterviewReview>;

    /// Rubric scoring: four categories of 25 points each.
    async fn evaluate(&self, history: &[Turn]) -> Result<Evaluation>;
}

pub struct InterviewerClient {
    client: Client,
    api_key: SecretString,
    model: String,
    prompts: Prompts,
}

impl InterviewerClient {
    pub fn new(api_key: SecretString, model: String, prompts: Prompts) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            prompts,
        }
    }

    async fn complete(&self, body: Value) -> Result<String> {
        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach the chat completions API")?
            .error_for_status()
            .context("Chat completions API returned an error")?
            .json::<LlmResponse>()
            .await
            .context("Failed to decode chat completions response")?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        Ok(answer.trim().to_string())
    }
}

/// Maps transcript turns onto chat roles: the interviewer is the assistant.
fn history_messages(history: &[Turn]) -> Vec<Value> {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::Interviewer => "assistant",
                Role::Candidate => "user",
            };
            json!({ "role": role, "content": turn.content })
        })
        .collect()
}

fn transcript_json(history: &[Turn]) -> Result<String> {
    serde_json::to_string(history).context("Failed to serialize interview history")
}

fn parse_review(raw: &str) -> Result<InterviewReview> {
    let mut review: InterviewReview = serde_json::from_str(raw)
        .with_context(|| format!("Invalid review format from LLM: {raw}"))?;
    review.score = review.score.min(100);
    Ok(review)
}

/// Clamps each category to 25 points and derives the total from the categories.
fn parse_evaluation(raw: &str) -> Result<Evaluation> {
    let mut evaluation: Evaluation = serde_json::from_str(raw)
        .with_context(|| format!("Invalid evaluation format from LLM: {raw}"))?;
    let scores = &mut evaluation.category_scores;
    for score in [
        &mut scores.communication,
        &mut scores.technical,
        &mut scores.problem_solving,
        &mut scores.cultural_fit,
    ] {
        *score = (*score).min(25);
    }
    evaluation.score = evaluation.category_scores.total();
    Ok(evaluation)
}

#[async_trait]
impl Interviewer for InterviewerClient {
    async fn opening_question(&self) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "system", "content": self.prompts.opening }],
        });
        self.complete(body).await
    }

    async fn follow_up(&self, history: &[Turn], answer: &str) -> Result<String> {
        let mut messages = vec![json!({ "role": "system", "content": self.prompts.follow_up })];
        messages.extend(history_messages(history));
        messages.push(json!({ "role": "user", "content": answer }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7
        });
        self.complete(body).await
    }

    async fn final_review(&self, history: &[Turn]) -> Result<InterviewReview> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompts.final_review },
                { "role": "user", "content": format!("Interview conversation: {}", transcript_json(history)?) }
            ],
            "response_format": { "type": "json_object" }
        });
        let raw = self.complete(body).await?;
        parse_review(&raw)
    }

    async fn evaluate(&self, history: &[Turn]) -> Result<Evaluation> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.prompts.evaluation },
                { "role": "user", "content": format!("Interview conversation: {}", transcript_json(history)?) }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2
        });
        let raw = self.complete(body).await?;
        parse_evaluation(&raw)
    }
}
