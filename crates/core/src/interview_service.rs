use crate::session_state::{Conversation, Turn};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// The request never produced a response. Callers may retry.
    #[error("network error: {0}")]
    Network(String),
    /// The service answered with a failure. Not retryable.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Network(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    #[serde(default)]
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReply {
    pub next_question: String,
    #[serde(default, alias = "feedback")]
    pub evaluation: Option<AnswerFeedback>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewFeedback {
    #[serde(default)]
    pub communication: String,
    #[serde(default)]
    pub technical: String,
    #[serde(default)]
    pub problem_solving: String,
    #[serde(default)]
    pub cultural_fit: String,
    #[serde(default)]
    pub overall: String,
}

/// Result of closing an interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewReview {
    pub score: u8,
    pub feedback: InterviewFeedback,
}

/// Per-category scores, each out of 25.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    pub communication: u8,
    pub technical: u8,
    pub problem_solving: u8,
    pub cultural_fit: u8,
}

impl CategoryScores {
    pub fn total(&self) -> u8 {
        self.communication
            .saturating_add(self.technical)
            .saturating_add(self.problem_solving)
            .saturating_add(self.cultural_fit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub score: u8,
    pub category_scores: CategoryScores,
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
}

/// The remote side of an interview: question generation and scoring.
///
/// One call is one request; implementations never retry on their own.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InterviewService: Send + Sync {
    async fn start(&self) -> Result<String, ServiceError>;

    async fn submit_answer(&self, history: &[Turn], answer: &str)
    -> Result<AnswerReply, ServiceError>;

    async fn end(&self, history: &[Turn]) -> Result<InterviewReview, ServiceError>;

    async fn evaluate(&self, history: &[Turn]) -> Result<Evaluation, ServiceError>;

    /// Stores the transcript so it can be reviewed later.
    async fn save_history(&self, history: &[Turn]) -> Result<Conversation, ServiceError>;
}

/// [`InterviewService`] over the HTTP API exposed by `hireai-api`.
pub struct HttpInterviewService {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct StartResponse {
    question: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpInterviewService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or(text);
            return Err(ServiceError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<R>().await.map_err(|e| ServiceError::Remote {
            status: status.as_u16(),
            message: format!("invalid response body: {e}"),
        })
    }
}

#[async_trait]
impl InterviewService for HttpInterviewService {
    async fn start(&self) -> Result<String, ServiceError> {
        let resp: StartResponse = self.post("/interview/start", &serde_json::json!({})).await?;
        Ok(resp.question)
    }

    async fn submit_answer(
        &self,
        history: &[Turn],
        answer: &str,
    ) -> Result<AnswerReply, ServiceError> {
        let body = serde_json::json!({ "answer": answer, "history": history });
        self.post("/interview/process-answer", &body).await
    }

    async fn end(&self, history: &[Turn]) -> Result<InterviewReview, ServiceError> {
        self.post("/interview/end", &serde_json::json!({ "history": history }))
            .await
    }

    async fn evaluate(&self, history: &[Turn]) -> Result<Evaluation, ServiceError> {
        self.post("/interview/evaluate", &serde_json::json!({ "history": history }))
            .await
    }

    async fn save_history(&self, history: &[Turn]) -> Result<Conversation, ServiceError> {
        self.post("/history", &serde_json::json!({ "conversation": history }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(ServiceError::Network("connection reset".into()).is_retryable());
        assert!(
            !ServiceError::Remote {
                status: 500,
                message: "LLM failed".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_answer_reply_accepts_feedback_field() {
        let reply: AnswerReply = serde_json::from_str(
            r#"{"nextQuestion":"Why Rust?","feedback":{"transcription":"I like it"}}"#,
        )
        .unwrap();
        assert_eq!(reply.next_question, "Why Rust?");
        assert_eq!(
            reply.evaluation.unwrap().transcription.as_deref(),
            Some("I like it")
        );
    }

    #[test]
    fn test_evaluation_shape() {
        let evaluation: Evaluation = serde_json::from_str(
            r#"{
                "score": 82,
                "categoryScores": {"communication": 22, "technical": 20, "problemSolving": 21, "culturalFit": 19},
                "feedback": "Solid answers.",
                "strengths": ["clear structure"]
            }"#,
        )
        .unwrap();
        assert_eq!(evaluation.category_scores.total(), 82);
        assert_eq!(evaluation.strengths, vec!["clear structure".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_network_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let service = HttpInterviewService::new("http://127.0.0.1:9/");
        let err = service.start().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }
}
