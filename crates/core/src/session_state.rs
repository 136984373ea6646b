use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a turn in the interview transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Interviewer,
    Candidate,
}

/// One recorded utterance of the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn interviewer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Interviewer,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn candidate(content: impl Into<String>) -> Self {
        Self {
            role: Role::Candidate,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The fixed list of questions an interview walks through.
///
/// The first entry is the opening question. The list length bounds how many
/// answers the candidate gives before the session completes; entries after the
/// first are used only when the remote interviewer does not supply a follow-up.
#[derive(Debug, Clone)]
pub struct InterviewPlan {
    questions: Vec<String>,
}

impl InterviewPlan {
    /// Returns `None` for an empty list, which cannot drive an interview.
    pub fn new(questions: Vec<String>) -> Option<Self> {
        if questions.is_empty() {
            None
        } else {
            Some(Self { questions })
        }
    }

    pub fn opening_question(&self) -> &str {
        &self.questions[0]
    }

    pub fn question(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.questions.len()
    }
}

/// Transcript and progress of a single interview.
///
/// Turns are append-only and the question index only moves forward; the only
/// way back is [`InterviewSession::restart`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    turns: Vec<Turn>,
    current_question_index: usize,
    complete: bool,
}

impl InterviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn push(&mut self, turn: Turn) {
        if self.complete {
            tracing::warn!("Ignoring turn appended to a completed session");
            return;
        }
        self.turns.push(turn);
    }

    pub fn advance(&mut self) -> usize {
        self.current_question_index += 1;
        self.current_question_index
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn restart(&mut self) {
        self.turns.clear();
        self.current_question_index = 0;
        self.complete = false;
    }

    /// The most recent interviewer turn, i.e. the question currently on the table.
    pub fn current_question(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Interviewer)
            .map(|t| t.content.as_str())
    }
}

/// A saved interview transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub messages: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Returns `None` for an empty transcript.
    pub fn new(messages: Vec<Turn>, created_at: DateTime<Utc>) -> Option<Self> {
        if messages.is_empty() {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            messages,
            created_at,
        })
    }
}
