pub mod approval;
pub mod avatar;
pub mod identity;
pub mod interview_service;
pub mod interviewer;
pub mod poll;
pub mod policy;
pub mod prompt_loader;
pub mod registration;
pub mod runtime;
pub mod session_state;
pub mod silence;
pub mod speech_input;
pub mod speech_output;
pub mod store;
pub mod turn_controller;

#[cfg(test)]
mod testing;

use interview_service::AnswerFeedback;
use session_state::InterviewSession;
use turn_controller::{Notice, Submission};

/// Represents commands that the interview core (`TurnController`) issues to the runtime.
///
/// This enum decouples the controller's decision-making from the runtime's
/// execution of side effects (network calls, rendering).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send an answer to the interview service. The runtime reports the outcome
    /// back as `Event::SubmissionCompleted` with the same id.
    SubmitAnswer(Submission),
    /// Display the question currently on the table.
    ShowQuestion(String),
    /// Per-answer feedback returned alongside the next question.
    AnswerFeedback(AnswerFeedback),
    Notify(Notice),
    /// The interview is over; carries the final transcript.
    SessionComplete(InterviewSession),
}

impl From<Notice> for Command {
    fn from(notice: Notice) -> Self {
        Command::Notify(notice)
    }
}
