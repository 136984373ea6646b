mod config;
mod console;

use crate::config::Config;
use crate::console::{ConsoleRecognizer, ConsoleVoice, parse_line};
use anyhow::{Context, Result};
use clap::Parser;
use hireai_core::Command;
use hireai_core::interview_service::{HttpInterviewService, InterviewService};
use hireai_core::runtime::{InterviewRuntime, event_channel};
use hireai_core::session_state::{InterviewPlan, InterviewSession, Role};
use hireai_core::turn_controller::{ControllerConfig, Event, Notice, TurnController};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Asked when the remote interviewer returns no follow-up.
const FALLBACK_QUESTIONS: [&str; 4] = [
    "Can you walk me through a recent project you are proud of?",
    "How do you approach debugging a problem you have never seen before?",
    "Tell me about a time you had to learn a new technology quickly.",
    "Where do you see yourself growing in your next role?",
];

#[derive(Parser)]
#[command(version, about = "Run a voice-style interview from the terminal")]
struct Cli {
    /// Base URL of the hireai-api service. Overrides API_BASE_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Number of answers before the interview completes. Overrides QUESTION_COUNT.
    #[arg(long)]
    questions: Option<usize>,

    /// Quiet period in milliseconds that ends an answer. Overrides SILENCE_MS.
    #[arg(long)]
    silence_ms: Option<u64>,

    /// Score the transcript with the rubric evaluator after the interview.
    #[arg(long)]
    evaluate: bool,
}

fn build_plan(opening: String, question_count: usize) -> Option<InterviewPlan> {
    let mut questions = vec![opening];
    questions.extend(
        FALLBACK_QUESTIONS
            .iter()
            .cycle()
            .take(question_count.saturating_sub(1))
            .map(|q| q.to_string()),
    );
    InterviewPlan::new(questions)
}

fn render(command: Command) -> bool {
    match command {
        Command::ShowQuestion(question) => println!("\n[Question] {question}"),
        Command::AnswerFeedback(feedback) => {
            if let Some(text) = feedback.transcription {
                println!("(recorded: \"{text}\")");
            }
        }
        Command::Notify(notice) => match notice {
            Notice::SubmissionFailed { message, retryable } => {
                println!("! Could not send your answer: {message}");
                if retryable {
                    println!("  Type /retry to send it again.");
                }
            }
            Notice::RecognitionError(kind) => println!("! Recognition error: {kind:?}"),
            Notice::AutoSpeechDisabled => {
                println!("! Speech playback was blocked. Type /speech to turn it back on.")
            }
            Notice::SpeechUnavailable(reason) => println!("! Speech unavailable: {reason}"),
            Notice::SessionDegraded(reason) => {
                println!("! {reason}. Type /end to finish and keep your transcript.")
            }
        },
        Command::SessionComplete(_) => {
            println!("\nInterview complete.");
            return false;
        }
        Command::SubmitAnswer(_) => {}
    }
    true
}

async fn summarize(service: &dyn InterviewService, session: &InterviewSession, evaluate: bool) {
    let history = session.turns();
    if !history.iter().any(|t| t.role == Role::Candidate) {
        println!("No answers were recorded.");
        return;
    }

    match service.save_history(history).await {
        Ok(conversation) => println!("Transcript saved ({}).", conversation.id),
        Err(e) => tracing::error!("Failed to save interview transcript: {}", e),
    }

    match service.end(history).await {
        Ok(review) => {
            println!("\nScore: {}/100", review.score);
            println!("{}", review.feedback.overall);
        }
        Err(e) => tracing::error!("Failed to fetch interview review: {}", e),
    }

    if evaluate {
        match service.evaluate(history).await {
            Ok(evaluation) => {
                let c = &evaluation.category_scores;
                println!(
                    "\nCommunication {}/25, Technical {}/25, Problem solving {}/25, Cultural fit {}/25",
                    c.communication, c.technical, c.problem_solving, c.cultural_fit
                );
                println!("{}", evaluation.feedback);
                for strength in &evaluation.strengths {
                    println!("  + {strength}");
                }
            }
            Err(e) => tracing::error!("Failed to evaluate interview: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(count) = args.questions {
        config.question_count = count.max(1);
    }
    if let Some(ms) = args.silence_ms {
        config.silence = std::time::Duration::from_millis(ms);
    }

    // --- 4. Fetch the opening question ---
    let service = Arc::new(HttpInterviewService::new(config.api_base_url.clone()));
    let opening = service
        .start()
        .await
        .context("Failed to start interview")?;
    let plan = build_plan(opening, config.question_count)
        .context("Interview plan must contain at least one question")?;
    tracing::info!("Starting interview with {} questions", plan.len());

    // --- 5. Wire the runtime ---
    let (events_tx, events_rx) = event_channel();
    let (ui_tx, mut ui_rx) = mpsc::channel::<Command>(32);
    let listening = Arc::new(AtomicBool::new(false));

    let controller = TurnController::new(
        ControllerConfig {
            silence: config.silence,
            ..Default::default()
        },
        plan,
        ConsoleRecognizer::new(listening.clone()),
        ConsoleVoice::new(events_tx.clone()),
    );
    let runtime = InterviewRuntime::new(controller, service.clone(), events_rx, ui_tx);
    let mut runtime_handle = tokio::spawn(runtime.run());

    println!("Type your answers. Commands: /pause /resume /retry /speech /end");

    // Typed lines are the microphone.
    let input_tx = events_tx.clone();
    let stdin_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse_line(&line) {
                        if matches!(event, Event::Recognition(_)) && !listening.load(Ordering::SeqCst) {
                            println!("(interrupting)");
                        }
                        if input_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    if input_tx.send(Event::End).await.is_err() {
                        tracing::debug!("Runtime gone before end of input");
                    }
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read from stdin: {}", e);
                    if input_tx.send(Event::End).await.is_err() {
                        tracing::debug!("Runtime gone before end of input");
                    }
                    break;
                }
            }
        }
    });

    let ui_handle = tokio::spawn(async move {
        while let Some(command) = ui_rx.recv().await {
            if !render(command) {
                break;
            }
        }
    });

    let session = tokio::select! {
        joined = &mut runtime_handle => joined.context("Interview runtime panicked")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, ending interview...");
            if events_tx.send(Event::End).await.is_err() {
                tracing::debug!("Runtime already finished");
            }
            runtime_handle.await.context("Interview runtime panicked")?
        }
    };

    stdin_handle.abort();
    if let Err(e) = ui_handle.await {
        tracing::debug!("Console renderer stopped abnormally: {}", e);
    }

    summarize(service.as_ref(), &session, args.evaluate).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hireai_core::interview_service::{
        AnswerReply, Evaluation, InterviewFeedback, InterviewReview, ServiceError,
    };
    use hireai_core::session_state::{Conversation, Turn};
    use mockall::mock;

    mock! {
        Service {}

        #[async_trait]
        impl InterviewService for Service {
            async fn start(&self) -> Result<String, ServiceError>;
            async fn submit_answer(&self, history: &[Turn], answer: &str) -> Result<AnswerReply, ServiceError>;
            async fn end(&self, history: &[Turn]) -> Result<InterviewReview, ServiceError>;
            async fn evaluate(&self, history: &[Turn]) -> Result<Evaluation, ServiceError>;
            async fn save_history(&self, history: &[Turn]) -> Result<Conversation, ServiceError>;
        }
    }

    fn answered_session() -> InterviewSession {
        let mut session = InterviewSession::new();
        session.push(Turn::interviewer("Tell me about yourself."));
        session.push(Turn::candidate("I build compilers."));
        session
    }

    #[tokio::test]
    async fn test_summary_saves_transcript_even_when_review_fails() {
        let mut service = MockService::new();
        service
            .expect_save_history()
            .withf(|history| history.len() == 2 && history[1].content == "I build compilers.")
            .times(1)
            .returning(|history| {
                Ok(Conversation::new(history.to_vec(), history[0].timestamp).unwrap())
            });
        service.expect_end().times(1).returning(|_| {
            Err(ServiceError::Network("connection reset".into()))
        });
        service.expect_evaluate().never();

        summarize(&service, &answered_session(), false).await;
    }

    #[tokio::test]
    async fn test_summary_without_answers_saves_nothing() {
        let mut service = MockService::new();
        service.expect_save_history().never();
        service.expect_end().never();

        let mut session = InterviewSession::new();
        session.push(Turn::interviewer("Tell me about yourself."));
        summarize(&service, &session, true).await;
    }

    #[tokio::test]
    async fn test_summary_continues_after_failed_save() {
        let mut service = MockService::new();
        service.expect_save_history().times(1).returning(|_| {
            Err(ServiceError::Remote {
                status: 500,
                message: "Failed to save conversation".into(),
            })
        });
        service.expect_end().times(1).returning(|_| {
            Ok(InterviewReview {
                score: 70,
                feedback: InterviewFeedback::default(),
            })
        });

        summarize(&service, &answered_session(), false).await;
    }

    #[test]
    fn test_plan_starts_with_opening_question() {
        let plan = build_plan("Hello, tell me about yourself.".into(), 3).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.opening_question(), "Hello, tell me about yourself.");
        assert_eq!(plan.question(1), Some(FALLBACK_QUESTIONS[0]));
    }

    #[test]
    fn test_plan_cycles_fallbacks() {
        let plan = build_plan("Hi".into(), 7).unwrap();
        assert_eq!(plan.len(), 7);
        assert_eq!(plan.question(5), Some(FALLBACK_QUESTIONS[0]));
    }

    #[test]
    fn test_session_complete_stops_rendering() {
        assert!(render(Command::ShowQuestion("Q".into())));
        assert!(!render(Command::SessionComplete(InterviewSession::new())));
    }
}
