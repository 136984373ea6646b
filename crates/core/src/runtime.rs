//! Async driver for a [`TurnController`].
//!
//! One task owns the controller and feeds it events one at a time: engine and
//! user events from the public channel, submission completions from spawned
//! service calls, and `Tick`s when the silence deadline passes. Commands the
//! controller emits are either executed here (`SubmitAnswer`) or forwarded to
//! the UI channel.

use crate::Command;
use crate::interview_service::InterviewService;
use crate::session_state::InterviewSession;
use crate::speech_input::RecognitionEngine;
use crate::speech_output::SynthesisEngine;
use crate::turn_controller::{Event, Submission, TurnController};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Channel engines and the UI use to push events into the runtime.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(128)
}

pub struct InterviewRuntime<I, O> {
    controller: TurnController<I, O>,
    service: Arc<dyn InterviewService>,
    events: EventReceiver,
    ui: mpsc::Sender<Command>,
    completions_tx: mpsc::UnboundedSender<Event>,
    completions_rx: mpsc::UnboundedReceiver<Event>,
}

impl<I, O> InterviewRuntime<I, O>
where
    I: RecognitionEngine + 'static,
    O: SynthesisEngine + 'static,
{
    pub fn new(
        controller: TurnController<I, O>,
        service: Arc<dyn InterviewService>,
        events: EventReceiver,
        ui: mpsc::Sender<Command>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            service,
            events,
            ui,
            completions_tx,
            completions_rx,
        }
    }

    /// Starts the interview and processes events until it finishes.
    ///
    /// Closing the event channel ends the interview as if `Event::End` had been
    /// sent. Returns the final transcript.
    pub async fn run(mut self) -> InterviewSession {
        self.step(Event::Start).await;

        while !self.controller.is_finished() {
            let deadline = self.controller.silence_deadline();
            let event = tokio::select! {
                received = self.events.recv() => match received {
                    Some(event) => event,
                    None => {
                        tracing::info!("Event channel closed; ending interview");
                        Event::End
                    }
                },
                Some(done) = self.completions_rx.recv() => done,
                _ = wait_until(deadline) => Event::Tick,
            };
            self.step(event).await;
        }

        self.controller.session().clone()
    }

    async fn step(&mut self, event: Event) {
        tracing::debug!("Handling event {:?}", event);
        let commands = self.controller.handle(event, Instant::now());
        for command in commands {
            match command {
                Command::SubmitAnswer(submission) => self.spawn_submission(submission),
                other => {
                    if let Err(e) = self.ui.send(other).await {
                        tracing::warn!("UI command receiver dropped: {:?}", e.0);
                    }
                }
            }
        }
    }

    fn spawn_submission(&self, submission: Submission) {
        let service = self.service.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let Submission {
                id,
                answer,
                history,
            } = submission;
            let result = service.submit_answer(&history, &answer).await;
            if completions
                .send(Event::SubmissionCompleted { id, result })
                .is_err()
            {
                tracing::debug!("Runtime gone before submission #{} completed", id);
            }
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview_service::{AnswerReply, MockInterviewService, ServiceError};
    use crate::session_state::{InterviewPlan, Role};
    use crate::speech_input::RecognitionEvent;
    use crate::speech_output::PlaybackEvent;
    use crate::testing::{FakeRecognizer, FakeVoice};
    use crate::turn_controller::{ControllerConfig, Notice};
    use std::time::Duration;
    use tokio::time::timeout;

    fn runtime(
        questions: &[&str],
        service: MockInterviewService,
    ) -> (
        InterviewRuntime<FakeRecognizer, FakeVoice>,
        EventSender,
        mpsc::Receiver<Command>,
    ) {
        let plan = InterviewPlan::new(questions.iter().map(|q| q.to_string()).collect()).unwrap();
        let controller = TurnController::new(
            ControllerConfig {
                silence: Duration::from_millis(30),
                max_capture_failures: 2,
            },
            plan,
            FakeRecognizer::default(),
            FakeVoice::default(),
        );
        let (events_tx, events_rx) = event_channel();
        let (ui_tx, ui_rx) = mpsc::channel(32);
        let rt = InterviewRuntime::new(controller, Arc::new(service), events_rx, ui_tx);
        (rt, events_tx, ui_rx)
    }

    async fn next_question(ui: &mut mpsc::Receiver<Command>) -> String {
        loop {
            match timeout(Duration::from_secs(2), ui.recv()).await {
                Ok(Some(Command::ShowQuestion(q))) => return q,
                Ok(Some(_)) => continue,
                other => panic!("expected a question, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_runs_two_question_interview_to_completion() {
        let mut service = MockInterviewService::new();
        service
            .expect_submit_answer()
            .withf(|history, answer| history.len() == 1 && answer.contains("I write Rust"))
            .times(1)
            .returning(|_, _| {
                Ok(AnswerReply {
                    next_question: "Why this team?".to_string(),
                    evaluation: None,
                })
            });

        let (rt, events, mut ui) = runtime(&["Tell me about yourself.", "Q2"], service);
        let handle = tokio::spawn(rt.run());

        assert_eq!(next_question(&mut ui).await, "Tell me about yourself.");
        events
            .send(Event::Recognition(RecognitionEvent::Final("I write Rust".into())))
            .await
            .unwrap();
        assert_eq!(next_question(&mut ui).await, "Why this team?");

        // The first utterance spoken by the fake voice has id 1.
        events
            .send(Event::Playback(PlaybackEvent::Ended(1)))
            .await
            .unwrap();
        events
            .send(Event::Recognition(RecognitionEvent::Final("Great people".into())))
            .await
            .unwrap();

        let session = timeout(Duration::from_secs(2), handle)
            .await
            .expect("runtime did not finish")
            .unwrap();
        assert!(session.is_complete());
        let roles: Vec<Role> = session.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::Interviewer,
                Role::Candidate,
                Role::Interviewer,
                Role::Candidate
            ]
        );

        let mut saw_complete = false;
        while let Ok(command) = ui.try_recv() {
            saw_complete |= matches!(command, Command::SessionComplete(_));
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn test_failed_submission_is_reported_and_retried() {
        let mut service = MockInterviewService::new();
        let mut seq = mockall::Sequence::new();
        service
            .expect_submit_answer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ServiceError::Network("connection reset".into())));
        service
            .expect_submit_answer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(AnswerReply {
                    next_question: "Next?".to_string(),
                    evaluation: None,
                })
            });

        let (rt, events, mut ui) = runtime(&["Q1", "Q2", "Q3"], service);
        let handle = tokio::spawn(rt.run());
        next_question(&mut ui).await;

        events
            .send(Event::Recognition(RecognitionEvent::Final("my answer".into())))
            .await
            .unwrap();
        let notice = timeout(Duration::from_secs(2), ui.recv()).await.unwrap();
        assert!(matches!(
            notice,
            Some(Command::Notify(Notice::SubmissionFailed { retryable: true, .. }))
        ));

        events.send(Event::RetrySubmission).await.unwrap();
        assert_eq!(next_question(&mut ui).await, "Next?");

        drop(events);
        let session = timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.turns().len(), 3);
    }

    #[tokio::test]
    async fn test_closing_event_channel_ends_interview() {
        let (rt, events, mut ui) = runtime(&["Q1", "Q2"], MockInterviewService::new());
        let handle = tokio::spawn(rt.run());
        next_question(&mut ui).await;

        drop(events);

        let session = timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_complete());
        assert_eq!(session.turns().len(), 1);
    }
}
