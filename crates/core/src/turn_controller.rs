//! The interview turn-taking state machine.
//!
//! `TurnController` is a synchronous FSM: every input arrives as an [`Event`],
//! is handled to completion, and produces [`Command`]s for the runtime. Network
//! work never happens here; a submission goes out as
//! [`Command::SubmitAnswer`] and its completion comes back as
//! [`Event::SubmissionCompleted`].
//!
//! The microphone and the synthesis engine are never active together: the
//! input adapter is stopped before anything is spoken, and playback is
//! cancelled before listening resumes.

use crate::Command;
use crate::interview_service::{AnswerReply, ServiceError};
use crate::session_state::{InterviewPlan, InterviewSession, Turn};
use crate::silence::{DEFAULT_SILENCE_MS, SilenceDebouncer};
use crate::speech_input::{
    InputSignal, RecognitionEngine, RecognitionErrorKind, RecognitionEvent, RecognitionState,
    SpeechInputAdapter, SpeechInputError,
};
use crate::speech_output::{
    PlaybackEvent, PlaybackSignal, PlaybackState, SpeechOutputAdapter, SynthesisEngine,
    SynthesisError, SynthesisErrorKind,
};
use std::time::Duration;
use tokio::time::Instant;

/// Everything the controller reacts to.
#[derive(Debug)]
pub enum Event {
    Start,
    Recognition(RecognitionEvent),
    Playback(PlaybackEvent),
    /// Time has moved on; checks the silence deadline.
    Tick,
    SubmissionCompleted {
        id: u64,
        result: Result<AnswerReply, ServiceError>,
    },
    /// Resubmit the last answer whose submission failed with a retryable error.
    RetrySubmission,
    Pause,
    Resume,
    TogglePause,
    /// The user explicitly allowed speech playback again.
    EnableAutoSpeech,
    End,
}

/// An answer on its way to the interview service.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: u64,
    pub answer: String,
    pub history: Vec<Turn>,
}

/// Conditions the UI should surface to the candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    SubmissionFailed { message: String, retryable: bool },
    RecognitionError(RecognitionErrorKind),
    /// Speech playback was refused; auto-speech stays off until re-enabled.
    AutoSpeechDisabled,
    SpeechUnavailable(String),
    /// Recognition gave up for this session; the interview can still be ended.
    SessionDegraded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    Submitting,
    Speaking,
    Paused,
    Finished,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub silence: Duration,
    /// Capture failures (`not-allowed`, `audio-capture`) tolerated before giving up.
    pub max_capture_failures: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            silence: Duration::from_millis(DEFAULT_SILENCE_MS),
            max_capture_failures: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Listening,
    Speaking,
    Finished,
}

#[derive(Debug)]
struct PendingSubmission {
    id: u64,
    answer: String,
}

#[derive(Debug)]
struct FailedSubmission {
    answer: String,
    retryable: bool,
}

pub struct TurnController<I, O> {
    config: ControllerConfig,
    plan: InterviewPlan,
    session: InterviewSession,
    input: SpeechInputAdapter<I>,
    output: SpeechOutputAdapter<O>,
    debouncer: SilenceDebouncer,
    phase: Phase,
    paused: bool,
    degraded: bool,
    capture_failures: u32,
    pending: Option<PendingSubmission>,
    failed: Option<FailedSubmission>,
    next_submission_id: u64,
}

impl<I: RecognitionEngine, O: SynthesisEngine> TurnController<I, O> {
    pub fn new(config: ControllerConfig, plan: InterviewPlan, recognizer: I, voice: O) -> Self {
        let debouncer = SilenceDebouncer::new(config.silence);
        Self {
            config,
            plan,
            session: InterviewSession::new(),
            input: SpeechInputAdapter::new(recognizer),
            output: SpeechOutputAdapter::new(voice),
            debouncer,
            phase: Phase::Idle,
            paused: false,
            degraded: false,
            capture_failures: 0,
            pending: None,
            failed: None,
            next_submission_id: 1,
        }
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        match event {
            Event::Start => self.start(&mut commands),
            Event::Recognition(event) => self.on_recognition(event, now, &mut commands),
            Event::Playback(event) => self.on_playback(event, &mut commands),
            Event::Tick => self.on_tick(now, &mut commands),
            Event::SubmissionCompleted { id, result } => {
                self.on_submission_completed(id, result, &mut commands)
            }
            Event::RetrySubmission => self.retry(&mut commands),
            Event::Pause => self.pause(),
            Event::Resume => self.resume(&mut commands),
            Event::TogglePause => {
                if self.paused {
                    self.resume(&mut commands)
                } else {
                    self.pause()
                }
            }
            Event::EnableAutoSpeech => {
                tracing::info!("Auto-speech re-enabled by the user");
                self.output.enable_auto_speech();
            }
            Event::End => self.finish(&mut commands),
        }
        debug_assert!(
            !(self.input.is_listening() && self.output.is_speaking()),
            "microphone and speech playback active at the same time"
        );
        commands
    }

    pub fn state(&self) -> TurnState {
        match self.phase {
            Phase::Idle => TurnState::Idle,
            Phase::Finished => TurnState::Finished,
            _ if self.paused => TurnState::Paused,
            Phase::Speaking => TurnState::Speaking,
            Phase::Listening if self.pending.is_some() => TurnState::Submitting,
            Phase::Listening => TurnState::Listening,
        }
    }

    pub fn session(&self) -> &InterviewSession {
        &self.session
    }

    pub fn recognition(&self) -> &RecognitionState {
        self.input.state()
    }

    pub fn playback(&self) -> &PlaybackState {
        self.output.state()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// When the runtime should deliver the next [`Event::Tick`].
    pub fn silence_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn recognizer(&self) -> &I {
        self.input.engine()
    }

    pub fn voice(&self) -> &O {
        self.output.engine()
    }

    fn start(&mut self, commands: &mut Vec<Command>) {
        if self.phase != Phase::Idle {
            tracing::debug!("Ignoring start in state {:?}", self.state());
            return;
        }
        let opening = self.plan.opening_question().to_string();
        tracing::info!("Interview started with {} planned questions", self.plan.len());
        self.session.push(Turn::interviewer(opening.clone()));
        commands.push(Command::ShowQuestion(opening));
        self.begin_listening(commands);
    }

    /// Hands the audio devices to the microphone.
    fn begin_listening(&mut self, commands: &mut Vec<Command>) {
        self.output.cancel();
        self.phase = Phase::Listening;
        if self.degraded || self.paused || self.input.is_listening() {
            return;
        }
        if let Err(e) = self.input.start() {
            self.on_start_failure(e, commands);
        }
    }

    /// Hands the audio devices to the speaker. Falls back to listening if
    /// nothing can be played.
    fn begin_speaking(&mut self, text: &str, commands: &mut Vec<Command>) {
        if !self.output.auto_speech_enabled() {
            return;
        }
        self.input.stop();
        self.debouncer.cancel();
        match self.output.speak(text) {
            Ok(_) => self.phase = Phase::Speaking,
            Err(e) => {
                tracing::warn!("Could not speak question: {}", e);
                commands.push(match e {
                    SynthesisError::NotAllowed => Notice::AutoSpeechDisabled,
                    other => Notice::SpeechUnavailable(other.to_string()),
                }
                .into());
                self.begin_listening(commands);
            }
        }
    }

    fn barge_in(&mut self, commands: &mut Vec<Command>) {
        tracing::info!("Candidate started talking; interrupting playback");
        self.begin_listening(commands);
    }

    fn on_recognition(&mut self, event: RecognitionEvent, now: Instant, commands: &mut Vec<Command>) {
        let Some(signal) = self.input.handle(event, now) else {
            return;
        };
        if matches!(self.phase, Phase::Idle | Phase::Finished) {
            tracing::debug!("Ignoring recognition signal {:?} in state {:?}", signal, self.state());
            return;
        }
        match signal {
            InputSignal::SpeechStarted => {
                if self.phase == Phase::Speaking && !self.paused {
                    self.barge_in(commands);
                }
            }
            InputSignal::Partial(_) => {}
            InputSignal::Final(text) => {
                if self.paused {
                    return;
                }
                if self.phase == Phase::Speaking {
                    self.barge_in(commands);
                }
                self.capture_failures = 0;
                self.debouncer.on_final(&text, now);
            }
            InputSignal::Error(kind) if kind.is_capture_failure() => {
                self.on_capture_failure(format!("{kind:?}"), commands);
            }
            InputSignal::Error(RecognitionErrorKind::NoSpeech) => {
                tracing::debug!("No speech detected");
            }
            InputSignal::Error(kind) => {
                commands.push(Notice::RecognitionError(kind).into());
            }
            InputSignal::Restarted => {}
            InputSignal::RestartFailed(e) => self.on_start_failure(e, commands),
        }
    }

    fn on_start_failure(&mut self, error: SpeechInputError, commands: &mut Vec<Command>) {
        match error {
            SpeechInputError::Unsupported => self.degrade(error.to_string(), commands),
            SpeechInputError::Start(reason) => self.on_capture_failure(reason, commands),
        }
    }

    fn on_capture_failure(&mut self, reason: String, commands: &mut Vec<Command>) {
        self.capture_failures += 1;
        tracing::warn!(
            "Microphone capture failure {}/{}: {}",
            self.capture_failures,
            self.config.max_capture_failures,
            reason
        );
        if self.capture_failures >= self.config.max_capture_failures {
            self.degrade(reason, commands);
        } else {
            commands.push(Notice::RecognitionError(RecognitionErrorKind::AudioCapture).into());
        }
    }

    fn degrade(&mut self, reason: String, commands: &mut Vec<Command>) {
        if self.degraded {
            return;
        }
        tracing::error!("Speech recognition disabled for this session: {}", reason);
        self.degraded = true;
        self.input.stop();
        self.debouncer.cancel();
        commands.push(Notice::SessionDegraded(reason).into());
    }

    fn on_tick(&mut self, now: Instant, commands: &mut Vec<Command>) {
        if let Some(answer) = self.debouncer.poll(now) {
            self.on_answer_ready(answer, commands);
        }
    }

    fn on_answer_ready(&mut self, answer: String, commands: &mut Vec<Command>) {
        if self.phase != Phase::Listening || self.paused {
            tracing::debug!("Dropping answer in state {:?}", self.state());
            return;
        }
        if self.pending.is_some() {
            tracing::warn!("Submission already in flight; dropping answer \"{}\"", answer);
            return;
        }

        let index = self.session.current_question_index();
        if self.plan.is_last(index) {
            tracing::info!("Final answer received");
            self.session.push(Turn::candidate(answer));
            self.session.advance();
            self.finish(commands);
            return;
        }
        self.submit(answer, commands);
    }

    fn submit(&mut self, answer: String, commands: &mut Vec<Command>) {
        let id = self.next_submission_id;
        self.next_submission_id += 1;
        tracing::info!("Submitting answer #{}: \"{}\"", id, answer);
        self.failed = None;
        commands.push(Command::SubmitAnswer(Submission {
            id,
            answer: answer.clone(),
            history: self.session.turns().to_vec(),
        }));
        self.pending = Some(PendingSubmission { id, answer });
    }

    fn retry(&mut self, commands: &mut Vec<Command>) {
        if self.pending.is_some() || self.phase != Phase::Listening || self.paused {
            return;
        }
        match self.failed.take() {
            Some(failed) if failed.retryable => self.submit(failed.answer, commands),
            Some(failed) => {
                tracing::warn!("Last submission failed permanently; not retrying");
                self.failed = Some(failed);
            }
            None => tracing::debug!("Nothing to retry"),
        }
    }

    fn on_submission_completed(
        &mut self,
        id: u64,
        result: Result<AnswerReply, ServiceError>,
        commands: &mut Vec<Command>,
    ) {
        if self.pending.as_ref().map(|p| p.id) != Some(id) {
            tracing::debug!("Ignoring completion of stale submission #{}", id);
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        if self.phase == Phase::Finished {
            return;
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Submission #{} failed: {}", id, e);
                let retryable = e.is_retryable();
                self.failed = Some(FailedSubmission {
                    answer: pending.answer,
                    retryable,
                });
                commands.push(
                    Notice::SubmissionFailed {
                        message: e.to_string(),
                        retryable,
                    }
                    .into(),
                );
                return;
            }
        };

        self.session.push(Turn::candidate(pending.answer));
        let index = self.session.advance();
        let question = if reply.next_question.trim().is_empty() {
            self.plan.question(index).unwrap_or_default().to_string()
        } else {
            reply.next_question
        };
        self.session.push(Turn::interviewer(question.clone()));
        tracing::info!("Advanced to question {}/{}", index + 1, self.plan.len());

        if let Some(feedback) = reply.evaluation {
            commands.push(Command::AnswerFeedback(feedback));
        }
        commands.push(Command::ShowQuestion(question.clone()));
        if !self.paused {
            self.begin_speaking(&question, commands);
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent, commands: &mut Vec<Command>) {
        let Some(signal) = self.output.handle(event) else {
            return;
        };
        match signal {
            PlaybackSignal::Started => tracing::debug!("Playback started"),
            PlaybackSignal::Finished => {
                if self.phase == Phase::Speaking && !self.paused {
                    self.begin_listening(commands);
                }
            }
            PlaybackSignal::Failed(kind) => {
                commands.push(match kind {
                    SynthesisErrorKind::NotAllowed => Notice::AutoSpeechDisabled,
                    other => Notice::SpeechUnavailable(format!("{other:?}")),
                }
                .into());
                if self.phase == Phase::Speaking && !self.paused {
                    self.begin_listening(commands);
                }
            }
        }
    }

    fn pause(&mut self) {
        if self.paused || matches!(self.phase, Phase::Idle | Phase::Finished) {
            return;
        }
        tracing::info!("Interview paused");
        self.paused = true;
        self.input.pause();
        self.debouncer.cancel();
        self.output.cancel();
        if self.phase == Phase::Speaking {
            self.phase = Phase::Listening;
        }
    }

    fn resume(&mut self, commands: &mut Vec<Command>) {
        if !self.paused || self.phase == Phase::Finished {
            return;
        }
        tracing::info!("Interview resumed");
        self.paused = false;
        self.phase = Phase::Listening;
        if self.degraded {
            return;
        }
        if let Err(e) = self.input.resume() {
            self.on_start_failure(e, commands);
        }
    }

    fn finish(&mut self, commands: &mut Vec<Command>) {
        if self.phase == Phase::Finished {
            return;
        }
        self.input.stop();
        self.debouncer.cancel();
        self.output.cancel();
        self.pending = None;
        self.session.mark_complete();
        self.phase = Phase::Finished;
        tracing::info!(
            "Interview finished after {} turns",
            self.session.turns().len()
        );
        commands.push(Command::SessionComplete(self.session.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRecognizer, FakeVoice};

    type Controller = TurnController<FakeRecognizer, FakeVoice>;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn controller(questions: &[&str]) -> Controller {
        let plan = InterviewPlan::new(questions.iter().map(|q| q.to_string()).collect()).unwrap();
        TurnController::new(
            ControllerConfig {
                silence: ms(1500),
                max_capture_failures: 2,
            },
            plan,
            FakeRecognizer::default(),
            FakeVoice::default(),
        )
    }

    fn final_text(text: &str) -> Event {
        Event::Recognition(RecognitionEvent::Final(text.to_string()))
    }

    fn submissions(commands: &[Command]) -> Vec<Submission> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::SubmitAnswer(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn reply(question: &str) -> Result<AnswerReply, ServiceError> {
        Ok(AnswerReply {
            next_question: question.to_string(),
            evaluation: None,
        })
    }

    /// Drives the controller from start to the point where submission #1 is in flight.
    fn answer_first_question(c: &mut Controller, t0: Instant) -> Submission {
        c.handle(Event::Start, t0);
        c.handle(final_text("I have 5 years of experience"), t0);
        c.handle(final_text("I have 5 years of experience"), t0 + ms(500));
        let commands = c.handle(Event::Tick, t0 + ms(2000));
        let mut subs = submissions(&commands);
        assert_eq!(subs.len(), 1);
        subs.remove(0)
    }

    #[test]
    fn test_start_begins_listening_with_opening_question() {
        let mut c = controller(&["Tell me about yourself.", "Why this role?"]);
        let commands = c.handle(Event::Start, Instant::now());

        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
        assert_eq!(c.recognizer().starts, 1);
        assert_eq!(c.session().turns().len(), 1);
        assert!(
            matches!(&commands[..], [Command::ShowQuestion(q)] if q == "Tell me about yourself.")
        );
    }

    #[test]
    fn test_two_question_interview_submits_once_and_advances() {
        let mut c = controller(&["Tell me about yourself.", "Why this role?"]);
        let t0 = Instant::now();

        c.handle(Event::Start, t0);
        let turns_before = c.session().turns().len();
        c.handle(final_text("I have 5 years of experience"), t0);
        c.handle(final_text("I have 5 years of experience"), t0 + ms(500));

        // Still inside the silence window of the second final.
        assert!(submissions(&c.handle(Event::Tick, t0 + ms(1900))).is_empty());
        let commands = c.handle(Event::Tick, t0 + ms(2000));
        let subs = submissions(&commands);
        assert_eq!(subs.len(), 1);
        assert_eq!(c.state(), TurnState::Submitting);
        assert_eq!(subs[0].history.len(), turns_before);

        // Later ticks never resubmit.
        assert!(submissions(&c.handle(Event::Tick, t0 + ms(5000))).is_empty());

        let commands = c.handle(
            Event::SubmissionCompleted {
                id: subs[0].id,
                result: reply("What drew you to this role?"),
            },
            t0 + ms(2500),
        );

        assert_eq!(c.session().current_question_index(), 1);
        assert_eq!(c.session().turns().len(), turns_before + 2);
        assert_eq!(c.state(), TurnState::Speaking);
        assert!(!c.recognition().is_listening);
        assert_eq!(
            c.voice().spoken.last().map(|(_, t)| t.as_str()),
            Some("What drew you to this role?")
        );
        assert!(commands.contains(&Command::ShowQuestion("What drew you to this role?".into())));
    }

    #[test]
    fn test_playback_end_returns_to_listening() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Follow-up?"),
            },
            t0,
        );
        let utterance = c.playback().current_utterance_id.unwrap();

        c.handle(Event::Playback(PlaybackEvent::Ended(utterance)), t0 + ms(3000));

        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
        assert!(!c.playback().is_speaking);
    }

    #[test]
    fn test_late_recognition_end_does_not_restart_live_session() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Follow-up?"),
            },
            t0,
        );
        let utterance = c.playback().current_utterance_id.unwrap();
        c.handle(Event::Playback(PlaybackEvent::Ended(utterance)), t0 + ms(3000));
        let starts = c.recognizer().starts;

        // End-of-stream from the capture stopped before speaking arrives late.
        let commands = c.handle(Event::Recognition(RecognitionEvent::Ended), t0 + ms(3100));

        assert!(commands.is_empty());
        assert_eq!(c.recognizer().starts, starts);
        assert!(c.recognizer().running);
        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
    }

    #[test]
    fn test_final_while_speaking_barges_in() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Follow-up?"),
            },
            t0,
        );
        assert_eq!(c.state(), TurnState::Speaking);

        c.handle(final_text("Sorry, can I add something"), t0 + ms(100));

        assert_eq!(c.voice().cancels, 1);
        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
        assert!(!c.playback().is_speaking);
        // The interrupting speech counts toward the next answer.
        assert!(c.silence_deadline().is_some());
    }

    #[test]
    fn test_speech_start_while_speaking_barges_in() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Follow-up?"),
            },
            t0,
        );

        c.handle(Event::Recognition(RecognitionEvent::SpeechStarted), t0);

        assert_eq!(c.voice().cancels, 1);
        assert_eq!(c.state(), TurnState::Listening);
    }

    #[test]
    fn test_second_answer_while_pending_is_dropped() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let first = answer_first_question(&mut c, t0);

        c.handle(final_text("and another thing"), t0 + ms(2100));
        let commands = c.handle(Event::Tick, t0 + ms(4000));

        assert!(submissions(&commands).is_empty());
        assert_eq!(c.state(), TurnState::Submitting);

        c.handle(
            Event::SubmissionCompleted {
                id: first.id,
                result: reply("Next?"),
            },
            t0 + ms(4100),
        );
        assert_eq!(c.session().turns().len(), 3);
    }

    #[test]
    fn test_last_answer_finishes_interview() {
        let mut c = controller(&["Q1", "Q2"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Q2 from the interviewer"),
            },
            t0,
        );
        let utterance = c.playback().current_utterance_id.unwrap();
        c.handle(Event::Playback(PlaybackEvent::Ended(utterance)), t0 + ms(100));

        c.handle(final_text("Because I love the product"), t0 + ms(200));
        let commands = c.handle(Event::Tick, t0 + ms(2000));

        assert!(submissions(&commands).is_empty());
        assert_eq!(c.state(), TurnState::Finished);
        assert!(c.session().is_complete());
        assert_eq!(c.session().turns().len(), 4);
        assert!(matches!(commands.last(), Some(Command::SessionComplete(_))));

        let spoken_before = c.voice().spoken.len();
        c.handle(final_text("Hello?"), t0 + ms(3000));
        let commands = c.handle(Event::Tick, t0 + ms(6000));
        assert!(commands.is_empty());
        assert_eq!(c.voice().spoken.len(), spoken_before);
        assert_eq!(c.session().turns().len(), 4);
        assert!(c.silence_deadline().is_none());
    }

    #[test]
    fn test_pause_and_resume_keep_history() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Next?"),
            },
            t0,
        );
        let history = c.session().clone();

        c.handle(Event::Pause, t0 + ms(10));
        assert_eq!(c.state(), TurnState::Paused);
        assert!(!c.recognition().is_listening);
        assert!(!c.playback().is_speaking);

        c.handle(Event::Resume, t0 + ms(20));
        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
        assert_eq!(c.session(), &history);
    }

    #[test]
    fn test_pause_cancels_pending_silence_timer() {
        let mut c = controller(&["Q1", "Q2"]);
        let t0 = Instant::now();
        c.handle(Event::Start, t0);
        c.handle(final_text("half an answer"), t0);

        c.handle(Event::TogglePause, t0 + ms(100));
        assert!(c.silence_deadline().is_none());
        c.handle(Event::TogglePause, t0 + ms(200));

        assert!(submissions(&c.handle(Event::Tick, t0 + ms(5000))).is_empty());
        assert_eq!(c.state(), TurnState::Listening);
    }

    #[test]
    fn test_finals_while_paused_are_ignored() {
        let mut c = controller(&["Q1", "Q2"]);
        let t0 = Instant::now();
        c.handle(Event::Start, t0);
        c.handle(Event::Pause, t0);

        c.handle(final_text("talking to myself"), t0);

        assert!(c.silence_deadline().is_none());
    }

    #[test]
    fn test_submission_failure_keeps_state_and_allows_retry() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);

        let commands = c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: Err(ServiceError::Network("timed out".into())),
            },
            t0,
        );

        assert!(matches!(
            &commands[..],
            [Command::Notify(Notice::SubmissionFailed { retryable: true, .. })]
        ));
        assert_eq!(c.state(), TurnState::Listening);
        assert_eq!(c.session().turns().len(), 1);

        let retried = submissions(&c.handle(Event::RetrySubmission, t0));
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].answer, sub.answer);
        assert_ne!(retried[0].id, sub.id);
    }

    #[test]
    fn test_remote_errors_are_not_retried() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: Err(ServiceError::Remote {
                    status: 500,
                    message: "Failed to process answer".into(),
                }),
            },
            t0,
        );

        assert!(submissions(&c.handle(Event::RetrySubmission, t0)).is_empty());
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);

        c.handle(
            Event::SubmissionCompleted {
                id: sub.id + 100,
                result: reply("Bogus"),
            },
            t0,
        );

        assert_eq!(c.state(), TurnState::Submitting);
        assert_eq!(c.session().turns().len(), 1);
    }

    #[test]
    fn test_end_during_submission_discards_reply() {
        let mut c = controller(&["Q1", "Q2", "Q3"]);
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);

        let commands = c.handle(Event::End, t0);
        assert!(matches!(&commands[..], [Command::SessionComplete(_)]));
        c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Too late"),
            },
            t0,
        );

        assert_eq!(c.state(), TurnState::Finished);
        assert_eq!(c.session().turns().len(), 1);
        assert!(c.voice().spoken.is_empty());
        assert!(!c.recognizer().running);
    }

    #[test]
    fn test_repeated_capture_failures_degrade_session() {
        let mut c = controller(&["Q1", "Q2"]);
        let t0 = Instant::now();
        c.handle(Event::Start, t0);

        let first = c.handle(
            Event::Recognition(RecognitionEvent::Error(RecognitionErrorKind::AudioCapture)),
            t0,
        );
        assert!(!c.is_degraded());
        assert!(matches!(&first[..], [Command::Notify(Notice::RecognitionError(_))]));

        let second = c.handle(
            Event::Recognition(RecognitionEvent::Error(RecognitionErrorKind::NotAllowed)),
            t0,
        );
        assert!(c.is_degraded());
        assert!(matches!(&second[..], [Command::Notify(Notice::SessionDegraded(_))]));
        assert!(!c.recognition().is_listening);

        // No restart after the engine ends, even on resume.
        let starts = c.recognizer().starts;
        c.handle(Event::Recognition(RecognitionEvent::Ended), t0);
        c.handle(Event::Pause, t0);
        c.handle(Event::Resume, t0);
        assert_eq!(c.recognizer().starts, starts);

        // The transcript is still retrievable by ending the interview.
        let commands = c.handle(Event::End, t0);
        assert!(matches!(&commands[..], [Command::SessionComplete(s)] if s.turns().len() == 1));
    }

    #[test]
    fn test_unsupported_recognition_degrades_immediately() {
        let plan = InterviewPlan::new(vec!["Q1".into()]).unwrap();
        let mut c = TurnController::new(
            ControllerConfig::default(),
            plan,
            FakeRecognizer::unsupported(),
            FakeVoice::default(),
        );

        let commands = c.handle(Event::Start, Instant::now());

        assert!(c.is_degraded());
        assert!(
            commands
                .iter()
                .any(|c| matches!(c, Command::Notify(Notice::SessionDegraded(_))))
        );
    }

    #[test]
    fn test_not_allowed_speech_falls_back_to_listening() {
        let plan = InterviewPlan::new(vec!["Q1".into(), "Q2".into(), "Q3".into()]).unwrap();
        let mut c = TurnController::new(
            ControllerConfig::default(),
            plan,
            FakeRecognizer::default(),
            FakeVoice {
                require_gesture: true,
                ..FakeVoice::default()
            },
        );
        let t0 = Instant::now();
        let sub = answer_first_question(&mut c, t0);

        let commands = c.handle(
            Event::SubmissionCompleted {
                id: sub.id,
                result: reply("Next?"),
            },
            t0,
        );

        assert!(commands.contains(&Command::Notify(Notice::AutoSpeechDisabled)));
        assert_eq!(c.state(), TurnState::Listening);
        assert!(c.recognition().is_listening);
    }

    #[test]
    fn test_listening_and_speaking_never_overlap() {
        let mut c = controller(&["Q1", "Q2", "Q3", "Q4"]);
        let mut now = Instant::now();
        let step = |c: &mut Controller, event: Event, now: Instant| {
            let commands = c.handle(event, now);
            assert!(
                !(c.recognition().is_listening && c.playback().is_speaking),
                "overlap after {:?}",
                c.state()
            );
            commands
        };

        step(&mut c, Event::Start, now);
        for round in 0..3 {
            step(&mut c, final_text("an answer"), now);
            now += ms(2000);
            let commands = step(&mut c, Event::Tick, now);
            let Some(sub) = submissions(&commands).pop() else {
                break;
            };
            step(&mut c, Event::Recognition(RecognitionEvent::Ended), now);
            step(
                &mut c,
                Event::SubmissionCompleted {
                    id: sub.id,
                    result: reply("Next?"),
                },
                now,
            );
            step(&mut c, Event::Recognition(RecognitionEvent::Partial("uh".into())), now);
            if round == 1 {
                step(&mut c, Event::Pause, now);
                step(&mut c, Event::Resume, now);
            } else if let Some(id) = c.playback().current_utterance_id {
                step(&mut c, Event::Playback(PlaybackEvent::Started(id)), now);
                step(&mut c, Event::Playback(PlaybackEvent::Ended(id)), now);
            }
        }
        step(&mut c, Event::End, now);
        assert_eq!(c.state(), TurnState::Finished);
    }
}
