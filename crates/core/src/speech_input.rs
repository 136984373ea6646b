//! Continuous speech recognition behind a platform-agnostic engine trait.
//!
//! The adapter keeps the [`RecognitionState`] in sync with engine events and
//! restarts the engine when it ends on its own while the interview still wants
//! to listen (continuous dictation engines routinely time out after a few
//! seconds of silence).

use thiserror::Error;
use tokio::time::Instant;

/// Error kinds a recognition engine reports while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
}

impl RecognitionErrorKind {
    /// Maps the engine's wire codes (`no-speech`, `audio-capture`, ...).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "no-speech" => Some(Self::NoSpeech),
            "audio-capture" => Some(Self::AudioCapture),
            "not-allowed" => Some(Self::NotAllowed),
            "network" => Some(Self::Network),
            _ => None,
        }
    }

    /// Errors meaning the microphone itself is unusable.
    pub fn is_capture_failure(self) -> bool {
        matches!(self, Self::AudioCapture | Self::NotAllowed)
    }
}

#[derive(Debug, Error)]
pub enum SpeechInputError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,
    #[error("failed to start speech recognition: {0}")]
    Start(String),
}

/// Raw events delivered by a recognition engine, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    SpeechStarted,
    Partial(String),
    Final(String),
    Error(RecognitionErrorKind),
    Ended,
}

/// A platform speech-to-text engine.
///
/// Implementations only start and stop capture; results are pushed back into
/// the interview runtime as [`RecognitionEvent`]s.
pub trait RecognitionEngine: Send {
    fn is_supported(&self) -> bool;
    fn start(&mut self) -> Result<(), SpeechInputError>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct RecognitionState {
    pub is_listening: bool,
    pub is_paused: bool,
    pub partial_text: String,
    pub last_final_text: String,
    pub last_speech_at: Option<Instant>,
}

/// What the adapter hands on to the turn controller.
#[derive(Debug)]
pub enum InputSignal {
    SpeechStarted,
    Partial(String),
    Final(String),
    Error(RecognitionErrorKind),
    Restarted,
    RestartFailed(SpeechInputError),
}

pub struct SpeechInputAdapter<E> {
    engine: E,
    state: RecognitionState,
    engine_running: bool,
    /// End-of-stream events still owed by engine sessions we stopped.
    stale_ends: u32,
}

impl<E: RecognitionEngine> SpeechInputAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: RecognitionState::default(),
            engine_running: false,
            stale_ends: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), SpeechInputError> {
        if !self.engine.is_supported() {
            return Err(SpeechInputError::Unsupported);
        }
        if self.engine_running {
            return Err(SpeechInputError::Start(
                "recognition is already running".to_string(),
            ));
        }
        self.engine.start()?;
        self.engine_running = true;
        self.state.is_listening = true;
        self.state.is_paused = false;
        self.state.partial_text.clear();
        tracing::debug!("Speech recognition started");
        Ok(())
    }

    /// Stops capture. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if self.engine_running {
            self.engine.stop();
            self.engine_running = false;
            self.stale_ends += 1;
            tracing::debug!("Speech recognition stopped");
        }
        self.state.is_listening = false;
        self.state.partial_text.clear();
    }

    pub fn pause(&mut self) {
        self.stop();
        self.state.is_paused = true;
    }

    pub fn resume(&mut self) -> Result<(), SpeechInputError> {
        self.state.is_paused = false;
        self.start()
    }

    pub fn handle(&mut self, event: RecognitionEvent, now: Instant) -> Option<InputSignal> {
        match event {
            RecognitionEvent::SpeechStarted => {
                self.state.last_speech_at = Some(now);
                Some(InputSignal::SpeechStarted)
            }
            RecognitionEvent::Partial(text) => {
                self.state.last_speech_at = Some(now);
                self.state.partial_text = text.clone();
                Some(InputSignal::Partial(text))
            }
            RecognitionEvent::Final(text) => {
                self.state.last_speech_at = Some(now);
                self.state.partial_text.clear();
                self.state.last_final_text = text.clone();
                Some(InputSignal::Final(text))
            }
            RecognitionEvent::Error(kind) => {
                tracing::warn!("Speech recognition error: {:?}", kind);
                Some(InputSignal::Error(kind))
            }
            RecognitionEvent::Ended => {
                if self.stale_ends > 0 {
                    // Belongs to a session stopped earlier, not the current one.
                    self.stale_ends -= 1;
                    tracing::debug!("Ignoring end-of-stream from a stopped recognition session");
                    return None;
                }
                self.engine_running = false;
                if !self.state.is_listening || self.state.is_paused {
                    return None;
                }
                // Unexpected end while we still want to listen.
                match self.engine.start() {
                    Ok(()) => {
                        self.engine_running = true;
                        tracing::debug!("Speech recognition restarted after end-of-stream");
                        Some(InputSignal::Restarted)
                    }
                    Err(e) => {
                        self.state.is_listening = false;
                        Some(InputSignal::RestartFailed(e))
                    }
                }
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening
    }

    pub fn state(&self) -> &RecognitionState {
        &self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRecognizer;

    #[test]
    fn test_start_fails_when_unsupported() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::unsupported());
        assert!(matches!(
            adapter.start(),
            Err(SpeechInputError::Unsupported)
        ));
        assert!(!adapter.is_listening());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        assert!(matches!(adapter.start(), Err(SpeechInputError::Start(_))));
        assert_eq!(adapter.engine().starts, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        adapter.stop();
        adapter.stop();
        assert_eq!(adapter.engine().stops, 1);
        assert!(!adapter.is_listening());
    }

    #[test]
    fn test_unexpected_end_restarts_engine() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();

        let signal = adapter.handle(RecognitionEvent::Ended, Instant::now());

        assert!(matches!(signal, Some(InputSignal::Restarted)));
        assert_eq!(adapter.engine().starts, 2);
        assert!(adapter.is_listening());
    }

    #[test]
    fn test_end_after_pause_does_not_restart() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        adapter.pause();

        let signal = adapter.handle(RecognitionEvent::Ended, Instant::now());

        assert!(signal.is_none());
        assert_eq!(adapter.engine().starts, 1);
        assert!(adapter.state().is_paused);
    }

    #[test]
    fn test_late_end_after_restart_is_ignored() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        adapter.stop();
        adapter.start().unwrap();

        let signal = adapter.handle(RecognitionEvent::Ended, Instant::now());

        assert!(signal.is_none());
        assert_eq!(adapter.engine().starts, 2);
        assert!(adapter.engine().running);
        assert!(adapter.is_listening());

        // The next end belongs to the live session and restarts it.
        let signal = adapter.handle(RecognitionEvent::Ended, Instant::now());
        assert!(matches!(signal, Some(InputSignal::Restarted)));
        assert_eq!(adapter.engine().starts, 3);
    }

    #[test]
    fn test_failed_restart_is_reported() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        adapter.engine.deny_permission = true;

        let signal = adapter.handle(RecognitionEvent::Ended, Instant::now());

        assert!(matches!(signal, Some(InputSignal::RestartFailed(_))));
        assert!(!adapter.is_listening());
    }

    #[test]
    fn test_final_clears_partial_text() {
        let mut adapter = SpeechInputAdapter::new(FakeRecognizer::default());
        adapter.start().unwrap();
        let now = Instant::now();
        adapter.handle(RecognitionEvent::Partial("I have".into()), now);
        assert_eq!(adapter.state().partial_text, "I have");

        adapter.handle(RecognitionEvent::Final("I have five years".into()), now);

        assert!(adapter.state().partial_text.is_empty());
        assert_eq!(adapter.state().last_final_text, "I have five years");
        assert_eq!(adapter.state().last_speech_at, Some(now));
    }

    #[test]
    fn test_error_codes_map_to_kinds() {
        assert_eq!(
            RecognitionErrorKind::from_code("not-allowed"),
            Some(RecognitionErrorKind::NotAllowed)
        );
        assert_eq!(RecognitionErrorKind::from_code("aborted"), None);
        assert!(RecognitionErrorKind::AudioCapture.is_capture_failure());
        assert!(!RecognitionErrorKind::Network.is_capture_failure());
    }
}
