//! Speech playback (local text-to-speech or a rendered avatar video).

use thiserror::Error;

pub type UtteranceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisErrorKind {
    /// The engine refuses to play without a prior user gesture.
    NotAllowed,
    Unavailable,
    Interrupted,
    Other,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech synthesis is unavailable")]
    Unavailable,
    #[error("speech synthesis requires a user gesture")]
    NotAllowed,
    #[error("auto-speech is disabled until the user re-enables it")]
    AutoSpeechDisabled,
    #[error("synthesis engine failed: {0}")]
    Engine(String),
}

/// Events a synthesis engine reports for an utterance it was asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(UtteranceId),
    Ended(UtteranceId),
    Error(UtteranceId, SynthesisErrorKind),
}

pub trait SynthesisEngine: Send {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), SynthesisError>;
    fn cancel(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub is_speaking: bool,
    pub current_utterance_id: Option<UtteranceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    Started,
    Finished,
    Failed(SynthesisErrorKind),
}

pub struct SpeechOutputAdapter<E> {
    engine: E,
    state: PlaybackState,
    next_id: UtteranceId,
    auto_speech: bool,
}

impl<E: SynthesisEngine> SpeechOutputAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: PlaybackState::default(),
            next_id: 1,
            auto_speech: true,
        }
    }

    /// Starts a new utterance, cancelling whatever is playing.
    pub fn speak(&mut self, text: &str) -> Result<UtteranceId, SynthesisError> {
        if !self.auto_speech {
            return Err(SynthesisError::AutoSpeechDisabled);
        }
        self.cancel();

        let id = self.next_id;
        self.next_id += 1;
        match self.engine.speak(id, text) {
            Ok(()) => {
                self.state.is_speaking = true;
                self.state.current_utterance_id = Some(id);
                tracing::debug!("Utterance {} started", id);
                Ok(id)
            }
            Err(SynthesisError::NotAllowed) => {
                self.auto_speech = false;
                Err(SynthesisError::NotAllowed)
            }
            Err(e) => Err(e),
        }
    }

    /// Stops playback. A no-op when idle.
    pub fn cancel(&mut self) {
        if self.state.current_utterance_id.is_some() {
            self.engine.cancel();
            tracing::debug!("Utterance {:?} cancelled", self.state.current_utterance_id);
        }
        self.state = PlaybackState::default();
    }

    /// Applies an engine event; events for utterances other than the current one are stale.
    pub fn handle(&mut self, event: PlaybackEvent) -> Option<PlaybackSignal> {
        let (id, signal) = match event {
            PlaybackEvent::Started(id) => (id, PlaybackSignal::Started),
            PlaybackEvent::Ended(id) => (id, PlaybackSignal::Finished),
            PlaybackEvent::Error(id, kind) => (id, PlaybackSignal::Failed(kind)),
        };
        if self.state.current_utterance_id != Some(id) {
            tracing::debug!("Ignoring stale playback event {:?}", event);
            return None;
        }
        match signal {
            PlaybackSignal::Started => {}
            PlaybackSignal::Finished => self.state = PlaybackState::default(),
            PlaybackSignal::Failed(kind) => {
                self.state = PlaybackState::default();
                if kind == SynthesisErrorKind::NotAllowed {
                    self.auto_speech = false;
                }
            }
        }
        Some(signal)
    }

    pub fn enable_auto_speech(&mut self) {
        self.auto_speech = true;
    }

    pub fn auto_speech_enabled(&self) -> bool {
        self.auto_speech
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
