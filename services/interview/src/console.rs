//! Terminal stand-ins for the microphone and the speaker.
//!
//! Typed lines play the role of final transcripts and printed text the role of
//! synthesized speech. Both engines report back through the runtime's event
//! channel exactly as a platform engine would.

use hireai_core::runtime::EventSender;
use hireai_core::speech_input::{RecognitionEngine, RecognitionEvent, SpeechInputError};
use hireai_core::speech_output::{PlaybackEvent, SynthesisEngine, SynthesisError, UtteranceId};
use hireai_core::turn_controller::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Simulated reading speed of the console voice.
const MS_PER_WORD: u64 = 120;
const MAX_UTTERANCE: Duration = Duration::from_secs(6);

pub struct ConsoleRecognizer {
    listening: Arc<AtomicBool>,
}

impl ConsoleRecognizer {
    pub fn new(listening: Arc<AtomicBool>) -> Self {
        Self { listening }
    }
}

impl RecognitionEngine for ConsoleRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(&mut self) -> Result<(), SpeechInputError> {
        self.listening.store(true, Ordering::SeqCst);
        tracing::debug!("Console input open");
        Ok(())
    }

    fn stop(&mut self) {
        self.listening.store(false, Ordering::SeqCst);
        tracing::debug!("Console input closed");
    }
}

pub struct ConsoleVoice {
    events: EventSender,
    playing: Option<JoinHandle<()>>,
}

impl ConsoleVoice {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            playing: None,
        }
    }
}

fn reading_time(text: &str) -> Duration {
    let words = text.split_whitespace().count() as u64;
    Duration::from_millis(words * MS_PER_WORD).min(MAX_UTTERANCE)
}

impl SynthesisEngine for ConsoleVoice {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), SynthesisError> {
        self.cancel();
        println!("\nInterviewer: {text}");
        let events = self.events.clone();
        let duration = reading_time(text);
        self.playing = Some(tokio::spawn(async move {
            if events.send(Event::Playback(PlaybackEvent::Started(id))).await.is_err() {
                tracing::debug!("Runtime gone before utterance #{} started", id);
                return;
            }
            tokio::time::sleep(duration).await;
            if events.send(Event::Playback(PlaybackEvent::Ended(id))).await.is_err() {
                tracing::debug!("Runtime gone before utterance #{} ended", id);
            }
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.playing.take() {
            handle.abort();
        }
    }
}

/// Maps one typed line to an interview event.
///
/// Slash commands drive the session; anything else is a spoken answer.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Event::Recognition(RecognitionEvent::Final(line.to_string())));
    };
    match command.trim() {
        "pause" => Some(Event::Pause),
        "resume" => Some(Event::Resume),
        "toggle" => Some(Event::TogglePause),
        "retry" => Some(Event::RetrySubmission),
        "speech" => Some(Event::EnableAutoSpeech),
        "end" | "quit" => Some(Event::End),
        other => {
            println!("Unknown command /{other}. Try /pause, /resume, /retry, /speech or /end.");
            None
        }
    }
}
