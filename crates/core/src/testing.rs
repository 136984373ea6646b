//! In-memory engines used by the unit tests in this crate.

use crate::speech_input::{RecognitionEngine, SpeechInputError};
use crate::speech_output::{SynthesisEngine, SynthesisError, UtteranceId};

#[derive(Debug)]
pub struct FakeRecognizer {
    pub supported: bool,
    pub deny_permission: bool,
    pub running: bool,
    pub starts: usize,
    pub stops: usize,
}

impl Default for FakeRecognizer {
    fn default() -> Self {
        Self {
            supported: true,
            deny_permission: false,
            running: false,
            starts: 0,
            stops: 0,
        }
    }
}

impl FakeRecognizer {
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::default()
        }
    }
}

impl RecognitionEngine for FakeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self) -> Result<(), SpeechInputError> {
        if self.deny_permission {
            return Err(SpeechInputError::Start("microphone permission denied".into()));
        }
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.stops += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeVoice {
    pub require_gesture: bool,
    pub spoken: Vec<(UtteranceId, String)>,
    pub cancels: usize,
}

impl SynthesisEngine for FakeVoice {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<(), SynthesisError> {
        if self.require_gesture {
            return Err(SynthesisError::NotAllowed);
        }
        self.spoken.push((id, text.to_string()));
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}
