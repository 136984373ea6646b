use std::time::Duration;
use tokio::time::Instant;

/// Default quiet period before a spoken answer is considered finished.
pub const DEFAULT_SILENCE_MS: u64 = 1500;

/// Turns a stream of final transcripts into a single "answer ready" signal.
///
/// Every final pushes the deadline out by the silence window; when the
/// deadline passes, the finals collected since the last emission are joined
/// and handed out once. The runtime sleeps until [`SilenceDebouncer::deadline`]
/// and then calls [`SilenceDebouncer::poll`].
#[derive(Debug)]
pub struct SilenceDebouncer {
    silence: Duration,
    pending: Vec<String>,
    deadline: Option<Instant>,
}

impl SilenceDebouncer {
    pub fn new(silence: Duration) -> Self {
        Self {
            silence,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn on_final(&mut self, text: &str, now: Instant) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.pending.push(text.to_string());
        self.deadline = Some(now + self.silence);
    }

    /// Returns the accumulated answer once the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let answer = self.pending.join(" ");
                self.pending.clear();
                if answer.trim().is_empty() {
                    None
                } else {
                    Some(answer)
                }
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        if self.deadline.is_some() {
            tracing::debug!("Silence timer cancelled with {} pending finals", self.pending.len());
        }
        self.deadline = None;
        self.pending.clear();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn silence(&self) -> Duration {
        self.silence
    }
}

impl Default for SilenceDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SILENCE_MS))
    }
}
