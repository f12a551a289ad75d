use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Result, SpeechError};

/// One subtitle entry: a nominal time window (seconds) and the text spoken in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Length of the nominal window.
    pub fn slot(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Text with subtitle markup (`<i>`, `<font color=..>`) stripped.
    pub fn spoken_text(&self) -> String {
        markup_pattern()
            .replace_all(&self.text, "")
            .trim()
            .to_string()
    }

    /// Checks the numeric sanity of the window and that something is left to say.
    pub fn validate(&self) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(SpeechError::malformed(self.index, "non-finite timestamp"));
        }
        if self.start < 0.0 || self.end < 0.0 {
            return Err(SpeechError::malformed(self.index, "negative timestamp"));
        }
        if self.start > self.end {
            return Err(SpeechError::malformed(
                self.index,
                format!("start {:.3}s is after end {:.3}s", self.start, self.end),
            ));
        }
        if self.spoken_text().is_empty() {
            return Err(SpeechError::malformed(self.index, "no speakable text"));
        }
        Ok(())
    }
}

/// Validates a whole cue list. Runs before any synthesis work.
pub fn validate_cues(cues: &[Cue]) -> Result<()> {
    if cues.is_empty() {
        return Err(SpeechError::EmptyInput);
    }
    cues.iter().try_for_each(Cue::validate)
}

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("markup pattern is valid"))
}
