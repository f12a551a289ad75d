use std::path::PathBuf;

/// Result alias that carries the custom [`SpeechError`] type.
pub type Result<T> = std::result::Result<T, SpeechError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// The cue list handed to the engine was empty.
    #[error("no cues to synthesize")]
    EmptyInput,
    /// A cue failed numeric or text validation before any synthesis started.
    #[error("cue #{index} is malformed: {reason}")]
    MalformedCue { index: usize, reason: String },
    /// The synthesizer failed or returned unusable audio for a cue.
    #[error("synthesis failed for cue #{index} ({text:?}): {reason}")]
    Synthesis {
        index: usize,
        text: String,
        reason: String,
    },
    /// The mixed timeline contained no samples.
    #[error("mixed output is empty")]
    EmptyOutput,
    /// The final WAV could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    /// Bytes returned by a synthesizer were not a readable WAV stream.
    #[error("invalid audio payload: {0}")]
    Decode(String),
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form error for situations that do not deserve a dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl SpeechError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedCue {
            index,
            reason: reason.into(),
        }
    }
}

impl From<&str> for SpeechError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SpeechError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
