use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{record::RecordingSettings, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub synthesis: SynthesisConfig,
    pub recording: RecordingSettings,
}

impl AppConfig {
    /// Loads a configuration file. Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// What to do when a single cue cannot be synthesized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and report the failing cue.
    #[default]
    Abort,
    /// Replace the cue with silence spanning its nominal window.
    Silence,
}

/// Knobs of the timeline engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Required rate for every clip. `None` adopts the rate of the first clip.
    pub sample_rate: Option<u32>,
    pub fade_duration_ms: u32,
    /// Absolute amplitude below which trailing samples count as silence.
    pub silence_threshold: f32,
    pub tail_margin_ms: u32,
    /// Minimum silence inserted between consecutive clips.
    pub gap_ms: u32,
    /// Scale the mix down when its peak exceeds full scale.
    pub normalize: bool,
    pub on_failure: FailurePolicy,
    /// Number of concurrent synthesis calls.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            fade_duration_ms: 50,
            silence_threshold: 0.01,
            tail_margin_ms: 0,
            gap_ms: 0,
            normalize: true,
            on_failure: FailurePolicy::Abort,
            workers: 1,
        }
    }
}

impl EngineConfig {
    pub fn gap_seconds(&self) -> f64 {
        f64::from(self.gap_ms) / 1000.0
    }
}

/// Settings for the remote TTS service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub timeout_secs: u64,
    /// Free-text emotion hint forwarded to the service.
    pub emo_text: Option<String>,
    /// Explicit emotion vector; takes precedence over `emo_text`.
    pub emo_vector: Option<Vec<f32>>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            emo_text: None,
            emo_vector: None,
        }
    }
}
