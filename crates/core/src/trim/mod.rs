use serde::{Deserialize, Serialize};

use crate::synth::AudioBuffer;

/// Removes trailing near-silence from synthesized clips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceTrimmer {
    /// Absolute amplitude below which a sample counts as silent.
    pub threshold: f32,
    /// Milliseconds of the silent tail to keep after the last audible sample.
    pub tail_margin_ms: u32,
}

impl Default for SilenceTrimmer {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            tail_margin_ms: 0,
        }
    }
}

impl SilenceTrimmer {
    pub fn new(threshold: f32, tail_margin_ms: u32) -> Self {
        Self {
            threshold,
            tail_margin_ms,
        }
    }

    /// Length the buffer should be cut to. A fully silent buffer maps to zero.
    pub fn trimmed_len(&self, samples: &[f32], sample_rate: u32) -> usize {
        let audible_end = samples
            .iter()
            .rposition(|sample| sample.abs() >= self.threshold)
            .map_or(0, |last| last + 1);

        if audible_end == 0 {
            return 0;
        }

        let margin = (u64::from(self.tail_margin_ms) * u64::from(sample_rate) / 1000) as usize;
        audible_end.saturating_add(margin).min(samples.len())
    }

    /// Truncates the buffer in place and returns how many samples were removed.
    pub fn trim(&self, buffer: &mut AudioBuffer) -> usize {
        let before = buffer.samples.len();
        let keep = self.trimmed_len(&buffer.samples, buffer.sample_rate);
        buffer.samples.truncate(keep);
        before - keep
    }
}
