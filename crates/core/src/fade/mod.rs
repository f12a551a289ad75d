use serde::{Deserialize, Serialize};

use crate::synth::AudioBuffer;

/// Linear fade-in / fade-out applied to clip edges to avoid clicks.
///
/// Applying the fader twice fades the clip twice; the engine runs it exactly
/// once per clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fader {
    pub duration_ms: u32,
}

impl Default for Fader {
    fn default() -> Self {
        Self { duration_ms: 50 }
    }
}

impl Fader {
    pub fn new(duration_ms: u32) -> Self {
        Self { duration_ms }
    }

    /// Ramp length in samples at the given rate, rounded to the nearest sample.
    pub fn fade_samples(&self, sample_rate: u32) -> usize {
        (f64::from(self.duration_ms) * f64::from(sample_rate) / 1000.0).round() as usize
    }

    /// Scales both edges of the buffer in place. The length never changes.
    ///
    /// Ramps run from exactly 0.0 at the outer sample to exactly 1.0 at the
    /// inner one. On clips shorter than two ramps the overlapping samples get
    /// the product of both gains.
    pub fn apply(&self, buffer: &mut AudioBuffer) {
        let ramp = self.fade_samples(buffer.sample_rate);
        let len = buffer.samples.len();
        if ramp <= 1 || len == 0 {
            return;
        }

        let span = (ramp - 1) as f32;
        for (i, sample) in buffer.samples.iter_mut().enumerate() {
            let fade_in = if i < ramp { i as f32 / span } else { 1.0 };
            let from_end = len - 1 - i;
            let fade_out = if from_end < ramp {
                from_end as f32 / span
            } else {
                1.0
            };
            *sample *= fade_in * fade_out;
        }
    }
}
