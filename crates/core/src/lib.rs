//! Core library for turning subtitle tracks into a single narrated audio file.
//!
//! Every cue is voiced by a [`ClipSynthesizer`], trimmed of trailing silence,
//! faded at both edges and then placed on a [`Timeline`] by the Auto-Flow
//! scheduler, which keeps clips on their subtitle times where it can and
//! pushes them later where it must so that no two clips ever overlap. The
//! [`Mixer`] renders the timeline into one buffer and the [`Recorder`] writes
//! it out as WAV.

pub mod config;
pub mod cue;
pub mod engine;
pub mod error;
pub mod fade;
pub mod mixer;
pub mod record;
pub mod subtitle;
pub mod synth;
pub mod timeline;
pub mod trim;

pub use config::{AppConfig, EngineConfig, FailurePolicy, SynthesisConfig};
pub use cue::Cue;
pub use engine::{Assembly, RenderReport, TimelineEngine};
pub use error::{Result, SpeechError};
pub use fade::Fader;
pub use mixer::Mixer;
pub use record::{Recorder, RecordingSettings, WavEncoding};
pub use synth::{AudioBuffer, ClipSynthesizer, HttpSynthesizer, SynthesisRequest};
pub use timeline::{AutoFlow, ScheduledClip, SynthesizedClip, Timeline};
pub use trim::SilenceTrimmer;
