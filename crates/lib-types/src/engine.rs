//! Engine lifecycle and query types.
//!
//! These types describe the native synthesis engine from the outside:
//! how it is configured, which state the single process-wide instance is
//! in, and what it reports about a gestural score without synthesizing it.

use crate::units::{Hertz, Seconds};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of the native engine.
///
/// The only valid transitions are `Uninitialized -> Initialized` on a
/// successful init call and `Initialized -> Closed` on close. `Closed` is
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Engine loaded but `vtlInitialize` not called (or it failed).
    Uninitialized,
    /// `vtlInitialize` completed successfully.
    Initialized,
    /// `vtlClose` has been called.
    Closed,
}

impl EngineState {
    /// Whether native synthesis and query calls are permitted.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Initialized)
    }
}

/// Bit depth for PCM WAV output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WavBitDepth {
    #[default]
    #[serde(rename = "16")]
    Pcm16,
    #[serde(rename = "24")]
    Pcm24,
    #[serde(rename = "32")]
    Pcm32,
}

impl WavBitDepth {
    /// Bits per sample as stored in the WAV header.
    pub fn bits(&self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Pcm24 => 24,
            Self::Pcm32 => 32,
        }
    }
}

/// Configuration handed to the engine at initialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the VocalTractLab API shared library.
    pub library: PathBuf,

    /// Speaker file (`.speaker`) describing the vocal tract anatomy.
    pub speaker_file: PathBuf,

    /// Initialize on the first pipeline call instead of requiring an
    /// explicit `initialize()`.
    #[serde(default = "default_true")]
    pub auto_initialize: bool,

    /// Bit depth used when persisting synthesized audio.
    #[serde(default)]
    pub wav_bits: WavBitDepth,
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Create a config with default options.
    pub fn new(library: impl Into<PathBuf>, speaker_file: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            speaker_file: speaker_file.into(),
            auto_initialize: true,
            wav_bits: WavBitDepth::default(),
        }
    }

    /// Whether two configs would initialize the native engine identically.
    ///
    /// Only the speaker file reaches `vtlInitialize`; the remaining fields
    /// are binding-side options.
    pub fn same_native_setup(&self, other: &Self) -> bool {
        self.speaker_file == other.speaker_file
    }
}

/// Fixed engine parameters reported by `vtlGetConstants`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConstants {
    /// Audio output sample rate.
    pub audio_sample_rate: Hertz,

    /// Number of tube sections in the vocal tract model.
    pub n_tube_sections: usize,

    /// Number of vocal tract parameters per frame.
    pub n_vocal_tract_params: usize,

    /// Number of glottis parameters per frame.
    pub n_glottis_params: usize,

    /// Audio samples generated per tract-state frame.
    pub n_audio_samples_per_tract_state: usize,

    /// Sample rate of the internal acoustic simulation.
    pub internal_sample_rate: Hertz,
}

/// Duration estimate for a gestural score, computed without synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationInfo {
    /// Audio samples the score will produce.
    pub n_audio_samples: usize,

    /// Tract-state frames the score will produce.
    pub n_gesture_samples: usize,

    /// Duration of the synthesized audio.
    pub duration: Seconds,
}

impl DurationInfo {
    /// Build from native sample counts, deriving the duration from the
    /// audio sample rate.
    pub fn from_counts(n_audio_samples: usize, n_gesture_samples: usize, rate: Hertz) -> Self {
        Self {
            n_audio_samples,
            n_gesture_samples,
            duration: rate.duration_of(n_audio_samples),
        }
    }
}
