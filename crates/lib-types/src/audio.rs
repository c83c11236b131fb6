//! Finalized audio returned from synthesis.

use crate::units::{Hertz, Seconds};
use serde::{Deserialize, Serialize};

/// Mono audio produced by the engine.
///
/// Unlike the marshalling buffer it is copied out of, this holds exactly
/// the samples the engine reported as valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Audio {
    /// Sample values, nominally in `[-1, 1]`.
    pub samples: Vec<f64>,

    /// Sample rate of `samples`.
    pub sample_rate: Hertz,
}

impl Audio {
    pub fn new(samples: Vec<f64>, sample_rate: Hertz) -> Self {
        Self { samples, sample_rate }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration.
    #[inline]
    pub fn duration(&self) -> Seconds {
        self.sample_rate.duration_of(self.samples.len())
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0f64, |m, &s| m.max(s.abs()))
    }

    /// Root-mean-square level.
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }
}
