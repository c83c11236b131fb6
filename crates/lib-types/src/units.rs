//! Time and rate units.
//!
//! Newtypes keep sample rates and durations from being mixed up with
//! plain sample counts at the FFI boundary.

use serde::{Deserialize, Serialize};

/// Time duration in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Self = Self(0.0);

    /// Number of samples this duration spans at `rate`, rounded up.
    ///
    /// Negative or non-finite durations yield zero.
    #[inline]
    pub fn samples_at(&self, rate: Hertz) -> usize {
        let n = (self.0 * rate.0).ceil();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }
}

/// Sample rate in Hertz.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Hertz(pub f64);

impl Hertz {
    pub const ZERO: Self = Self(0.0);

    /// Duration covered by `samples` samples at this rate.
    ///
    /// A zero rate yields [`Seconds::ZERO`] instead of infinity.
    #[inline]
    pub fn duration_of(&self, samples: usize) -> Seconds {
        if self.0 > 0.0 {
            Seconds(samples as f64 / self.0)
        } else {
            Seconds::ZERO
        }
    }

    /// Rate as an integer, as WAV headers store it.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0.round().max(0.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_at_rounds_up() {
        let rate = Hertz(22_050.0);
        assert_eq!(Seconds(2.0).samples_at(rate), 44_100);
        assert_eq!(Seconds(1.0 / 22_050.0 * 1.5).samples_at(rate), 2);
        assert_eq!(Seconds(-1.0).samples_at(rate), 0);
        assert_eq!(Seconds(f64::NAN).samples_at(rate), 0);
    }

    #[test]
    fn test_duration_of_round_trips_sample_count() {
        let rate = Hertz(44_100.0);
        let d = rate.duration_of(44_100);
        assert!((d.0 - 1.0).abs() < 1e-12);
        assert_eq!(Hertz::ZERO.duration_of(100), Seconds::ZERO);
    }

    #[test]
    fn test_integer_rate() {
        assert_eq!(Hertz(44_100.0).as_u32(), 44_100);
        assert_eq!(Hertz(22_049.6).as_u32(), 22_050);
        assert_eq!(Hertz(-1.0).as_u32(), 0);
    }
}
