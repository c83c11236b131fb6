//! Host-side buffers handed to the native engine.
//!
//! `vtlGesturalScoreToAudio` writes into a caller-supplied `double*`
//! without being told its size. An [`AudioBuffer`] is sized from the
//! duration estimate plus [`SAFETY_MARGIN`], followed by [`GUARD_LEN`]
//! sentinel slots the engine is never told about. After the call the
//! buffer is finalized against the reported sample count; a count above
//! capacity or a disturbed sentinel is a [`VtlError::BufferOverflow`].

use crate::error::{VtlError, VtlResult};
use crate::status::Operation;
use lib_types::audio::Audio;
use lib_types::units::{Hertz, Seconds};
use std::ffi::c_int;

/// Extra samples allocated beyond the estimate to absorb native rounding.
///
/// Larger than one tract-state frame at any supported rate.
pub const SAFETY_MARGIN: usize = 512;

/// Sentinel slots appended after the usable capacity.
pub const GUARD_LEN: usize = 8;

/// Recognizable bit pattern for unwritten guard slots.
const SENTINEL: f64 = f64::from_bits(0xDEAD_BEEF_DEAD_BEEF);

/// Pre-sized sample buffer for one native synthesis call.
#[derive(Debug)]
pub struct AudioBuffer {
    /// `capacity` zeroed samples followed by `GUARD_LEN` sentinels.
    data: Vec<f64>,
    capacity: usize,
    sample_rate: Hertz,
}

impl AudioBuffer {
    /// Allocate for audio lasting roughly `duration` at `sample_rate`.
    ///
    /// Capacity is `ceil(duration * sample_rate) + SAFETY_MARGIN`.
    pub fn allocate_for(duration: Seconds, sample_rate: Hertz) -> VtlResult<Self> {
        if !(sample_rate.0.is_finite() && sample_rate.0 > 0.0) {
            return Err(VtlError::InvalidParameter {
                name: "sample_rate".to_string(),
                reason: format!("must be positive, got {}", sample_rate.0),
            });
        }
        if duration.0.is_nan() || duration.0 < 0.0 {
            return Err(VtlError::InvalidParameter {
                name: "duration".to_string(),
                reason: format!("must be non-negative, got {}", duration.0),
            });
        }

        let estimate = duration.samples_at(sample_rate);
        let capacity = estimate
            .checked_add(SAFETY_MARGIN)
            .ok_or(VtlError::AllocationFailed { samples: estimate })?;
        Self::with_capacity(capacity, sample_rate)
    }

    /// Allocate exactly `capacity` usable samples.
    pub fn with_capacity(capacity: usize, sample_rate: Hertz) -> VtlResult<Self> {
        // The native side counts samples in a C int.
        if c_int::try_from(capacity).is_err() {
            return Err(VtlError::InvalidParameter {
                name: "capacity".to_string(),
                reason: format!("{capacity} samples exceed the native sample counter"),
            });
        }

        let total = capacity + GUARD_LEN;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| VtlError::AllocationFailed { samples: total })?;
        data.resize(capacity, 0.0);
        data.resize(total, SENTINEL);

        Ok(Self {
            data,
            capacity,
            sample_rate,
        })
    }

    /// Usable samples the engine may write.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    /// The full region to pass across the FFI boundary, guard included.
    pub fn native_region(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// First guard slot that no longer holds the sentinel.
    fn disturbed_guard(&self) -> Option<usize> {
        self.data[self.capacity..]
            .iter()
            .position(|v| v.to_bits() != SENTINEL.to_bits())
            .map(|i| self.capacity + i)
    }

    /// Restrict the buffer to the `reported` samples the engine produced.
    ///
    /// The returned [`Audio`] exposes exactly `[0, reported)`.
    pub fn finalize(mut self, operation: Operation, reported: c_int) -> VtlResult<Audio> {
        let reported = usize::try_from(reported).map_err(|_| {
            VtlError::invalid_output(operation, format!("negative sample count {reported}"))
        })?;

        let guard_index = self.disturbed_guard();
        if reported > self.capacity || guard_index.is_some() {
            tracing::error!(
                operation = operation.as_str(),
                capacity = self.capacity,
                reported,
                guard_index,
                "Buffer overflow detected! Engine wrote beyond the allocated buffer."
            );
            return Err(VtlError::BufferOverflow {
                operation,
                capacity: self.capacity,
                reported,
                guard_index,
            });
        }

        self.data.truncate(reported);
        Ok(Audio::new(self.data, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_seconds_at_22k() {
        let buf = AudioBuffer::allocate_for(Seconds(2.0), Hertz(22_050.0)).unwrap();
        assert_eq!(buf.capacity(), 44_100 + SAFETY_MARGIN);
    }

    #[test]
    fn test_region_is_zeroed_with_guard() {
        let mut buf = AudioBuffer::with_capacity(4, Hertz(8_000.0)).unwrap();
        let region = buf.native_region();
        assert_eq!(region.len(), 4 + GUARD_LEN);
        assert!(region[..4].iter().all(|&v| v == 0.0));
        assert!(region[4..].iter().all(|v| v.to_bits() == SENTINEL.to_bits()));
    }

    #[test]
    fn test_finalize_truncates_to_reported() {
        let mut buf = AudioBuffer::with_capacity(10, Hertz(8_000.0)).unwrap();
        for (i, v) in buf.native_region()[..6].iter_mut().enumerate() {
            *v = i as f64 * 0.1;
        }
        let audio = buf.finalize(Operation::GestureToAudio, 6).unwrap();
        assert_eq!(audio.len(), 6);
        assert!((audio.samples[5] - 0.5).abs() < 1e-12);
        assert_eq!(audio.sample_rate, Hertz(8_000.0));
    }

    #[test]
    fn test_finalize_at_exact_capacity() {
        let buf = AudioBuffer::with_capacity(10, Hertz(8_000.0)).unwrap();
        assert_eq!(buf.finalize(Operation::GestureToAudio, 10).unwrap().len(), 10);
    }

    #[test]
    fn test_reported_length_above_capacity_overflows() {
        let buf = AudioBuffer::with_capacity(10, Hertz(8_000.0)).unwrap();
        let err = buf.finalize(Operation::GestureToAudio, 11).unwrap_err();
        assert!(matches!(
            err,
            VtlError::BufferOverflow { capacity: 10, reported: 11, guard_index: None, .. }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_guard_write_overflows_even_with_plausible_length() {
        let mut buf = AudioBuffer::with_capacity(10, Hertz(8_000.0)).unwrap();
        buf.native_region()[12] = 0.25;
        let err = buf.finalize(Operation::GestureToAudio, 10).unwrap_err();
        assert!(matches!(err, VtlError::BufferOverflow { guard_index: Some(12), .. }));
    }

    #[test]
    fn test_negative_length_is_invalid_output() {
        let buf = AudioBuffer::with_capacity(10, Hertz(8_000.0)).unwrap();
        let err = buf.finalize(Operation::GestureToAudio, -1).unwrap_err();
        assert!(matches!(err, VtlError::InvalidOutput { .. }));
    }

    #[test]
    fn test_rejects_bad_rate_and_duration() {
        assert!(AudioBuffer::allocate_for(Seconds(1.0), Hertz::ZERO).is_err());
        assert!(AudioBuffer::allocate_for(Seconds(-0.5), Hertz(44_100.0)).is_err());
        assert!(AudioBuffer::allocate_for(Seconds(f64::NAN), Hertz(44_100.0)).is_err());
    }

    #[test]
    fn test_capacity_beyond_c_int_rejected() {
        let err = AudioBuffer::with_capacity(c_int::MAX as usize + 1, Hertz(44_100.0)).unwrap_err();
        assert!(matches!(err, VtlError::InvalidParameter { .. }));
    }

    proptest! {
        #[test]
        fn prop_capacity_covers_estimate(secs in 0.0f64..30.0, rate in 8_000.0f64..96_000.0) {
            let buf = AudioBuffer::allocate_for(Seconds(secs), Hertz(rate)).unwrap();
            let needed = (secs * rate).ceil() as usize;
            prop_assert_eq!(buf.capacity(), needed + SAFETY_MARGIN);
        }

        #[test]
        fn prop_finalize_never_exceeds_capacity(capacity in 0usize..2_048, reported in 0i32..4_096) {
            let buf = AudioBuffer::with_capacity(capacity, Hertz(44_100.0)).unwrap();
            match buf.finalize(Operation::GestureToAudio, reported) {
                Ok(audio) => prop_assert!(audio.len() <= capacity),
                Err(e) => {
                    prop_assert!(e.is_fatal());
                    prop_assert!(reported as usize > capacity);
                }
            }
        }
    }
}
