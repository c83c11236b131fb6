//! The native call surface.
//!
//! [`NativeEngine`] mirrors the VocalTractLab C API one method per entry
//! point, returning raw status codes. Everything above it (status
//! translation, buffer sizing, lifecycle) is written against this trait,
//! so tests can swap the shared library for an in-process fake.

use crate::error::{VtlError, VtlResult};
use crate::loader::{VtlLibrary, VERSION_BUFFER_LEN};
use lib_types::engine::EngineConstants;
use lib_types::units::Hertz;
use std::ffi::{c_char, c_double, c_int, CStr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set while a [`DynamicEngine`] exists. The shared library keeps its
/// state in globals, so two engines would silently share it.
static NATIVE_ENGINE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Output slots of `vtlGetConstants`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawConstants {
    pub audio_sampling_rate: c_int,
    pub num_tube_sections: c_int,
    pub num_vocal_tract_params: c_int,
    pub num_glottis_params: c_int,
    pub num_audio_samples_per_tract_state: c_int,
    pub internal_sampling_rate: c_double,
}

impl RawConstants {
    /// Validate and convert. `None` if any value is non-positive.
    pub fn to_constants(&self) -> Option<EngineConstants> {
        let count = |v: c_int| usize::try_from(v).ok().filter(|&n| n > 0);

        if self.internal_sampling_rate.is_nan() || self.internal_sampling_rate <= 0.0 {
            return None;
        }

        Some(EngineConstants {
            audio_sample_rate: Hertz(count(self.audio_sampling_rate)? as f64),
            n_tube_sections: count(self.num_tube_sections)?,
            n_vocal_tract_params: count(self.num_vocal_tract_params)?,
            n_glottis_params: count(self.num_glottis_params)?,
            n_audio_samples_per_tract_state: count(self.num_audio_samples_per_tract_state)?,
            internal_sample_rate: Hertz(self.internal_sampling_rate),
        })
    }
}

/// One method per VocalTractLab entry point.
///
/// Implementations are stateful and non-reentrant; callers hold
/// exclusive access (`&mut self`) for the duration of each call.
pub trait NativeEngine: Send {
    /// `vtlInitialize`.
    fn initialize(&mut self, speaker_file: &CStr) -> c_int;

    /// `vtlClose`.
    fn close(&mut self) -> c_int;

    /// `vtlSegmentSequenceToGesturalScore`.
    fn segment_sequence_to_gestural_score(
        &mut self,
        segment_file: &CStr,
        gesture_file: &CStr,
        console_output: bool,
    ) -> c_int;

    /// `vtlGetGesturalScoreDuration`.
    fn gestural_score_duration(
        &mut self,
        gesture_file: &CStr,
        n_audio_samples: &mut c_int,
        n_gesture_samples: &mut c_int,
    ) -> c_int;

    /// `vtlGesturalScoreToTractSequence`.
    fn gestural_score_to_tract_sequence(&mut self, gesture_file: &CStr, tract_file: &CStr)
        -> c_int;

    /// `vtlGesturalScoreToAudio`.
    ///
    /// `audio` is the whole marshalled region, guard slots included; the
    /// engine writes from index 0 and stores the sample count in
    /// `n_samples`.
    fn gestural_score_to_audio(
        &mut self,
        gesture_file: &CStr,
        wav_file: &CStr,
        audio: &mut [f64],
        n_samples: &mut c_int,
        console_output: bool,
    ) -> c_int;

    /// `vtlGetConstants`.
    fn constants(&mut self, out: &mut RawConstants) -> c_int;

    /// `vtlGetVersion`.
    fn version(&mut self, out: &mut [u8; VERSION_BUFFER_LEN]);
}

/// Decode a NUL-terminated byte buffer, lossy on invalid UTF-8.
///
/// A buffer without NUL is taken whole.
pub fn decode_c_buffer(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim_end().to_string()
}

/// [`NativeEngine`] backed by the loaded shared library.
pub struct DynamicEngine {
    library: Arc<VtlLibrary>,
}

impl DynamicEngine {
    /// Claim the process-wide native state for `library`.
    ///
    /// Fails with [`VtlError::EngineClaimed`] while another
    /// `DynamicEngine` is alive.
    pub fn new(library: Arc<VtlLibrary>) -> VtlResult<Self> {
        if NATIVE_ENGINE_CLAIMED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VtlError::EngineClaimed);
        }
        Ok(Self { library })
    }

    /// Load the library at `path` and claim it.
    pub fn load<P: AsRef<Path>>(path: P) -> VtlResult<Self> {
        Self::new(VtlLibrary::load(path)?)
    }

    pub fn library(&self) -> &VtlLibrary {
        &self.library
    }
}

impl Drop for DynamicEngine {
    fn drop(&mut self) {
        NATIVE_ENGINE_CLAIMED.store(false, Ordering::SeqCst);
    }
}

// SAFETY (all methods below): every pointer passed is derived from a live
// reference for the duration of the call, and the signatures follow
// VocalTractLabApi.h.
impl NativeEngine for DynamicEngine {
    fn initialize(&mut self, speaker_file: &CStr) -> c_int {
        unsafe { (self.library.initialize_fn())(speaker_file.as_ptr()) }
    }

    fn close(&mut self) -> c_int {
        unsafe { (self.library.close_fn())() }
    }

    fn segment_sequence_to_gestural_score(
        &mut self,
        segment_file: &CStr,
        gesture_file: &CStr,
        console_output: bool,
    ) -> c_int {
        unsafe {
            (self.library.segment_sequence_to_gestural_score_fn())(
                segment_file.as_ptr(),
                gesture_file.as_ptr(),
                console_output,
            )
        }
    }

    fn gestural_score_duration(
        &mut self,
        gesture_file: &CStr,
        n_audio_samples: &mut c_int,
        n_gesture_samples: &mut c_int,
    ) -> c_int {
        unsafe {
            (self.library.get_gestural_score_duration_fn())(
                gesture_file.as_ptr(),
                n_audio_samples,
                n_gesture_samples,
            )
        }
    }

    fn gestural_score_to_tract_sequence(
        &mut self,
        gesture_file: &CStr,
        tract_file: &CStr,
    ) -> c_int {
        unsafe {
            (self.library.gestural_score_to_tract_sequence_fn())(
                gesture_file.as_ptr(),
                tract_file.as_ptr(),
            )
        }
    }

    fn gestural_score_to_audio(
        &mut self,
        gesture_file: &CStr,
        wav_file: &CStr,
        audio: &mut [f64],
        n_samples: &mut c_int,
        console_output: bool,
    ) -> c_int {
        unsafe {
            (self.library.gestural_score_to_audio_fn())(
                gesture_file.as_ptr(),
                wav_file.as_ptr(),
                audio.as_mut_ptr(),
                n_samples,
                console_output,
            )
        }
    }

    fn constants(&mut self, out: &mut RawConstants) -> c_int {
        unsafe {
            (self.library.get_constants_fn())(
                &mut out.audio_sampling_rate,
                &mut out.num_tube_sections,
                &mut out.num_vocal_tract_params,
                &mut out.num_glottis_params,
                &mut out.num_audio_samples_per_tract_state,
                &mut out.internal_sampling_rate,
            )
        }
    }

    fn version(&mut self, out: &mut [u8; VERSION_BUFFER_LEN]) {
        unsafe { (self.library.get_version_fn())(out.as_mut_ptr() as *mut c_char) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_constants_conversion() {
        let raw = RawConstants {
            audio_sampling_rate: 44_100,
            num_tube_sections: 40,
            num_vocal_tract_params: 19,
            num_glottis_params: 11,
            num_audio_samples_per_tract_state: 110,
            internal_sampling_rate: 44_100.0 / 110.0 * 1_000.0,
        };
        let c = raw.to_constants().unwrap();
        assert_eq!(c.audio_sample_rate, Hertz(44_100.0));
        assert_eq!(c.n_audio_samples_per_tract_state, 110);
    }

    #[test]
    fn test_raw_constants_reject_unset_slots() {
        assert!(RawConstants::default().to_constants().is_none());

        let raw = RawConstants {
            audio_sampling_rate: -1,
            num_tube_sections: 40,
            num_vocal_tract_params: 19,
            num_glottis_params: 11,
            num_audio_samples_per_tract_state: 110,
            internal_sampling_rate: 1.0,
        };
        assert!(raw.to_constants().is_none());
    }

    #[test]
    fn test_decode_c_buffer() {
        let mut buf = [0u8; VERSION_BUFFER_LEN];
        buf[..13].copy_from_slice(b"Jan  5 2024 \0");
        assert_eq!(decode_c_buffer(&buf), "Jan  5 2024");
        assert_eq!(decode_c_buffer(b"no terminator"), "no terminator");
        assert_eq!(decode_c_buffer(&[0u8; 4]), "");
    }
}
