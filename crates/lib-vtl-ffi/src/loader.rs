//! Dynamic loading of the VocalTractLab API library.
//!
//! This module loads the shared library built from the VocalTractLab
//! backend and extracts the C entry points the binding uses.

use crate::error::{VtlError, VtlResult};
use libloading::Library;
use std::ffi::{c_char, c_double, c_int};
use std::path::Path;
use std::sync::Arc;

/// Minimum size of the buffer `vtlGetVersion` writes into.
pub const VERSION_BUFFER_LEN: usize = 64;

/// `int vtlInitialize(const char *speakerFileName);`
pub type VtlInitializeFn = unsafe extern "C" fn(speaker_file_name: *const c_char) -> c_int;

/// `int vtlClose(void);`
pub type VtlCloseFn = unsafe extern "C" fn() -> c_int;

/// Function signature for vtlSegmentSequenceToGesturalScore.
///
/// ```c
/// int vtlSegmentSequenceToGesturalScore(
///     const char *segFileName,
///     const char *gesFileName,
///     bool        enableConsoleOutput
/// );
/// ```
pub type VtlSegmentSequenceToGesturalScoreFn = unsafe extern "C" fn(
    seg_file_name: *const c_char,
    ges_file_name: *const c_char,
    enable_console_output: bool,
) -> c_int;

/// Function signature for vtlGetGesturalScoreDuration.
///
/// ```c
/// int vtlGetGesturalScoreDuration(
///     const char *gesFileName,
///     int        *numAudioSamples,
///     int        *numGestureSamples
/// );
/// ```
pub type VtlGetGesturalScoreDurationFn = unsafe extern "C" fn(
    ges_file_name: *const c_char,
    num_audio_samples: *mut c_int,
    num_gesture_samples: *mut c_int,
) -> c_int;

/// `int vtlGesturalScoreToTractSequence(const char *gesFileName, const char *tractSequenceFileName);`
pub type VtlGesturalScoreToTractSequenceFn = unsafe extern "C" fn(
    ges_file_name: *const c_char,
    tract_sequence_file_name: *const c_char,
) -> c_int;

/// Function signature for vtlGesturalScoreToAudio.
///
/// ```c
/// int vtlGesturalScoreToAudio(
///     const char *gesFileName,
///     const char *wavFileName,
///     double     *audio,
///     int        *numSamples,
///     bool        enableConsoleOutput
/// );
/// ```
///
/// `audio` has no size argument; the caller sizes it from
/// `vtlGetGesturalScoreDuration` beforehand.
pub type VtlGesturalScoreToAudioFn = unsafe extern "C" fn(
    ges_file_name: *const c_char,
    wav_file_name: *const c_char,
    audio: *mut c_double,
    num_samples: *mut c_int,
    enable_console_output: bool,
) -> c_int;

/// Function signature for vtlGetConstants.
///
/// ```c
/// int vtlGetConstants(
///     int    *audioSamplingRate,
///     int    *numTubeSections,
///     int    *numVocalTractParams,
///     int    *numGlottisParams,
///     int    *numAudioSamplesPerTractState,
///     double *internalSamplingRate
/// );
/// ```
pub type VtlGetConstantsFn = unsafe extern "C" fn(
    audio_sampling_rate: *mut c_int,
    num_tube_sections: *mut c_int,
    num_vocal_tract_params: *mut c_int,
    num_glottis_params: *mut c_int,
    num_audio_samples_per_tract_state: *mut c_int,
    internal_sampling_rate: *mut c_double,
) -> c_int;

/// `void vtlGetVersion(char *version);`
pub type VtlGetVersionFn = unsafe extern "C" fn(version: *mut c_char);

/// Loaded VocalTractLab library with extracted function pointers.
pub struct VtlLibrary {
    /// Keeps the symbols below valid.
    #[allow(dead_code)]
    library: Library,

    /// Path to the library file.
    pub path: String,

    initialize: VtlInitializeFn,
    close: VtlCloseFn,
    segment_sequence_to_gestural_score: VtlSegmentSequenceToGesturalScoreFn,
    get_gestural_score_duration: VtlGetGesturalScoreDurationFn,
    gestural_score_to_tract_sequence: VtlGesturalScoreToTractSequenceFn,
    gestural_score_to_audio: VtlGesturalScoreToAudioFn,
    get_constants: VtlGetConstantsFn,
    get_version: VtlGetVersionFn,
}

/// Resolve one symbol to a plain function pointer.
///
/// # Safety
///
/// `T` must match the C signature the library exports under `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> VtlResult<T> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);
    // SAFETY: forwarded to the caller
    unsafe {
        library
            .get::<T>(&bytes)
            .map(|s| *s)
            .map_err(|_| VtlError::symbol_not_found(name))
    }
}

impl VtlLibrary {
    /// Load the API from a shared library file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to `VocalTractLabApi.dll` / `libVocalTractLabApi.so`
    ///
    /// All eight entry points are required; a library missing any of them
    /// is rejected.
    pub fn load<P: AsRef<Path>>(path: P) -> VtlResult<Arc<Self>> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        // SAFETY: loading runs the library's initializers; the caller
        // chooses which library to trust.
        let library = unsafe { Library::new(path) }
            .map_err(|e| VtlError::load_error(&path_str, e))?;

        // SAFETY: the aliases above mirror VocalTractLabApi.h.
        let lib = unsafe {
            Self {
                initialize: symbol(&library, "vtlInitialize")?,
                close: symbol(&library, "vtlClose")?,
                segment_sequence_to_gestural_score: symbol(
                    &library,
                    "vtlSegmentSequenceToGesturalScore",
                )?,
                get_gestural_score_duration: symbol(&library, "vtlGetGesturalScoreDuration")?,
                gestural_score_to_tract_sequence: symbol(
                    &library,
                    "vtlGesturalScoreToTractSequence",
                )?,
                gestural_score_to_audio: symbol(&library, "vtlGesturalScoreToAudio")?,
                get_constants: symbol(&library, "vtlGetConstants")?,
                get_version: symbol(&library, "vtlGetVersion")?,
                library,
                path: path_str,
            }
        };

        tracing::info!(path = %lib.path, "Loaded VocalTractLab API library");

        Ok(Arc::new(lib))
    }

    pub fn initialize_fn(&self) -> VtlInitializeFn {
        self.initialize
    }

    pub fn close_fn(&self) -> VtlCloseFn {
        self.close
    }

    pub fn segment_sequence_to_gestural_score_fn(&self) -> VtlSegmentSequenceToGesturalScoreFn {
        self.segment_sequence_to_gestural_score
    }

    pub fn get_gestural_score_duration_fn(&self) -> VtlGetGesturalScoreDurationFn {
        self.get_gestural_score_duration
    }

    pub fn gestural_score_to_tract_sequence_fn(&self) -> VtlGesturalScoreToTractSequenceFn {
        self.gestural_score_to_tract_sequence
    }

    pub fn gestural_score_to_audio_fn(&self) -> VtlGesturalScoreToAudioFn {
        self.gestural_score_to_audio
    }

    pub fn get_constants_fn(&self) -> VtlGetConstantsFn {
        self.get_constants
    }

    pub fn get_version_fn(&self) -> VtlGetVersionFn {
        self.get_version
    }
}

// Only function pointers and the Library handle are stored; the engine
// layer above serializes every call through them.
unsafe impl Send for VtlLibrary {}
unsafe impl Sync for VtlLibrary {}

/// Platform-specific library format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryFormat {
    /// Windows DLL.
    Dll,
    /// Linux/Unix shared object.
    So,
    /// macOS dynamic library.
    Dylib,
    /// Unknown format.
    Unknown,
}

impl LibraryFormat {
    /// Detect format from file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("dll") | Some("DLL") => Self::Dll,
            Some("so") => Self::So,
            Some("dylib") => Self::Dylib,
            _ => Self::Unknown,
        }
    }

    /// Get the format for the current platform.
    #[cfg(target_os = "windows")]
    pub fn native() -> Self {
        Self::Dll
    }

    #[cfg(target_os = "macos")]
    pub fn native() -> Self {
        Self::Dylib
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    pub fn native() -> Self {
        Self::So
    }

    /// File name the backend build produces for this format.
    pub fn api_file_name(&self) -> &'static str {
        match self {
            Self::Dll => "VocalTractLabApi.dll",
            Self::Dylib => "libVocalTractLabApi.dylib",
            Self::So | Self::Unknown => "libVocalTractLabApi.so",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_format_detection() {
        assert_eq!(LibraryFormat::from_path("VocalTractLabApi.dll"), LibraryFormat::Dll);
        assert_eq!(LibraryFormat::from_path("libVocalTractLabApi.so"), LibraryFormat::So);
        assert_eq!(
            LibraryFormat::from_path("libVocalTractLabApi.dylib"),
            LibraryFormat::Dylib
        );
        assert_eq!(LibraryFormat::from_path("JD3.speaker"), LibraryFormat::Unknown);
    }

    #[test]
    fn test_native_file_name_round_trips_format() {
        let native = LibraryFormat::native();
        assert_eq!(LibraryFormat::from_path(native.api_file_name()), native);
    }

    #[test]
    fn test_load_missing_library_fails() {
        let err = VtlLibrary::load("/nonexistent/libVocalTractLabApi.so").err().unwrap();
        assert!(matches!(err, VtlError::LoadError { .. }));
    }
}
