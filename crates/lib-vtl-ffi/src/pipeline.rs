//! The public synthesis operations.
//!
//! Each function follows the same sequence: guard the lifecycle, validate
//! inputs, make the native call(s) under the engine lock, translate the
//! status code, marshal outputs. A failure at any step skips the rest;
//! output paths only appear once everything succeeded.

use crate::buffer::AudioBuffer;
use crate::engine::{decode_c_buffer, DynamicEngine, NativeEngine};
use crate::error::{VtlError, VtlResult};
use crate::lifecycle::{EngineGuard, Session};
use crate::loader::VERSION_BUFFER_LEN;
use crate::output::{path_to_cstring, validate_output_path, write_wav, StagedOutput};
use crate::status::{translate, Operation};
use lib_types::audio::Audio;
use lib_types::engine::{DurationInfo, EngineConfig, EngineConstants, EngineState};
use std::ffi::{c_int, CStr, CString};
use std::path::Path;
use std::sync::Arc;

/// Check a source file exists, is non-empty, and convert its path.
fn validate_input(path: &Path) -> VtlResult<CString> {
    let meta = std::fs::metadata(path).map_err(|e| VtlError::input(path, e.to_string()))?;
    if !meta.is_file() {
        return Err(VtlError::input(path, "not a regular file"));
    }
    if meta.len() == 0 {
        return Err(VtlError::input(path, "file is empty"));
    }
    path_to_cstring(path)
}

/// `vtlGetGesturalScoreDuration` plus conversion.
fn query_duration<E: NativeEngine>(
    session: &mut Session<'_, E>,
    gesture: &CStr,
) -> VtlResult<DurationInfo> {
    let mut n_audio: c_int = 0;
    let mut n_gesture: c_int = 0;
    let code = session
        .native()
        .gestural_score_duration(gesture, &mut n_audio, &mut n_gesture);
    translate(Operation::GestureDuration, code)?;

    let to_count = |v: c_int, what: &str| {
        usize::try_from(v).map_err(|_| {
            VtlError::invalid_output(Operation::GestureDuration, format!("negative {what} count {v}"))
        })
    };
    let info = DurationInfo::from_counts(
        to_count(n_audio, "audio sample")?,
        to_count(n_gesture, "gesture sample")?,
        session.constants().audio_sample_rate,
    );

    tracing::debug!(
        n_audio_samples = info.n_audio_samples,
        n_gesture_samples = info.n_gesture_samples,
        duration_s = info.duration.0,
        "vtlGetGesturalScoreDuration completed"
    );
    Ok(info)
}

/// High-level access to the VocalTractLab engine.
///
/// Cheap to clone; clones share one [`EngineGuard`] and therefore one
/// lock, so concurrent callers are serialized.
pub struct Synthesizer<E: NativeEngine> {
    guard: Arc<EngineGuard<E>>,
    config: EngineConfig,
}

impl<E: NativeEngine> Clone for Synthesizer<E> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            config: self.config.clone(),
        }
    }
}

impl Synthesizer<DynamicEngine> {
    /// Load the shared library named in `config`.
    ///
    /// The engine is not initialized until the first call (or
    /// [`Synthesizer::initialize`]).
    pub fn from_config(config: EngineConfig) -> VtlResult<Self> {
        let engine = DynamicEngine::load(&config.library)?;
        Ok(Self::with_engine(engine, config))
    }
}

impl<E: NativeEngine> Synthesizer<E> {
    /// Use an existing guard, e.g. one shared with other components.
    pub fn new(guard: Arc<EngineGuard<E>>, config: EngineConfig) -> Self {
        Self { guard, config }
    }

    /// Take ownership of an uninitialized engine.
    pub fn with_engine(engine: E, config: EngineConfig) -> Self {
        Self::new(Arc::new(EngineGuard::new(engine)), config)
    }

    pub fn guard(&self) -> &Arc<EngineGuard<E>> {
        &self.guard
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.guard.state()
    }

    /// Initialize explicitly. Idempotent.
    pub fn initialize(&self) -> VtlResult<EngineConstants> {
        self.guard.ensure_initialized(&self.config)
    }

    /// Close the engine for good.
    pub fn shutdown(&self) -> VtlResult<()> {
        self.guard.shutdown()
    }

    /// Lifecycle step of every operation.
    ///
    /// With `auto_initialize` off the session check below reports an
    /// uninitialized engine instead.
    fn guarded<R>(
        &self,
        operation: Operation,
        f: impl FnOnce(&mut Session<'_, E>) -> VtlResult<R>,
    ) -> VtlResult<R> {
        if self.config.auto_initialize && self.guard.state() == EngineState::Uninitialized {
            self.guard.ensure_initialized(&self.config)?;
        }
        self.guard.session(operation, &self.config, f)
    }

    /// Convert a segment (phoneme/duration) sequence file into a
    /// gestural score file.
    ///
    /// `verbose_api` enables the engine's console output; it never
    /// changes the result.
    pub fn phoneme_file_to_gesture_file<P, Q>(
        &self,
        phoneme_path: P,
        gesture_path: Q,
        verbose_api: bool,
    ) -> VtlResult<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (phoneme_path, gesture_path) = (phoneme_path.as_ref(), gesture_path.as_ref());
        let op = Operation::PhonemesToGesture;

        self.guarded(op, |session| {
            let phonemes = validate_input(phoneme_path)?;
            let staged = StagedOutput::new(gesture_path)?;

            let code = session.native().segment_sequence_to_gestural_score(
                &phonemes,
                staged.c_path(),
                verbose_api,
            );
            translate(op, code)?;
            staged.commit(op)?;

            if verbose_api {
                tracing::info!(
                    phonemes = %phoneme_path.display(),
                    gestures = %gesture_path.display(),
                    "Gestural score created"
                );
            }
            Ok(())
        })
    }

    /// Query sample counts and duration of a gestural score without
    /// synthesizing it.
    pub fn get_gesture_duration<P: AsRef<Path>>(&self, gesture_path: P) -> VtlResult<DurationInfo> {
        let gesture_path = gesture_path.as_ref();
        self.guarded(Operation::GestureDuration, |session| {
            let gesture = validate_input(gesture_path)?;
            query_duration(session, &gesture)
        })
    }

    /// Compute the motor (tract-parameter) trajectory of a gestural
    /// score and save it to `motor_path`.
    ///
    /// Either the complete trajectory file appears at `motor_path` or
    /// nothing does.
    pub fn gesture_file_to_motor_file<P, Q>(&self, gesture_path: P, motor_path: Q) -> VtlResult<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (gesture_path, motor_path) = (gesture_path.as_ref(), motor_path.as_ref());
        let op = Operation::GestureToMotor;

        self.guarded(op, |session| {
            let gesture = validate_input(gesture_path)?;
            let staged = StagedOutput::new(motor_path)?;

            let code = session
                .native()
                .gestural_score_to_tract_sequence(&gesture, staged.c_path());
            translate(op, code)?;
            staged.commit(op)?;

            tracing::debug!(motor = %motor_path.display(), "vtlGesturalScoreToTractSequence completed");
            Ok(())
        })
    }

    /// Synthesize a gestural score.
    ///
    /// The output buffer is sized from the score's duration, filled by
    /// the engine and cut to the sample count it reports. With
    /// `audio_path` the samples are also written as a PCM WAV file; on
    /// failure no file is created.
    pub fn gesture_file_to_audio<P: AsRef<Path>>(
        &self,
        gesture_path: P,
        audio_path: Option<&Path>,
        verbose_api: bool,
    ) -> VtlResult<Audio> {
        let gesture_path = gesture_path.as_ref();
        let op = Operation::GestureToAudio;

        let (audio, bits) = self.guarded(op, |session| {
            let gesture = validate_input(gesture_path)?;
            if let Some(path) = audio_path {
                validate_output_path(path)?;
            }

            let info = query_duration(session, &gesture)?;
            let mut buffer =
                AudioBuffer::allocate_for(info.duration, session.constants().audio_sample_rate)?;

            let mut reported: c_int = 0;
            let code = session.native().gestural_score_to_audio(
                &gesture,
                c"",
                buffer.native_region(),
                &mut reported,
                verbose_api,
            );
            translate(op, code)?;

            let capacity = buffer.capacity();
            let audio = buffer.finalize(op, reported)?;

            tracing::debug!(
                expected = info.n_audio_samples,
                samples = audio.len(),
                capacity,
                "vtlGesturalScoreToAudio completed (buffer overflow check passed)"
            );
            Ok((audio, session.config().wav_bits))
        })?;

        // File output does not need the engine lock.
        if let Some(path) = audio_path {
            let staged = StagedOutput::new(path)?;
            write_wav(staged.path(), &audio, bits)?;
            staged.commit(op)?;
        }

        if verbose_api {
            tracing::info!(
                gestures = %gesture_path.display(),
                samples = audio.len(),
                duration_s = audio.duration().0,
                saved = audio_path.is_some(),
                "Audio synthesized"
            );
        }

        Ok(audio)
    }

    /// Engine constants (sample rate, parameter counts).
    pub fn get_constants(&self) -> VtlResult<EngineConstants> {
        self.guarded(Operation::Constants, |session| Ok(session.constants()))
    }

    /// Build identifier of the native library.
    pub fn get_version(&self) -> VtlResult<String> {
        self.guarded(Operation::Version, |session| {
            let mut buf = [0u8; VERSION_BUFFER_LEN];
            session.native().version(&mut buf);
            Ok(decode_c_buffer(&buf))
        })
    }
}
