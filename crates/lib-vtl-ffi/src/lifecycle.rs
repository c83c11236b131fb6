//! Engine lifecycle management.
//!
//! VocalTractLab is a single stateful resource with no internal locking:
//! - `vtlInitialize` must precede every other call
//! - `vtlClose` ends the session for good
//! - no two calls may run at the same time
//!
//! [`EngineGuard`] owns the engine behind one mutex and tracks
//! [`EngineState`]. Native calls other than init/close are only reachable
//! through [`EngineGuard::session`], which holds the lock for the whole
//! closure and refuses to run unless the engine is `Initialized` with the
//! caller's speaker file.

use crate::engine::{NativeEngine, RawConstants};
use crate::error::{VtlError, VtlResult};
use crate::output::path_to_cstring;
use crate::status::{translate, Operation};
use lib_types::engine::{EngineConfig, EngineConstants};
use std::sync::{Mutex, MutexGuard};

pub use lib_types::engine::EngineState;

/// Helper trait to recover from poisoned mutexes.
///
/// A panic inside a session closure poisons the lock. The state field is
/// only updated after native calls return, so it still describes the
/// engine and the guard stays usable.
trait RecoverMutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> RecoverMutex<T> for Mutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Engine mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

struct GuardInner<E> {
    engine: E,
    state: EngineState,
    /// Config of the live initialization.
    config: Option<EngineConfig>,
    /// Cached after a successful initialize.
    constants: Option<EngineConstants>,
    native_calls: u64,
}

/// Exclusive access to an initialized engine for one pipeline call.
pub struct Session<'a, E> {
    engine: &'a mut E,
    constants: EngineConstants,
    config: &'a EngineConfig,
    native_calls: &'a mut u64,
}

impl<E: NativeEngine> Session<'_, E> {
    /// The engine, for one native call. Counts towards
    /// [`EngineGuard::native_call_count`].
    pub fn native(&mut self) -> &mut E {
        *self.native_calls += 1;
        self.engine
    }

    /// Constants reported at initialization.
    pub fn constants(&self) -> EngineConstants {
        self.constants
    }

    /// Config of the caller, native setup identical to the live one.
    pub fn config(&self) -> &EngineConfig {
        self.config
    }
}

/// Owner of the single native engine.
///
/// Share it as `Arc<EngineGuard<E>>`; every method takes `&self` and
/// serializes on the internal lock.
pub struct EngineGuard<E: NativeEngine> {
    inner: Mutex<GuardInner<E>>,
}

impl<E: NativeEngine> EngineGuard<E> {
    /// Wrap an engine that has not been initialized yet.
    pub fn new(engine: E) -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                engine,
                state: EngineState::Uninitialized,
                config: None,
                constants: None,
                native_calls: 0,
            }),
        }
    }

    /// Get the current engine state.
    pub fn state(&self) -> EngineState {
        self.inner.lock_recover().state
    }

    /// Constants of the live engine, if initialized.
    pub fn constants(&self) -> Option<EngineConstants> {
        let inner = self.inner.lock_recover();
        inner.constants.filter(|_| inner.state.is_live())
    }

    /// Total native calls made through this guard.
    pub fn native_call_count(&self) -> u64 {
        self.inner.lock_recover().native_calls
    }

    /// Initialize the engine if it is not already.
    ///
    /// Idempotent for the same speaker file. On failure the state stays
    /// `Uninitialized` and a later call may retry.
    ///
    /// # Errors
    ///
    /// - [`VtlError::InvalidState`] once the engine has been closed
    /// - [`VtlError::ConflictingConfig`] if live with a different speaker
    /// - [`VtlError::Input`] if the speaker file is missing (no native call)
    /// - [`VtlError::Native`] tagged `initialize` if `vtlInitialize` fails
    pub fn ensure_initialized(&self, config: &EngineConfig) -> VtlResult<EngineConstants> {
        let mut inner = self.inner.lock_recover();

        match inner.state {
            EngineState::Initialized => {
                let active = inner.config.as_ref();
                return match (active, inner.constants) {
                    (Some(active), Some(constants)) if active.same_native_setup(config) => {
                        Ok(constants)
                    }
                    (Some(active), _) => Err(VtlError::ConflictingConfig {
                        active: active.speaker_file.clone(),
                        requested: config.speaker_file.clone(),
                    }),
                    (None, _) => Err(VtlError::invalid_output(
                        Operation::Initialize,
                        "initialized engine without recorded config",
                    )),
                };
            }
            EngineState::Closed => {
                return Err(VtlError::invalid_state(
                    Operation::Initialize,
                    EngineState::Uninitialized,
                    EngineState::Closed,
                ));
            }
            EngineState::Uninitialized => {}
        }

        let speaker = &config.speaker_file;
        if !speaker.is_file() {
            return Err(VtlError::input(speaker, "speaker file not found"));
        }
        let speaker_c = path_to_cstring(speaker)?;

        inner.native_calls += 1;
        let code = inner.engine.initialize(&speaker_c);
        translate(Operation::Initialize, code)?;

        let mut raw = RawConstants::default();
        inner.native_calls += 1;
        let code = inner.engine.constants(&mut raw);
        let constants = translate(Operation::Constants, code)
            .map_err(VtlError::from)
            .and_then(|()| {
                raw.to_constants().ok_or_else(|| {
                    VtlError::invalid_output(
                        Operation::Constants,
                        format!("implausible engine constants {raw:?}"),
                    )
                })
            });

        let constants = match constants {
            Ok(c) => c,
            Err(e) => {
                // Leave nothing live behind a failed initialize.
                inner.native_calls += 1;
                let close_code = inner.engine.close();
                if let Err(close_err) = translate(Operation::Close, close_code) {
                    tracing::warn!(error = %close_err, "Close after failed initialize also failed");
                }
                return Err(e);
            }
        };

        inner.state = EngineState::Initialized;
        inner.config = Some(config.clone());
        inner.constants = Some(constants);

        tracing::info!(
            speaker = %speaker.display(),
            sample_rate = constants.audio_sample_rate.0,
            samples_per_tract_state = constants.n_audio_samples_per_tract_state,
            "VocalTractLab initialized"
        );

        Ok(constants)
    }

    /// Close the engine.
    ///
    /// Idempotent once closed. On an engine that was never initialized
    /// this does nothing and the state stays `Uninitialized`.
    ///
    /// The state becomes `Closed` even if `vtlClose` reports failure; the
    /// failure is still returned.
    pub fn shutdown(&self) -> VtlResult<()> {
        let mut inner = self.inner.lock_recover();
        Self::close_locked(&mut inner)
    }

    fn close_locked(inner: &mut GuardInner<E>) -> VtlResult<()> {
        match inner.state {
            EngineState::Initialized => {}
            EngineState::Closed | EngineState::Uninitialized => return Ok(()),
        }

        inner.native_calls += 1;
        let code = inner.engine.close();

        inner.state = EngineState::Closed;
        inner.constants = None;

        translate(Operation::Close, code)?;
        tracing::info!(native_calls = inner.native_calls, "VocalTractLab closed");
        Ok(())
    }

    /// Run `f` with exclusive access to the initialized engine.
    ///
    /// Fails without touching the engine unless the state is
    /// `Initialized` ([`VtlError::InvalidState`]) and the engine was
    /// initialized with the native setup of `config`
    /// ([`VtlError::ConflictingConfig`]).
    pub fn session<R>(
        &self,
        operation: Operation,
        config: &EngineConfig,
        f: impl FnOnce(&mut Session<'_, E>) -> VtlResult<R>,
    ) -> VtlResult<R> {
        let mut guard = self.inner.lock_recover();
        let inner = &mut *guard;

        let (constants, active) = match (inner.constants, inner.config.as_ref()) {
            (Some(constants), Some(active)) if inner.state.is_live() => (constants, active),
            _ => {
                return Err(VtlError::invalid_state(
                    operation,
                    EngineState::Initialized,
                    inner.state,
                ));
            }
        };
        if !active.same_native_setup(config) {
            return Err(VtlError::ConflictingConfig {
                active: active.speaker_file.clone(),
                requested: config.speaker_file.clone(),
            });
        }

        let mut session = Session {
            engine: &mut inner.engine,
            constants,
            config,
            native_calls: &mut inner.native_calls,
        };
        f(&mut session)
    }
}

impl<E: NativeEngine> Drop for EngineGuard<E> {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.state == EngineState::Initialized {
            // Best-effort close, log but don't propagate errors
            if let Err(e) = Self::close_locked(inner) {
                tracing::warn!(error = %e, "Error during engine cleanup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use std::sync::Arc;

    fn speaker_config(dir: &tempfile::TempDir) -> EngineConfig {
        let speaker = dir.path().join("JD3.speaker");
        std::fs::write(&speaker, "<speaker/>").unwrap();
        EngineConfig::new("libVocalTractLabApi.so", speaker)
    }

    #[test]
    fn test_initialize_then_close() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new());
        assert_eq!(guard.state(), EngineState::Uninitialized);

        let constants = guard.ensure_initialized(&config).unwrap();
        assert_eq!(guard.state(), EngineState::Initialized);
        assert_eq!(guard.constants(), Some(constants));

        guard.shutdown().unwrap();
        assert_eq!(guard.state(), EngineState::Closed);
        assert_eq!(guard.constants(), None);
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let engine = MockEngine::new();
        let inits = engine.counters();
        let guard = EngineGuard::new(engine);

        guard.ensure_initialized(&config).unwrap();
        let calls = guard.native_call_count();
        guard.ensure_initialized(&config).unwrap();

        assert_eq!(guard.native_call_count(), calls);
        assert_eq!(inits.initialize_calls(), 1);
    }

    #[test]
    fn test_conflicting_speaker_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new());
        guard.ensure_initialized(&config).unwrap();

        let other_speaker = dir.path().join("other.speaker");
        std::fs::write(&other_speaker, "<speaker/>").unwrap();
        let other = EngineConfig::new("libVocalTractLabApi.so", other_speaker);

        let err = guard.ensure_initialized(&other).unwrap_err();
        assert!(matches!(err, VtlError::ConflictingConfig { .. }));
        assert_eq!(guard.state(), EngineState::Initialized);
    }

    #[test]
    fn test_session_rejects_other_speaker() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new());
        guard.ensure_initialized(&config).unwrap();
        let calls = guard.native_call_count();

        let other = EngineConfig::new("libVocalTractLabApi.so", dir.path().join("other.speaker"));
        let err = guard
            .session(Operation::GestureDuration, &other, |s| {
                let mut buf = [0u8; crate::loader::VERSION_BUFFER_LEN];
                s.native().version(&mut buf);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, VtlError::ConflictingConfig { .. }));
        assert_eq!(guard.native_call_count(), calls);

        let mut wav_bits = config.clone();
        wav_bits.wav_bits = lib_types::engine::WavBitDepth::Pcm24;
        let bits = guard
            .session(Operation::Version, &wav_bits, |s| Ok(s.config().wav_bits))
            .unwrap();
        assert_eq!(bits, lib_types::engine::WavBitDepth::Pcm24);
    }

    #[test]
    fn test_failed_initialize_leaves_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new().with_initialize_code(1));

        let err = guard.ensure_initialized(&config).unwrap_err();
        let op = err.operation_error().unwrap();
        assert_eq!(op.operation(), Operation::Initialize);
        assert_eq!(op.native_code(), 1);
        assert_eq!(guard.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_implausible_constants_close_engine_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let engine = MockEngine::new().with_sample_rate(0);
        let counters = engine.counters();
        let guard = EngineGuard::new(engine);

        let err = guard.ensure_initialized(&config).unwrap_err();
        assert!(matches!(err, VtlError::InvalidOutput { .. }));
        assert_eq!(guard.state(), EngineState::Uninitialized);
        assert_eq!(counters.close_calls(), 1);
    }

    #[test]
    fn test_missing_speaker_makes_no_native_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new("lib.so", dir.path().join("absent.speaker"));
        let guard = EngineGuard::new(MockEngine::new());

        let err = guard.ensure_initialized(&config).unwrap_err();
        assert!(matches!(err, VtlError::Input { .. }));
        assert_eq!(guard.native_call_count(), 0);
    }

    #[test]
    fn test_closed_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new());
        guard.ensure_initialized(&config).unwrap();
        guard.shutdown().unwrap();
        guard.shutdown().unwrap();

        let calls = guard.native_call_count();
        let err = guard.ensure_initialized(&config).unwrap_err();
        assert!(matches!(
            err,
            VtlError::InvalidState { actual: EngineState::Closed, .. }
        ));
        assert_eq!(guard.native_call_count(), calls);
    }

    #[test]
    fn test_session_requires_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let guard = EngineGuard::new(MockEngine::new());
        let err = guard
            .session(Operation::GestureDuration, &config, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(
            err,
            VtlError::InvalidState {
                operation: Operation::GestureDuration,
                actual: EngineState::Uninitialized,
                ..
            }
        ));
        assert_eq!(guard.native_call_count(), 0);
    }

    #[test]
    fn test_shutdown_before_init_is_noop() {
        let guard = EngineGuard::new(MockEngine::new());
        guard.shutdown().unwrap();
        assert_eq!(guard.state(), EngineState::Uninitialized);
        assert_eq!(guard.native_call_count(), 0);
    }

    #[test]
    fn test_drop_closes_live_engine() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let engine = MockEngine::new();
        let counters = engine.counters();
        {
            let guard = EngineGuard::new(engine);
            guard.ensure_initialized(&config).unwrap();
        }
        assert_eq!(counters.close_calls(), 1);
    }

    #[test]
    fn test_sessions_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let config = speaker_config(&dir);
        let engine = MockEngine::new();
        let counters = engine.counters();
        let guard = Arc::new(EngineGuard::new(engine));
        guard.ensure_initialized(&config).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        guard
                            .session(Operation::Version, &config, |s| {
                                let mut buf = [0u8; crate::loader::VERSION_BUFFER_LEN];
                                s.native().version(&mut buf);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counters.max_concurrent_calls(), 1);
        assert_eq!(counters.version_calls(), 200);
    }
}
