//! # lib-vtl-ffi
//!
//! Safe FFI wrapper for the VocalTractLab articulatory synthesis API.
//!
//! The native library (`VocalTractLabApi.dll`/`libVocalTractLabApi.so`)
//! turns gestural scores into motor trajectories and audio. This crate
//! handles:
//!
//! - Dynamic library loading with `libloading`
//! - Lifecycle management (vtlInitialize/vtlClose) behind one lock
//! - Translation of per-call status codes into [`VtlError`]
//! - Pre-sized, overrun-checked sample buffers
//! - Output files that only appear once complete
//!
//! # Concurrency
//!
//! The native engine keeps global state and has no internal locking.
//! All calls go through a single [`EngineGuard`], so at most one native
//! operation runs at any instant. There is no timeout: a hung native call
//! blocks its caller.
//!
//! ```ignore
//! let config = EngineConfig::new("libVocalTractLabApi.so", "JD3.speaker");
//! let synth = Synthesizer::from_config(config)?;
//! let info = synth.get_gesture_duration("score.ges")?;
//! let audio = synth.gesture_file_to_audio("score.ges", Some(Path::new("out.wav")), false)?;
//! assert_eq!(audio.len(), info.n_audio_samples);
//! synth.shutdown()?;
//! ```

pub mod error;
pub mod status;
pub mod loader;
pub mod engine;
pub mod buffer;
pub mod output;
pub mod lifecycle;
pub mod pipeline;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use buffer::AudioBuffer;
pub use engine::{DynamicEngine, NativeEngine};
pub use error::{ErrorKind, VtlError, VtlResult};
pub use lifecycle::{EngineGuard, EngineState, Session};
pub use loader::{LibraryFormat, VtlLibrary};
pub use pipeline::Synthesizer;
pub use status::{Operation, OperationError, StatusCode};
