//! Error types for VocalTractLab FFI operations.

use crate::status::{Operation, OperationError};
use lib_types::engine::EngineState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving the native engine.
#[derive(Debug, Error)]
pub enum VtlError {
    /// Source file missing, empty or unusable. Detected before any native call.
    #[error("Input '{path}' rejected: {reason}")]
    Input { path: PathBuf, reason: String },

    /// A native call returned a non-zero status.
    #[error(transparent)]
    Native(#[from] OperationError),

    /// The engine reported more samples than were allocated.
    ///
    /// This means the duration estimate was wrong. It is never clamped.
    #[error(
        "Buffer overflow in {operation}: engine reported {reported} samples, capacity is {capacity}"
    )]
    BufferOverflow {
        operation: Operation,
        capacity: usize,
        reported: usize,
        /// First guard slot found overwritten, if the overrun was detected
        /// by sentinel rather than by the reported length.
        guard_index: Option<usize>,
    },

    /// Operation attempted in the wrong engine state.
    #[error("{operation} requires engine state {expected:?}, got {actual:?}")]
    InvalidState {
        operation: Operation,
        expected: EngineState,
        actual: EngineState,
    },

    /// Initialization requested with a different speaker than the live engine.
    #[error("Engine already initialized with '{active}', refusing '{requested}'")]
    ConflictingConfig { active: PathBuf, requested: PathBuf },

    /// Another dynamic engine already owns the process-wide native state.
    #[error("A VocalTractLab engine is already live in this process")]
    EngineClaimed,

    /// Failed to load the shared library.
    #[error("Failed to load library '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// Required symbol not found in library.
    #[error("Symbol '{symbol}' not found in library")]
    SymbolNotFound { symbol: String },

    /// Filesystem error while staging or persisting output.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding the WAV file failed.
    #[error("WAV output failed: {0}")]
    Wav(#[from] hound::Error),

    /// Invalid parameter.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Engine reported success but produced unusable output.
    #[error("Invalid output from {operation}: {reason}")]
    InvalidOutput { operation: Operation, reason: String },

    /// Buffer allocation failed.
    #[error("Allocation of {samples} samples failed")]
    AllocationFailed { samples: usize },
}

/// Coarse classification of [`VtlError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input; no native resource touched.
    Input,
    /// Native call failed.
    Native,
    /// Duration estimate was wrong. Internal bug.
    BufferOverflow,
    /// Engine not in a state that allows the operation.
    Lifecycle,
    /// Library loading, filesystem or encoding problems.
    Environment,
}

impl VtlError {
    /// Create a load error.
    pub fn load_error(path: impl Into<String>, source: libloading::Error) -> Self {
        Self::LoadError {
            path: path.into(),
            source,
        }
    }

    /// Create a symbol not found error.
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    /// Create an input error.
    pub fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(operation: Operation, expected: EngineState, actual: EngineState) -> Self {
        Self::InvalidState {
            operation,
            expected,
            actual,
        }
    }

    /// Create an invalid output error.
    pub fn invalid_output(operation: Operation, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            operation,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input { .. } | Self::InvalidParameter { .. } => ErrorKind::Input,
            Self::Native(_) | Self::InvalidOutput { .. } => ErrorKind::Native,
            Self::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            Self::InvalidState { .. } | Self::ConflictingConfig { .. } | Self::EngineClaimed => {
                ErrorKind::Lifecycle
            }
            Self::LoadError { .. }
            | Self::SymbolNotFound { .. }
            | Self::Io { .. }
            | Self::Wav(_)
            | Self::AllocationFailed { .. } => ErrorKind::Environment,
        }
    }

    /// Whether this indicates a bug in the binding rather than a user error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BufferOverflow { .. })
    }

    /// The failed native call, if this error came from one.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            Self::Native(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for VocalTractLab operations.
pub type VtlResult<T> = Result<T, VtlError>;
