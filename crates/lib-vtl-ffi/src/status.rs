//! Translation of native status codes.
//!
//! Every VocalTractLab entry point returns an `int` where 0 means
//! success. The meaning of non-zero codes depends on the entry point, so
//! codes are always interpreted together with the [`Operation`] that
//! produced them. Raw integers do not travel past this module.

use std::ffi::c_int;
use std::fmt;

/// Generic description for codes outside the documented tables.
pub const UNSPECIFIED_FAILURE: &str = "unspecified native failure";

/// A native call made by the binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    Close,
    PhonemesToGesture,
    GestureDuration,
    GestureToMotor,
    GestureToAudio,
    Constants,
    Version,
}

impl Operation {
    /// Public operation name used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Close => "close",
            Self::PhonemesToGesture => "phoneme_file_to_gesture_file",
            Self::GestureDuration => "get_gesture_duration",
            Self::GestureToMotor => "gesture_file_to_motor_file",
            Self::GestureToAudio => "gesture_file_to_audio",
            Self::Constants => "get_constants",
            Self::Version => "get_version",
        }
    }

    /// Exported C symbol behind this operation.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Initialize => "vtlInitialize",
            Self::Close => "vtlClose",
            Self::PhonemesToGesture => "vtlSegmentSequenceToGesturalScore",
            Self::GestureDuration => "vtlGetGesturalScoreDuration",
            Self::GestureToMotor => "vtlGesturalScoreToTractSequence",
            Self::GestureToAudio => "vtlGesturalScoreToAudio",
            Self::Constants => "vtlGetConstants",
            Self::Version => "vtlGetVersion",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted native status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// 0 for every entry point.
    Success,
    /// The API was used before `vtlInitialize` succeeded.
    NotInitialized,
    /// `vtlInitialize` could not load the speaker file.
    SpeakerLoadFailed,
    /// The input file (segment sequence or gestural score) could not be loaded.
    InputLoadFailed,
    /// Values in the gestural score are out of range.
    ValuesOutOfRange,
    /// The output file could not be saved.
    OutputSaveFailed,
    /// Code not listed for this operation.
    Unknown(i32),
}

impl StatusCode {
    /// Interpret `code` as returned by `operation`.
    pub fn from_native(operation: Operation, code: c_int) -> Self {
        use Operation::*;

        match (operation, code) {
            (_, 0) => Self::Success,
            (Initialize, 1) => Self::SpeakerLoadFailed,
            (PhonemesToGesture | GestureDuration | GestureToMotor | GestureToAudio, 1) => {
                Self::NotInitialized
            }
            (Constants, 1) => Self::NotInitialized,
            (PhonemesToGesture | GestureDuration | GestureToMotor | GestureToAudio, 2) => {
                Self::InputLoadFailed
            }
            (PhonemesToGesture, 3) => Self::OutputSaveFailed,
            (GestureDuration | GestureToMotor | GestureToAudio, 3) => Self::ValuesOutOfRange,
            (GestureToMotor | GestureToAudio, 4) => Self::OutputSaveFailed,
            (_, other) => Self::Unknown(other),
        }
    }

    /// The original integer.
    ///
    /// Only meaningful together with the operation that produced it.
    pub fn raw(&self, operation: Operation) -> i32 {
        use Operation::*;

        match self {
            Self::Success => 0,
            Self::NotInitialized | Self::SpeakerLoadFailed => 1,
            Self::InputLoadFailed => 2,
            Self::ValuesOutOfRange => 3,
            Self::OutputSaveFailed => match operation {
                PhonemesToGesture => 3,
                _ => 4,
            },
            Self::Unknown(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description for this code in the context of `operation`.
    pub fn describe(&self, operation: Operation) -> &'static str {
        match (self, operation) {
            (Self::Success, _) => "success",
            (Self::NotInitialized, _) => "the API was not initialized",
            (Self::SpeakerLoadFailed, _) => "loading the speaker file failed",
            (Self::InputLoadFailed, Operation::PhonemesToGesture) => {
                "loading the segment sequence file failed"
            }
            (Self::InputLoadFailed, _) => "loading the gestural score file failed",
            (Self::ValuesOutOfRange, _) => "values in the gestural score file are out of range",
            (Self::OutputSaveFailed, Operation::PhonemesToGesture) => {
                "saving the gestural score file failed"
            }
            (Self::OutputSaveFailed, Operation::GestureToMotor) => {
                "the tract sequence file could not be saved"
            }
            (Self::OutputSaveFailed, _) => "the WAV file could not be saved",
            (Self::Unknown(_), _) => UNSPECIFIED_FAILURE,
        }
    }
}

/// A failed native call.
///
/// Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationError {
    operation: Operation,
    status: StatusCode,
    message: String,
}

impl OperationError {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Native integer code, for display and logging.
    pub fn native_code(&self) -> i32 {
        self.status.raw(self.operation)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed with native code {}: {}",
            self.operation,
            self.native_code(),
            self.message
        )
    }
}

impl std::error::Error for OperationError {}

/// Translate the result of a native call.
///
/// Code 0 yields `Ok(())`; anything else becomes an [`OperationError`].
pub fn translate(operation: Operation, code: c_int) -> Result<(), OperationError> {
    let status = StatusCode::from_native(operation, code);
    if status.is_success() {
        return Ok(());
    }

    tracing::debug!(
        operation = operation.as_str(),
        symbol = operation.symbol(),
        code,
        "Native call failed"
    );

    Err(OperationError {
        operation,
        status,
        message: status.describe(operation).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_success_everywhere() {
        for op in [
            Operation::Initialize,
            Operation::Close,
            Operation::PhonemesToGesture,
            Operation::GestureDuration,
            Operation::GestureToMotor,
            Operation::GestureToAudio,
            Operation::Constants,
        ] {
            assert!(translate(op, 0).is_ok(), "{op}");
        }
    }

    #[test]
    fn test_code_one_depends_on_operation() {
        let init = translate(Operation::Initialize, 1).unwrap_err();
        assert_eq!(init.status(), StatusCode::SpeakerLoadFailed);

        let audio = translate(Operation::GestureToAudio, 1).unwrap_err();
        assert_eq!(audio.status(), StatusCode::NotInitialized);
        assert_eq!(audio.message(), "the API was not initialized");
    }

    #[test]
    fn test_save_failure_code_differs_between_operations() {
        let ges = translate(Operation::PhonemesToGesture, 3).unwrap_err();
        assert_eq!(ges.status(), StatusCode::OutputSaveFailed);
        assert_eq!(ges.native_code(), 3);

        let motor = translate(Operation::GestureToMotor, 4).unwrap_err();
        assert_eq!(motor.status(), StatusCode::OutputSaveFailed);
        assert_eq!(motor.native_code(), 4);
        assert_eq!(motor.message(), "the tract sequence file could not be saved");

        let range = translate(Operation::GestureToMotor, 3).unwrap_err();
        assert_eq!(range.status(), StatusCode::ValuesOutOfRange);
    }

    #[test]
    fn test_unknown_codes_get_generic_message() {
        let err = translate(Operation::GestureDuration, -7).unwrap_err();
        assert_eq!(err.status(), StatusCode::Unknown(-7));
        assert_eq!(err.native_code(), -7);
        assert_eq!(err.message(), UNSPECIFIED_FAILURE);

        // Close documents no failure codes at all.
        let close = translate(Operation::Close, 1).unwrap_err();
        assert_eq!(close.status(), StatusCode::Unknown(1));
    }

    #[test]
    fn test_display_names_operation_and_code() {
        let err = translate(Operation::GestureDuration, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "get_gesture_duration failed with native code 2: loading the gestural score file failed"
        );
    }
}
