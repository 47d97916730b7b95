//! Error taxonomy for the engine binding
//!
//! Every public operation returns `Result<_, PorcupineError>`. Raw status
//! integers from the native engine are converted into [`PvStatus`] inside
//! `native.rs` and never travel further as plain numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Status codes reported by the native engine (`pv_status_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PvStatus {
    Success,
    OutOfMemory,
    IoError,
    InvalidArgument,
    StopIteration,
    KeyError,
    InvalidState,
    RuntimeError,
    ActivationError,
    ActivationLimitReached,
    ActivationThrottled,
    ActivationRefused,
    Unknown(i32),
}

impl PvStatus {
    /// Map a raw `pv_status_t` value.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PvStatus::Success,
            1 => PvStatus::OutOfMemory,
            2 => PvStatus::IoError,
            3 => PvStatus::InvalidArgument,
            4 => PvStatus::StopIteration,
            5 => PvStatus::KeyError,
            6 => PvStatus::InvalidState,
            7 => PvStatus::RuntimeError,
            8 => PvStatus::ActivationError,
            9 => PvStatus::ActivationLimitReached,
            10 => PvStatus::ActivationThrottled,
            11 => PvStatus::ActivationRefused,
            other => PvStatus::Unknown(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PvStatus::Success)
    }

    /// Name as printed by the engine's own `pv_status_to_string`.
    pub fn name(&self) -> &'static str {
        match self {
            PvStatus::Success => "SUCCESS",
            PvStatus::OutOfMemory => "OUT_OF_MEMORY",
            PvStatus::IoError => "IO_ERROR",
            PvStatus::InvalidArgument => "INVALID_ARGUMENT",
            PvStatus::StopIteration => "STOP_ITERATION",
            PvStatus::KeyError => "KEY_ERROR",
            PvStatus::InvalidState => "INVALID_STATE",
            PvStatus::RuntimeError => "RUNTIME_ERROR",
            PvStatus::ActivationError => "ACTIVATION_ERROR",
            PvStatus::ActivationLimitReached => "ACTIVATION_LIMIT_REACHED",
            PvStatus::ActivationThrottled => "ACTIVATION_THROTTLED",
            PvStatus::ActivationRefused => "ACTIVATION_REFUSED",
            PvStatus::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for PvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvStatus::Unknown(code) => write!(f, "UNKNOWN({})", code),
            other => f.write_str(other.name()),
        }
    }
}

/// Reasons a configuration value or input buffer is rejected before any
/// native call is made.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("access key is required")]
    MissingAccessKey,

    #[error("couldn't find the engine library at {0}")]
    LibraryNotFound(PathBuf),

    #[error("couldn't find the model file at {0}")]
    ModelNotFound(PathBuf),

    #[error("'{0}' is not a built-in keyword")]
    UnknownKeyword(String),

    #[error("built-in keyword '{0}' has no keyword file for this platform")]
    KeywordNotBundled(String),

    #[error("no keywords were provided")]
    NoKeywords,

    #[error("couldn't find the keyword file at {0}")]
    KeywordFileNotFound(PathBuf),

    #[error("sensitivity #{index} ({value}) is outside [0, 1]")]
    SensitivityOutOfRange { index: usize, value: f32 },

    #[error("{keywords} keyword(s) but {sensitivities} sensitivity value(s)")]
    SensitivityCountMismatch { keywords: usize, sensitivities: usize },

    #[error("frame has {actual} samples, engine expects {expected}")]
    FrameLength { expected: usize, actual: usize },

    #[error("path {0} can't be passed to the engine as a C string")]
    UnrepresentablePath(PathBuf),

    #[error("access key contains an interior NUL byte")]
    MalformedAccessKey,

    #[error("'{0}' is not a sensitivity value")]
    MalformedSensitivity(String),
}

/// Lifecycle phase of a session, as reported in [`PorcupineError::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Deleted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PorcupineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    #[error("can't {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("failed to load engine library {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("engine library is missing symbol `{symbol}`: {source}")]
    Symbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("{message}: {status}")]
    Native { status: PvStatus, message: String },

    #[error("resource {path}: {source}")]
    Resource {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("platform detection failed: {0}")]
    Platform(String),
}

impl PorcupineError {
    pub(crate) fn native(status: PvStatus, message: impl Into<String>) -> Self {
        PorcupineError::Native {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn resource(path: impl Into<String>, source: io::Error) -> Self {
        PorcupineError::Resource {
            path: path.into(),
            source,
        }
    }

    /// Native status carried by this error, if it came from the engine.
    pub fn status(&self) -> Option<PvStatus> {
        match self {
            PorcupineError::Native { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, PorcupineError::InvalidArgument(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, PorcupineError::InvalidState { .. })
    }
}

pub type Result<T> = std::result::Result<T, PorcupineError>;
