//! Error taxonomy for the recorder
//!
//! Every public recorder operation fails with exactly one [`RecorderError`].
//! Platform internals report `anyhow::Error`, which is carried through
//! transparently as [`RecorderError::Platform`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// A consent request is already outstanding
    #[error("A startRecording request is already in progress")]
    RequestInProgress,

    /// The platform refused (or could not honour) the capture authorization
    #[error("Screen capture permission was denied: {0}")]
    GrantDenied(DenialReason),

    #[error("{0}")]
    IllegalState(String),

    /// Resource acquisition failed; everything acquired so far was released
    #[error("Failed to start recording: {0}")]
    StartFailed(#[source] Box<RecorderError>),

    #[error("{0}")]
    UnsupportedOperation(String),

    /// The encoder did not finalize cleanly; the output may be unusable
    #[error("Failed to stop recording cleanly: {reason}")]
    StopFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

impl RecorderError {
    /// Wrap an acquisition failure, leaving already-wrapped errors alone
    pub fn start_failed(cause: impl Into<RecorderError>) -> Self {
        match cause.into() {
            already @ RecorderError::StartFailed(_) => already,
            cause => RecorderError::StartFailed(Box::new(cause)),
        }
    }

    /// Whether this error came from the user (or platform) declining consent
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, RecorderError::GrantDenied(reason) if reason.is_user_decision())
    }
}

/// Why a capture grant was not issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The user explicitly declined
    Rejected,
    /// The consent flow was dismissed or abandoned
    Cancelled,
    /// The platform reported success but delivered no token
    MissingToken,
    /// The token could not be turned into a capture projection
    ProjectionUnavailable(String),
}

impl DenialReason {
    pub fn is_user_decision(&self) -> bool {
        !matches!(self, DenialReason::ProjectionUnavailable(_))
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Rejected => write!(f, "rejected by user"),
            DenialReason::Cancelled => write!(f, "consent flow cancelled"),
            DenialReason::MissingToken => write!(f, "no capture token delivered"),
            DenialReason::ProjectionUnavailable(msg) => {
                write!(f, "capture projection unavailable: {}", msg)
            }
        }
    }
}

/// Error codes surfaced across the method-call bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InProgress,
    StartFailed,
    StopFailed,
    PauseFailed,
    ResumeFailed,
    UserCancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InProgress => "IN_PROGRESS",
            ErrorCode::StartFailed => "START_FAILED",
            ErrorCode::StopFailed => "STOP_FAILED",
            ErrorCode::PauseFailed => "PAUSE_FAILED",
            ErrorCode::ResumeFailed => "RESUME_FAILED",
            ErrorCode::UserCancelled => "USER_CANCELLED",
        }
    }

    /// Code for a failed `startRecording`
    pub fn for_start(err: &RecorderError) -> Self {
        match err {
            RecorderError::RequestInProgress => ErrorCode::InProgress,
            e if e.is_user_cancellation() => ErrorCode::UserCancelled,
            _ => ErrorCode::StartFailed,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
