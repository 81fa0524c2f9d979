//! Method-call bridge between a host UI layer and the recorder
//!
//! Calls arrive as a method name plus loosely typed JSON arguments and are
//! answered with a success value, an error code, or "not implemented".

mod handler;

pub use handler::{parse_start_arguments, RecorderBridge};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// Channel name the host registers the bridge under
pub const CHANNEL_NAME: &str = "easyrec/screen_recorder";

pub const START_RECORDING: &str = "startRecording";
pub const STOP_RECORDING: &str = "stopRecording";
pub const PAUSE_RECORDING: &str = "pauseRecording";
pub const RESUME_RECORDING: &str = "resumeRecording";
pub const GET_STATUS: &str = "getStatus";

/// A call from the host
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Parse a text line: a JSON call object, or `method` followed by
    /// optional JSON arguments
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str(line);
        }

        let (method, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let arguments = if rest.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(rest)?
        };
        Ok(Self::new(method).with_arguments(arguments))
    }
}

/// Answer to a [`MethodCall`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BridgeReply {
    Success {
        result: Value,
    },
    Error {
        code: ErrorCode,
        message: String,
        details: Value,
    },
    NotImplemented,
}

impl BridgeReply {
    pub fn success(result: impl Into<Value>) -> Self {
        BridgeReply::Success {
            result: result.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        BridgeReply::Error {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BridgeReply::Success { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            BridgeReply::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}
