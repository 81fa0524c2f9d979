//! Method-call dispatch onto the recorder
//!
//! Maps each bridge method to a `ScreenRecorder` operation and every failure to
//! its wire error code. Arguments are read leniently: missing or wrongly typed
//! fields fall back to the recorder's defaults.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    BridgeReply, MethodCall, GET_STATUS, PAUSE_RECORDING, RESUME_RECORDING, START_RECORDING,
    STOP_RECORDING,
};
use crate::capture::{RecordingRequest, ScreenRecorder};
use crate::error::{ErrorCode, RecorderError};

/// Dispatches method calls onto a shared [`ScreenRecorder`]
#[derive(Clone)]
pub struct RecorderBridge {
    recorder: Arc<ScreenRecorder>,
}

impl RecorderBridge {
    pub fn new(recorder: Arc<ScreenRecorder>) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &Arc<ScreenRecorder> {
        &self.recorder
    }

    pub async fn handle(&self, call: MethodCall) -> BridgeReply {
        debug!("Bridge call: {}", call.method);

        match call.method.as_str() {
            START_RECORDING => self.start(&call.arguments).await,
            STOP_RECORDING => self.stop(),
            PAUSE_RECORDING => match self.recorder.pause_recording() {
                Ok(()) => BridgeReply::success(Value::Null),
                Err(e) => failure(ErrorCode::PauseFailed, &e),
            },
            RESUME_RECORDING => match self.recorder.resume_recording() {
                Ok(()) => BridgeReply::success(Value::Null),
                Err(e) => failure(ErrorCode::ResumeFailed, &e),
            },
            GET_STATUS => BridgeReply::success(self.recorder.status().as_str()),
            other => {
                warn!("Unknown bridge method: {}", other);
                BridgeReply::NotImplemented
            }
        }
    }

    async fn start(&self, arguments: &Value) -> BridgeReply {
        let request = parse_start_arguments(arguments);
        match self.recorder.start_recording(request).await {
            Ok(_) => BridgeReply::success(Value::Null),
            Err(e) => failure(ErrorCode::for_start(&e), &e),
        }
    }

    fn stop(&self) -> BridgeReply {
        let Some(stopped) = self.recorder.stop_recording() else {
            return BridgeReply::success(Value::Null);
        };

        let path = stopped.output_path.to_string_lossy().into_owned();
        match stopped.stop_error {
            None => BridgeReply::success(path),
            Some(e) => BridgeReply::Error {
                code: ErrorCode::StopFailed,
                message: e.to_string(),
                details: json!({ "path": path }),
            },
        }
    }
}

fn failure(code: ErrorCode, err: &RecorderError) -> BridgeReply {
    warn!("{} ({})", err, code);
    BridgeReply::error(code, err.to_string())
}

/// Read `startRecording` arguments, ignoring keys of the wrong type
pub fn parse_start_arguments(arguments: &Value) -> RecordingRequest {
    let empty = Map::new();
    let args = arguments.as_object().unwrap_or(&empty);

    let int = |key: &str| {
        args.get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };

    RecordingRequest {
        width: int("width"),
        height: int("height"),
        fps: int("fps"),
        bitrate: int("bitrate"),
        include_microphone_audio: Some(
            args.get("includeMicrophoneAudio")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        ),
    }
}
