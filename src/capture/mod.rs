//! Screen capture recording
//!
//! This module owns the recording lifecycle: consent, parameter resolution,
//! and the single recording session that binds a virtual display to an
//! encoder. Platform resources are reached only through the traits in
//! [`platform`], so the same session logic drives any backend.

mod grant;
mod naming;
mod platform;
mod recorder;
mod session;
mod settings;

pub use grant::{
    CaptureGrant, CaptureGrantBroker, ConsentPayload, ConsentResponder, ConsentResult,
    PendingGrant, ProjectionToken,
};
pub use naming::{OutputFileNamer, RECORDINGS_DIR};
pub use platform::{
    Capabilities, CapturePlatform, EncoderSink, InputSurface, ScreenProjection, SurfaceBinding,
    VirtualDisplay, VirtualDisplaySpec,
};
pub use recorder::ScreenRecorder;
pub use session::{
    ActiveRecording, RecorderState, RecordingSession, StoppedRecording, VIRTUAL_DISPLAY_NAME,
};
pub use settings::{
    AudioSettings, DeviceMetrics, RecordingConfig, RecordingRequest, SessionConfigurator,
    AUDIO_BITRATE, AUDIO_SAMPLE_RATE, DEFAULT_FPS, DEFAULT_VIDEO_BITRATE,
};

use std::path::PathBuf;
use uuid::Uuid;

/// Events emitted by the recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// The platform consent flow was launched
    ConsentRequested { request_id: u64 },
    /// Recording started
    Started {
        session_id: Uuid,
        output_path: PathBuf,
    },
    Paused,
    Resumed,
    /// Recording stopped; `clean` is false if the encoder failed to finalize
    Stopped {
        session_id: Uuid,
        output_path: PathBuf,
        clean: bool,
    },
}
