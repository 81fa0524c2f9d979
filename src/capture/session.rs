//! Recording session state machine
//!
//! Owns the capture grant, the encoder and the virtual display for the
//! lifetime of one recording. Resources are acquired in a fixed order
//! (output path, prepared encoder, virtual display, encoder start) and torn
//! down in reverse. A failed start releases everything it acquired, so the
//! session is only ever observed fully resourced (Recording/Paused) or empty
//! (Idle).

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::grant::CaptureGrant;
use super::naming::OutputFileNamer;
use super::platform::{Capabilities, CapturePlatform, EncoderSink, VirtualDisplay, VirtualDisplaySpec};
use super::settings::RecordingConfig;
use crate::error::{RecorderError, Result};

/// Name given to the mirror display
pub const VIRTUAL_DISPLAY_NAME: &str = "EasyRecRecorder";

/// Externally observable recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Paused,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
        }
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about the recording in progress
#[derive(Debug, Clone)]
pub struct ActiveRecording {
    /// Unique session ID
    pub session_id: Uuid,
    /// Output file path
    pub output_path: PathBuf,
    /// Configuration the encoder was built with
    pub config: RecordingConfig,
    pub started_at: DateTime<Utc>,
}

/// Result of stopping a recording
#[derive(Debug)]
pub struct StoppedRecording {
    pub session_id: Uuid,
    pub output_path: PathBuf,
    pub duration: chrono::Duration,
    /// Set when the encoder failed to finalize; the file may be unusable
    pub stop_error: Option<RecorderError>,
}

impl StoppedRecording {
    pub fn is_clean(&self) -> bool {
        self.stop_error.is_none()
    }
}

/// Everything a live recording holds. Present as a whole or not at all.
struct HeldResources {
    grant: CaptureGrant,
    encoder: Box<dyn EncoderSink>,
    display: Box<dyn VirtualDisplay>,
}

/// The single recording session of the process
pub struct RecordingSession {
    platform: Arc<dyn CapturePlatform>,
    base_directory: PathBuf,
    namer: OutputFileNamer,
    capabilities: Capabilities,
    state: RecorderState,
    resources: Option<HeldResources>,
    active: Option<ActiveRecording>,
}

impl RecordingSession {
    pub fn new(
        platform: Arc<dyn CapturePlatform>,
        base_directory: PathBuf,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            platform,
            base_directory,
            namer: OutputFileNamer::new(),
            capabilities,
            state: RecorderState::Idle,
            resources: None,
            active: None,
        }
    }

    pub fn status(&self) -> RecorderState {
        self.state
    }

    pub fn active(&self) -> Option<&ActiveRecording> {
        self.active.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Start recording with an issued grant and a resolved configuration
    ///
    /// Only valid from Idle. On failure every resource acquired by this call
    /// is released, including `grant`, and the session stays Idle.
    pub fn start(&mut self, mut grant: CaptureGrant, config: RecordingConfig) -> Result<ActiveRecording> {
        if self.state != RecorderState::Idle {
            warn!("Refusing to start: session is {}", self.state);
            log_release("capture grant", grant.release());
            return Err(RecorderError::IllegalState("Already recording".to_string()));
        }

        let output_path = match self.namer.next_path(&self.base_directory) {
            Ok(path) => path,
            Err(e) => return Err(abandon_start(grant, None, RecorderError::Io(e))),
        };

        info!(
            "Starting recording to {:?} ({}x{} @ {} fps, {} bps, audio: {})",
            output_path,
            config.width,
            config.height,
            config.fps,
            config.bitrate,
            config.include_microphone_audio()
        );

        let (encoder, display) = match self.acquire_pipeline(&mut grant, &output_path, &config) {
            Ok(parts) => parts,
            Err(e) => return Err(abandon_start(grant, Some(&output_path), e)),
        };

        let active = ActiveRecording {
            session_id: Uuid::new_v4(),
            output_path,
            config,
            started_at: Utc::now(),
        };

        self.resources = Some(HeldResources {
            grant,
            encoder,
            display,
        });
        self.active = Some(active.clone());
        self.state = RecorderState::Recording;

        info!("Recording session {} started", active.session_id);
        Ok(active)
    }

    /// Create, prepare and start the encoder with a display bound to it
    fn acquire_pipeline(
        &self,
        grant: &mut CaptureGrant,
        output_path: &Path,
        config: &RecordingConfig,
    ) -> Result<(Box<dyn EncoderSink>, Box<dyn VirtualDisplay>)> {
        let mut encoder = self
            .platform
            .create_encoder(output_path, config)
            .context("Failed to create encoder")?;

        let surface = match encoder.prepare() {
            Ok(surface) => surface,
            Err(e) => {
                log_release("encoder", encoder.release());
                return Err(e.context("Failed to prepare encoder").into());
            }
        };
        debug!("Encoder prepared with input surface {}", surface.id());

        let spec = VirtualDisplaySpec {
            name: VIRTUAL_DISPLAY_NAME.to_string(),
            width: config.width,
            height: config.height,
            density_dpi: config.density_dpi,
            auto_mirror: true,
        };

        let mut display = match grant.bind_display(&spec, &surface) {
            Ok(display) => display,
            Err(e) => {
                log_release("encoder", encoder.release());
                return Err(e.context("Failed to create virtual display").into());
            }
        };
        let display_name = display.name().to_string();
        debug!("Virtual display '{}' bound", display_name);

        if let Err(e) = encoder.start() {
            log_release("virtual display", display.release());
            log_release("encoder", encoder.release());
            return Err(e.context("Failed to start encoder").into());
        }

        Ok((encoder, display))
    }

    /// Suspend the encoder without releasing anything
    pub fn pause(&mut self) -> Result<()> {
        if !self.capabilities.pause_resume {
            return Err(RecorderError::UnsupportedOperation(
                "Pause is not supported on this platform".to_string(),
            ));
        }
        if self.state != RecorderState::Recording {
            return Err(RecorderError::UnsupportedOperation(format!(
                "Cannot pause while {}",
                self.state
            )));
        }

        info!("Pausing recording");
        self.encoder_mut()?
            .pause()
            .context("Failed to pause encoder")?;

        self.state = RecorderState::Paused;
        Ok(())
    }

    /// Resume a paused encoder
    pub fn resume(&mut self) -> Result<()> {
        if !self.capabilities.pause_resume {
            return Err(RecorderError::UnsupportedOperation(
                "Resume is not supported on this platform".to_string(),
            ));
        }
        if self.state != RecorderState::Paused {
            return Err(RecorderError::UnsupportedOperation(format!(
                "Cannot resume while {}",
                self.state
            )));
        }

        info!("Resuming recording");
        self.encoder_mut()?
            .resume()
            .context("Failed to resume encoder")?;

        self.state = RecorderState::Recording;
        Ok(())
    }

    fn encoder_mut(&mut self) -> Result<&mut Box<dyn EncoderSink>> {
        self.resources
            .as_mut()
            .map(|held| &mut held.encoder)
            .ok_or_else(|| RecorderError::IllegalState("No active encoder".to_string()))
    }

    /// Stop the recording and release every resource
    ///
    /// Returns `None` from Idle. Otherwise teardown always completes and the
    /// state is forced back to Idle; an encoder stop failure is reported in
    /// [`StoppedRecording::stop_error`] next to the output path.
    pub fn stop(&mut self) -> Option<StoppedRecording> {
        if self.state == RecorderState::Idle {
            debug!("No recording in progress");
            return None;
        }

        info!("Stopping recording");
        let mut stop_error = None;

        if let Some(HeldResources {
            mut grant,
            mut encoder,
            mut display,
        }) = self.resources.take()
        {
            // Frames must stop before the display and grant go away
            if let Err(e) = encoder.stop() {
                warn!("Encoder did not stop cleanly: {:#}", e);
                stop_error = Some(RecorderError::StopFailed {
                    reason: format!("{:#}", e),
                });
            }
            log_release("encoder", encoder.release());
            log_release("virtual display", display.release());
            log_release("capture grant", grant.release());
        }

        self.state = RecorderState::Idle;

        let active = self.active.take()?;
        let duration = Utc::now() - active.started_at;
        info!(
            "Recording session {} stopped after {}s: {:?}",
            active.session_id,
            duration.num_seconds(),
            active.output_path
        );

        Some(StoppedRecording {
            session_id: active.session_id,
            output_path: active.output_path,
            duration,
            stop_error,
        })
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state != RecorderState::Idle {
            info!("Stopping recording during shutdown...");
            if let Some(stopped) = self.stop() {
                if let Some(e) = stopped.stop_error {
                    warn!("Error stopping recording during shutdown: {}", e);
                }
            }
        }
    }
}

/// Release the grant and any partial output of a failed start
fn abandon_start(
    mut grant: CaptureGrant,
    output_path: Option<&Path>,
    cause: RecorderError,
) -> RecorderError {
    warn!("Start aborted, rolling back: {}", cause);
    log_release("capture grant", grant.release());

    if let Some(path) = output_path {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove partial recording {:?}: {}", path, e);
            }
        }
    }

    RecorderError::start_failed(cause)
}

fn log_release(what: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!("Error releasing {}: {:#}", what, e);
    }
}
