//! Platform seam for screen capture
//!
//! The recording session never touches OS resources directly. Everything it
//! acquires (capture projection, encoder, virtual display) comes through the
//! traits in this module, so the session's ordering and rollback rules hold
//! for any backend.

use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::grant::{ConsentResponder, ProjectionToken};
use super::settings::{DeviceMetrics, RecordingConfig};

/// Platform features resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Whether the encoder can be suspended and resumed in place
    pub pause_resume: bool,
}

/// Entry point to the host platform's capture facilities
pub trait CapturePlatform: Send + Sync {
    /// Report platform features. Called once when the recorder is built.
    fn capabilities(&self) -> Capabilities;

    /// Current display metrics of the device
    fn display_metrics(&self) -> Result<DeviceMetrics>;

    /// Launch the consent flow and return immediately.
    ///
    /// The outcome must be delivered later through `responder`, from any
    /// thread. Dropping the responder unanswered counts as a cancellation.
    fn launch_consent(&self, responder: ConsentResponder) -> Result<()>;

    /// Instantiate the capture projection authorized by `token`
    fn open_projection(&self, token: &ProjectionToken) -> Result<Box<dyn ScreenProjection>>;

    /// Create an (unprepared) encoder writing to `output_path`
    fn create_encoder(
        &self,
        output_path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn EncoderSink>>;
}

/// An authorized capture of the device screen
pub trait ScreenProjection: Send {
    /// Create a virtual display that mirrors the screen into `surface`
    fn create_virtual_display(
        &mut self,
        spec: &VirtualDisplaySpec,
        surface: &InputSurface,
    ) -> Result<Box<dyn VirtualDisplay>>;

    /// Revoke the projection. Called exactly once.
    fn stop(&mut self) -> Result<()>;
}

/// Consumes captured frames (and optionally microphone audio) into a file
pub trait EncoderSink: Send {
    /// Validate the configuration and expose the input surface
    fn prepare(&mut self) -> Result<InputSurface>;
    /// Begin producing output. Requires a producer bound to the surface.
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    /// Stop producing output and finalize the container
    fn stop(&mut self) -> Result<()>;
    /// Free the encoder and its buffers. Must be safe after a failed stop.
    fn release(&mut self) -> Result<()>;
}

/// A platform mirror surface feeding an encoder's input surface
pub trait VirtualDisplay: Send {
    fn name(&self) -> &str;
    fn release(&mut self) -> Result<()>;
}

/// Parameters for creating a virtual display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisplaySpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    /// Keep mirroring while the host app is in the background
    pub auto_mirror: bool,
}

/// What a virtual display attached to an input surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub display_name: String,
    /// Backend-specific description of the pixel source
    pub source_args: Vec<String>,
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// The input side of a prepared encoder
///
/// Cloned handles share one binding slot: the virtual display attaches to it
/// and the encoder reads it when it starts.
#[derive(Debug, Clone)]
pub struct InputSurface {
    id: u64,
    width: u32,
    height: u32,
    binding: Arc<Mutex<Option<SurfaceBinding>>>,
}

impl InputSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            binding: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Attach a producer. Fails if one is already attached.
    pub fn attach(&self, binding: SurfaceBinding) -> Result<()> {
        let mut slot = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            anyhow::bail!(
                "Surface {} is already bound to display '{}'",
                self.id,
                existing.display_name
            );
        }
        *slot = Some(binding);
        Ok(())
    }

    pub fn detach(&self) -> Option<SurfaceBinding> {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn binding(&self) -> Option<SurfaceBinding> {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_bound(&self) -> bool {
        self.binding().is_some()
    }
}
