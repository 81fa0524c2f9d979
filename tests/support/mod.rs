//! Scripted capture platform for integration tests

#![allow(dead_code)]

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use easyrec::bridge::RecorderBridge;
use easyrec::capture::{
    Capabilities, CapturePlatform, ConsentPayload, ConsentResponder, DeviceMetrics, EncoderSink,
    InputSurface, ProjectionToken, RecordingConfig, ScreenProjection, ScreenRecorder,
    SurfaceBinding, VirtualDisplay, VirtualDisplaySpec,
};

/// How the scripted platform answers consent requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentScript {
    Grant,
    Deny,
    /// Hold the responder until the test answers it
    Park,
}

pub struct ScriptedPlatform {
    pub consent: Mutex<ConsentScript>,
    pub pause_resume: bool,
    pub metrics: DeviceMetrics,
    pub fail_encoder_start: bool,
    pub fail_encoder_stop: bool,
    /// How long the encoder takes to finalize on stop
    pub stop_delay: Duration,
    parked: Mutex<Option<ConsentResponder>>,
    /// Resources currently held (projection, encoder, display)
    live: Arc<AtomicUsize>,
    configs: Arc<Mutex<Vec<RecordingConfig>>>,
}

impl ScriptedPlatform {
    pub fn new(consent: ConsentScript) -> Self {
        Self {
            consent: Mutex::new(consent),
            pause_resume: true,
            metrics: DeviceMetrics {
                width: 1080,
                height: 2400,
                density_dpi: 420,
            },
            fail_encoder_start: false,
            fail_encoder_stop: false,
            stop_delay: Duration::ZERO,
            parked: Mutex::new(None),
            live: Arc::new(AtomicUsize::new(0)),
            configs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn without_pause_resume(mut self) -> Self {
        self.pause_resume = false;
        self
    }

    pub fn failing_encoder_start(mut self) -> Self {
        self.fail_encoder_start = true;
        self
    }

    pub fn failing_encoder_stop(mut self) -> Self {
        self.fail_encoder_stop = true;
        self
    }

    pub fn slow_encoder_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn live_resources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Configurations handed to encoders, in creation order
    pub fn encoder_configs(&self) -> Vec<RecordingConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub fn has_parked(&self) -> bool {
        self.parked.lock().unwrap().is_some()
    }

    /// Answer the parked consent request
    pub fn answer(&self, allow: bool) {
        let responder = self
            .parked
            .lock()
            .unwrap()
            .take()
            .expect("no parked consent request");
        let payload = if allow {
            ConsentPayload::granted(ProjectionToken::new("scripted"))
        } else {
            ConsentPayload::denied()
        };
        responder.respond(payload);
    }

    /// Wait for a parked consent request to appear
    pub async fn wait_for_parked(&self) {
        for _ in 0..200 {
            if self.has_parked() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("consent request was never launched");
    }
}

impl CapturePlatform for ScriptedPlatform {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            pause_resume: self.pause_resume,
        }
    }

    fn display_metrics(&self) -> Result<DeviceMetrics> {
        Ok(self.metrics)
    }

    fn launch_consent(&self, responder: ConsentResponder) -> Result<()> {
        match *self.consent.lock().unwrap() {
            ConsentScript::Grant => {
                responder.respond(ConsentPayload::granted(ProjectionToken::new("scripted")))
            }
            ConsentScript::Deny => responder.respond(ConsentPayload::denied()),
            ConsentScript::Park => *self.parked.lock().unwrap() = Some(responder),
        }
        Ok(())
    }

    fn open_projection(&self, _token: &ProjectionToken) -> Result<Box<dyn ScreenProjection>> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedProjection {
            live: Arc::clone(&self.live),
        }))
    }

    fn create_encoder(
        &self,
        output_path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn EncoderSink>> {
        self.configs.lock().unwrap().push(*config);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEncoder {
            output_path: output_path.to_path_buf(),
            config: *config,
            surface: None,
            fail_start: self.fail_encoder_start,
            fail_stop: self.fail_encoder_stop,
            stop_delay: self.stop_delay,
            live: Arc::clone(&self.live),
            released: false,
        }))
    }
}

struct ScriptedProjection {
    live: Arc<AtomicUsize>,
}

impl ScreenProjection for ScriptedProjection {
    fn create_virtual_display(
        &mut self,
        spec: &VirtualDisplaySpec,
        surface: &InputSurface,
    ) -> Result<Box<dyn VirtualDisplay>> {
        surface.attach(SurfaceBinding {
            display_name: spec.name.clone(),
            source_args: vec!["scripted".to_string()],
        })?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDisplay {
            name: spec.name.clone(),
            surface: surface.clone(),
            live: Arc::clone(&self.live),
            released: false,
        }))
    }

    fn stop(&mut self) -> Result<()> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedDisplay {
    name: String,
    surface: InputSurface,
    live: Arc<AtomicUsize>,
    released: bool,
}

impl VirtualDisplay for ScriptedDisplay {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.surface.detach();
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct ScriptedEncoder {
    output_path: PathBuf,
    config: RecordingConfig,
    surface: Option<InputSurface>,
    fail_start: bool,
    fail_stop: bool,
    stop_delay: Duration,
    live: Arc<AtomicUsize>,
    released: bool,
}

impl EncoderSink for ScriptedEncoder {
    fn prepare(&mut self) -> Result<InputSurface> {
        let surface = InputSurface::new(self.config.width, self.config.height);
        self.surface = Some(surface.clone());
        Ok(surface)
    }

    fn start(&mut self) -> Result<()> {
        let bound = self.surface.as_ref().map(InputSurface::is_bound);
        if bound != Some(true) {
            anyhow::bail!("encoder started without a bound display");
        }
        // Muxers create the file as soon as they start
        std::fs::write(&self.output_path, b"")?;
        if self.fail_start {
            anyhow::bail!("scripted encoder start failure");
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        std::thread::sleep(self.stop_delay);
        if self.fail_stop {
            anyhow::bail!("scripted muxer failed to write the index");
        }
        std::fs::write(&self.output_path, b"mp4")?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Recorder plus bridge over a scripted platform
pub struct Harness {
    pub platform: Arc<ScriptedPlatform>,
    pub recorder: Arc<ScreenRecorder>,
    pub bridge: RecorderBridge,
    pub base: tempfile::TempDir,
}

impl Harness {
    pub fn new(platform: ScriptedPlatform) -> Self {
        let base = tempfile::TempDir::new().unwrap();
        let platform = Arc::new(platform);
        let recorder = Arc::new(ScreenRecorder::new(
            platform.clone(),
            base.path().to_path_buf(),
        ));
        let bridge = RecorderBridge::new(recorder.clone());
        Self {
            platform,
            recorder,
            bridge,
            base,
        }
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.base.path().join("recordings")
    }

    /// Files currently under `recordings/`
    pub fn recorded_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.recordings_dir()) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
