//! Desktop capture backend
//!
//! Implements [`CapturePlatform`] with an operator consent prompt, a
//! screen-grab "virtual display" and an ffmpeg encoder process.

mod consent;
mod display;
mod encoder;

pub use consent::ConsentPrompt;
pub use display::{
    grab_source_args, resolve_metrics, DesktopProjection, DesktopVirtualDisplay, FALLBACK_METRICS,
};
pub use encoder::{check_ffmpeg, FfmpegCommandBuilder, FfmpegEncoder};

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::capture::{
    Capabilities, CapturePlatform, ConsentResponder, DeviceMetrics, EncoderSink, ProjectionToken,
    RecordingConfig, ScreenProjection,
};
use crate::config::{Config, DisplayConfig, EncoderConfig};

pub struct DesktopPlatform {
    encoder: EncoderConfig,
    display: DisplayConfig,
    consent: ConsentPrompt,
    capabilities: Capabilities,
}

impl DesktopPlatform {
    pub fn new(config: &Config) -> Self {
        let capabilities = Capabilities {
            pause_resume: config.capabilities.pause_resume.unwrap_or(cfg!(unix)),
        };
        info!(
            "Desktop capture backend: ffmpeg={}, auto_grant={}",
            config.encoder.ffmpeg_path, config.consent.auto_grant
        );

        Self {
            encoder: config.encoder.clone(),
            display: config.display.clone(),
            consent: ConsentPrompt::new(config.consent.auto_grant),
            capabilities,
        }
    }

    /// Answer the waiting consent request. Returns false if none is waiting.
    pub fn answer_consent(&self, allow: bool) -> bool {
        self.consent.answer(allow)
    }

    /// Cancel the waiting consent request, if any
    pub fn dismiss_consent(&self) -> bool {
        self.consent.dismiss()
    }

    pub fn is_awaiting_consent(&self) -> bool {
        self.consent.is_waiting()
    }
}

impl CapturePlatform for DesktopPlatform {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn display_metrics(&self) -> Result<DeviceMetrics> {
        Ok(resolve_metrics(&self.display))
    }

    fn launch_consent(&self, responder: ConsentResponder) -> Result<()> {
        self.consent.launch(responder)
    }

    fn open_projection(&self, token: &ProjectionToken) -> Result<Box<dyn ScreenProjection>> {
        self.consent.redeem(token)?;
        let native = resolve_metrics(&DisplayConfig::default());
        Ok(Box::new(DesktopProjection::new(token.clone(), native)))
    }

    fn create_encoder(
        &self,
        output_path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn EncoderSink>> {
        Ok(Box::new(FfmpegEncoder::new(&self.encoder, output_path, config)))
    }
}
