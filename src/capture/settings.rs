//! Recording parameter resolution
//!
//! Turns a partially specified [`RecordingRequest`] into a concrete
//! [`RecordingConfig`] using the device's display metrics and fixed defaults.
//! Resolution is pure: no disk, no platform calls.

use serde::{Deserialize, Serialize};

/// Frame rate used when the request leaves it unset
pub const DEFAULT_FPS: u32 = 30;

/// Video bitrate (bits/sec) used when the request leaves it unset
pub const DEFAULT_VIDEO_BITRATE: u32 = 8_000_000;

/// AAC bitrate (bits/sec) applied whenever microphone audio is included
pub const AUDIO_BITRATE: u32 = 128_000;

/// Microphone sampling rate (Hz)
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Display metrics reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// Display width in physical pixels
    pub width: u32,
    /// Display height in physical pixels
    pub height: u32,
    /// Pixel density in dots per inch
    pub density_dpi: u32,
}

/// Caller-supplied recording parameters, any of which may be left unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    /// Video bitrate in bits/sec
    pub bitrate: Option<u32>,
    /// Whether to record the microphone (defaults to true)
    pub include_microphone_audio: Option<bool>,
}

impl RecordingRequest {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Enable microphone recording
    pub fn with_audio(mut self) -> Self {
        self.include_microphone_audio = Some(true);
        self
    }

    /// Disable microphone recording (video only)
    pub fn without_audio(mut self) -> Self {
        self.include_microphone_audio = Some(false);
        self
    }
}

/// Microphone encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// AAC bitrate in bits/sec
    pub bitrate: u32,
    /// Sampling rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bitrate: AUDIO_BITRATE,
            sample_rate: AUDIO_SAMPLE_RATE,
        }
    }
}

/// Fully resolved recording configuration, immutable once a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Video bitrate in bits/sec
    pub bitrate: u32,
    /// Density handed to the virtual display
    pub density_dpi: u32,
    /// Present when microphone audio is recorded
    pub audio: Option<AudioSettings>,
}

impl RecordingConfig {
    pub fn include_microphone_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Resolves recording requests against device metrics
pub struct SessionConfigurator;

impl SessionConfigurator {
    pub fn resolve(request: &RecordingRequest, metrics: &DeviceMetrics) -> RecordingConfig {
        let audio = request
            .include_microphone_audio
            .unwrap_or(true)
            .then(AudioSettings::default);

        RecordingConfig {
            width: request.width.unwrap_or(metrics.width),
            height: request.height.unwrap_or(metrics.height),
            fps: request.fps.unwrap_or(DEFAULT_FPS),
            bitrate: request.bitrate.unwrap_or(DEFAULT_VIDEO_BITRATE),
            density_dpi: metrics.density_dpi,
            audio,
        }
    }
}
