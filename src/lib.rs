//! EasyRec screen recorder
//!
//! Records the screen (and optionally the microphone) to an MP4 file after
//! the user grants capture consent. [`capture`] holds the platform-neutral
//! recording lifecycle, [`desktop`] the ffmpeg backend, and [`bridge`] the
//! method-call surface the host speaks.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod desktop;
pub mod error;
pub mod logging;
