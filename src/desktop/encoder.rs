//! ffmpeg-backed encoder
//!
//! The encoder is a child `ffmpeg` process reading the screen-grab source
//! bound to its input surface. It is finalized by sending `q` on stdin, which
//! lets ffmpeg write the MP4 index before exiting.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::{EncoderSink, InputSurface, RecordingConfig};
use crate::config::EncoderConfig;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the ffmpeg command line for one recording
#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    ffmpeg_path: String,
    output_path: PathBuf,
    config: RecordingConfig,
    video_codec: String,
    preset: String,
    audio_device: Option<String>,
    source_args: Vec<String>,
}

impl FfmpegCommandBuilder {
    pub fn new(settings: &EncoderConfig, output_path: &Path, config: &RecordingConfig) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            output_path: output_path.to_path_buf(),
            config: *config,
            video_codec: settings.video_codec.clone(),
            preset: settings.preset.clone(),
            audio_device: settings.audio_device.clone(),
            source_args: Vec::new(),
        }
    }

    /// Input arguments describing the pixel source
    pub fn source(mut self, source_args: Vec<String>) -> Self {
        self.source_args = source_args;
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let config = &self.config;
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-framerate".into(),
            config.fps.to_string(),
        ];
        args.extend(self.source_args.iter().cloned());

        if config.audio.is_some() {
            args.extend(microphone_input_args(self.audio_device.as_deref()));
        }

        args.extend([
            "-vf".into(),
            format!("scale={}:{}", config.width, config.height),
            "-c:v".into(),
            self.video_codec.clone(),
            "-preset".into(),
            self.preset.clone(),
            "-b:v".into(),
            config.bitrate.to_string(),
            "-r".into(),
            config.fps.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ]);

        match config.audio {
            Some(audio) => args.extend([
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                audio.bitrate.to_string(),
                "-ar".into(),
                audio.sample_rate.to_string(),
            ]),
            None => args.push("-an".into()),
        }

        args.extend([
            "-movflags".into(),
            "+faststart".into(),
            self.output_path.to_string_lossy().into_owned(),
        ]);
        args
    }

    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(self.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            // Unread stderr would eventually block ffmpeg
            .stderr(Stdio::null());
        cmd
    }
}

fn microphone_input_args(device: Option<&str>) -> Vec<String> {
    #[cfg(target_os = "macos")]
    {
        let device = device.unwrap_or("0");
        return vec!["-f".into(), "avfoundation".into(), "-i".into(), format!(":{}", device)];
    }

    #[cfg(target_os = "windows")]
    {
        let device = device.unwrap_or("default");
        return vec!["-f".into(), "dshow".into(), "-i".into(), format!("audio={}", device)];
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let device = device.unwrap_or("default");
        return vec!["-f".into(), "pulse".into(), "-i".into(), device.to_string()];
    }
}

/// Check that the ffmpeg binary runs
pub fn check_ffmpeg(ffmpeg_path: &str) -> Result<()> {
    let status = Command::new(ffmpeg_path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to execute ffmpeg at {:?}", ffmpeg_path))?;

    if !status.success() {
        anyhow::bail!("ffmpeg at {:?} exited with {}", ffmpeg_path, status);
    }
    debug!("ffmpeg check passed: {}", ffmpeg_path);
    Ok(())
}

pub struct FfmpegEncoder {
    settings: EncoderConfig,
    output_path: PathBuf,
    config: RecordingConfig,
    surface: Option<InputSurface>,
    child: Option<Child>,
    paused: bool,
}

impl FfmpegEncoder {
    pub fn new(settings: &EncoderConfig, output_path: &Path, config: &RecordingConfig) -> Self {
        Self {
            settings: settings.clone(),
            output_path: output_path.to_path_buf(),
            config: *config,
            surface: None,
            child: None,
            paused: false,
        }
    }

    fn child(&self) -> Result<&Child> {
        self.child.as_ref().context("Encoder is not running")
    }
}

/// Poll `child` until it exits. On timeout, or when its status cannot be
/// read, the child is killed and reaped before the error is returned.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(child);
                return Err(e).context("Failed to poll ffmpeg");
            }
        }
        if Instant::now() >= deadline {
            kill_and_reap(child);
            anyhow::bail!("ffmpeg did not finish within {} ms", timeout.as_millis());
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill({}) failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap ffmpeg (pid {}): {}", child.id(), e);
    }
}

impl EncoderSink for FfmpegEncoder {
    fn prepare(&mut self) -> Result<InputSurface> {
        let (width, height) = (self.config.width, self.config.height);
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            anyhow::bail!(
                "H.264 needs non-zero even dimensions, got {}x{}",
                width,
                height
            );
        }
        if self.config.fps == 0 || self.config.bitrate == 0 {
            anyhow::bail!(
                "Invalid encoder rate: {} fps at {} bps",
                self.config.fps,
                self.config.bitrate
            );
        }

        check_ffmpeg(&self.settings.ffmpeg_path)?;

        let surface = InputSurface::new(width, height);
        self.surface = Some(surface.clone());
        Ok(surface)
    }

    fn start(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("Encoder was not prepared")?;
        let binding = surface
            .binding()
            .context("No display is bound to the encoder input")?;

        let builder = FfmpegCommandBuilder::new(&self.settings, &self.output_path, &self.config)
            .source(binding.source_args);
        debug!("ffmpeg args: {:?}", builder.build_args());

        let mut child = builder
            .build()
            .spawn()
            .with_context(|| format!("Failed to spawn ffmpeg at {:?}", self.settings.ffmpeg_path))?;

        std::thread::sleep(Duration::from_millis(self.settings.startup_grace_ms));
        if let Some(status) = child.try_wait()? {
            anyhow::bail!("ffmpeg exited during startup with {}", status);
        }

        info!(
            "ffmpeg started (pid {}) -> {:?}",
            child.id(),
            self.output_path
        );
        self.child = Some(child);
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        signal::suspend(self.child()?)?;
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        signal::resume(self.child()?)?;
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if self.paused {
            if let Err(e) = signal::resume(&child) {
                warn!("Failed to wake paused ffmpeg before stop: {:#}", e);
            }
            self.paused = false;
        }

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").and_then(|_| stdin.flush()) {
                warn!("Failed to ask ffmpeg to quit: {}", e);
            }
        }

        let timeout = Duration::from_millis(self.settings.stop_timeout_ms);
        let status = wait_or_kill(&mut child, timeout)
            .with_context(|| format!("{:?} may be corrupt", self.output_path))?;
        if !status.success() {
            anyhow::bail!(
                "ffmpeg exited with {}; {:?} may be corrupt",
                status,
                self.output_path
            );
        }
        info!("ffmpeg finalized {:?}", self.output_path);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            warn!("Killing ffmpeg (pid {}) on release", child.id());
            kill_and_reap(&mut child);
        }
        self.surface = None;
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(unix)]
mod signal {
    use anyhow::{Context, Result};
    use std::process::Child;

    fn send(child: &Child, sig: libc::c_int) -> Result<()> {
        let pid = child.id() as libc::pid_t;
        let rc = unsafe { libc::kill(pid, sig) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to signal ffmpeg (pid {})", pid));
        }
        Ok(())
    }

    pub fn suspend(child: &Child) -> Result<()> {
        send(child, libc::SIGSTOP)
    }

    pub fn resume(child: &Child) -> Result<()> {
        send(child, libc::SIGCONT)
    }
}

#[cfg(not(unix))]
mod signal {
    use anyhow::Result;
    use std::process::Child;

    pub fn suspend(_child: &Child) -> Result<()> {
        anyhow::bail!("Pausing ffmpeg is not supported on this platform")
    }

    pub fn resume(_child: &Child) -> Result<()> {
        anyhow::bail!("Resuming ffmpeg is not supported on this platform")
    }
}
