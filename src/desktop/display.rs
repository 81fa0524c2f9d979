//! Display metrics and screen-grab sources

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::capture::{
    DeviceMetrics, InputSurface, ProjectionToken, ScreenProjection, SurfaceBinding,
    VirtualDisplay, VirtualDisplaySpec,
};
use crate::config::DisplayConfig;

/// Used when the display cannot be probed
pub const FALLBACK_METRICS: DeviceMetrics = DeviceMetrics {
    width: 1920,
    height: 1080,
    density_dpi: 96,
};

/// Probe the primary display, then apply configured overrides
pub fn resolve_metrics(overrides: &DisplayConfig) -> DeviceMetrics {
    let probed = match probe_metrics() {
        Ok(metrics) => metrics,
        Err(e) => {
            debug!("Display probe failed ({:#}), using fallback metrics", e);
            FALLBACK_METRICS
        }
    };

    DeviceMetrics {
        width: overrides.width.unwrap_or(probed.width),
        height: overrides.height.unwrap_or(probed.height),
        density_dpi: overrides.density_dpi.unwrap_or(probed.density_dpi),
    }
}

#[cfg(target_os = "linux")]
fn probe_metrics() -> Result<DeviceMetrics> {
    let output = std::process::Command::new("xrandr")
        .arg("--current")
        .output()
        .context("Failed to run xrandr")?;
    if !output.status.success() {
        anyhow::bail!("xrandr exited with {}", output.status);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_xrandr(&stdout).context("No connected display in xrandr output")
}

#[cfg(not(target_os = "linux"))]
fn probe_metrics() -> Result<DeviceMetrics> {
    anyhow::bail!("Display probing is not implemented on this platform")
}

/// Pick the primary (or first connected) output from `xrandr --current`
fn parse_xrandr(output: &str) -> Option<DeviceMetrics> {
    let connected: Vec<&str> = output
        .lines()
        .filter(|line| line.contains(" connected"))
        .collect();
    let line = connected
        .iter()
        .find(|line| line.contains(" primary "))
        .or_else(|| connected.first())?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (width, height) = tokens.iter().find_map(|t| parse_geometry(t))?;

    // "... 344mm x 194mm"
    let width_mm = tokens
        .windows(3)
        .find(|w| w[1] == "x" && w[0].ends_with("mm") && w[2].ends_with("mm"))
        .and_then(|w| w[0].trim_end_matches("mm").parse::<u32>().ok())
        .filter(|mm| *mm > 0);

    let density_dpi = match width_mm {
        Some(mm) => ((width as f64 * 25.4) / mm as f64).round() as u32,
        None => FALLBACK_METRICS.density_dpi,
    };

    Some(DeviceMetrics {
        width,
        height,
        density_dpi,
    })
}

/// Parse `1920x1080+0+0`
fn parse_geometry(token: &str) -> Option<(u32, u32)> {
    let size = token.split('+').next()?;
    if size.len() == token.len() {
        return None;
    }
    let (w, h) = size.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// ffmpeg input arguments that grab the whole screen at native size
pub fn grab_source_args(native: &DeviceMetrics) -> Vec<String> {
    let size = format!("{}x{}", native.width, native.height);

    #[cfg(target_os = "linux")]
    {
        let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
        return vec![
            "-f".into(),
            "x11grab".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            display,
        ];
    }

    #[cfg(target_os = "macos")]
    {
        let _ = size;
        return vec![
            "-f".into(),
            "avfoundation".into(),
            "-capture_cursor".into(),
            "1".into(),
            "-i".into(),
            "Capture screen 0:none".into(),
        ];
    }

    #[cfg(target_os = "windows")]
    {
        return vec![
            "-f".into(),
            "gdigrab".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            "desktop".into(),
        ];
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        return vec![
            "-f".into(),
            "x11grab".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            ":0".into(),
        ];
    }
}

/// Screen capture authorized by a redeemed token
pub struct DesktopProjection {
    token: ProjectionToken,
    native: DeviceMetrics,
    stopped: bool,
}

impl DesktopProjection {
    pub fn new(token: ProjectionToken, native: DeviceMetrics) -> Self {
        Self {
            token,
            native,
            stopped: false,
        }
    }
}

impl ScreenProjection for DesktopProjection {
    fn create_virtual_display(
        &mut self,
        spec: &VirtualDisplaySpec,
        surface: &InputSurface,
    ) -> Result<Box<dyn VirtualDisplay>> {
        if self.stopped {
            anyhow::bail!("Projection has been stopped");
        }

        surface.attach(SurfaceBinding {
            display_name: spec.name.clone(),
            source_args: grab_source_args(&self.native),
        })?;

        info!(
            "Virtual display '{}' mirrors {}x{} into {}x{} @ {} dpi",
            spec.name,
            self.native.width,
            self.native.height,
            spec.width,
            spec.height,
            spec.density_dpi
        );

        Ok(Box::new(DesktopVirtualDisplay {
            name: spec.name.clone(),
            surface: Some(surface.clone()),
        }))
    }

    fn stop(&mut self) -> Result<()> {
        if self.stopped {
            warn!("Projection {:?} stopped twice", self.token);
        }
        self.stopped = true;
        debug!("Projection {:?} stopped", self.token);
        Ok(())
    }
}

pub struct DesktopVirtualDisplay {
    name: String,
    surface: Option<InputSurface>,
}

impl VirtualDisplay for DesktopVirtualDisplay {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if let Some(surface) = self.surface.take() {
            surface.detach();
            debug!("Virtual display '{}' released", self.name);
        }
        Ok(())
    }
}
