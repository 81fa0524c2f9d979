//! Output file naming for recordings

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Subdirectory of the base directory that holds recordings
pub const RECORDINGS_DIR: &str = "recordings";

const FILE_PREFIX: &str = "easyrec_";
const FILE_EXTENSION: &str = "mp4";

/// Generates unique `recordings/easyrec_<millis>.mp4` paths
///
/// The millisecond stamp is forced to increase strictly within the process,
/// so two calls in the same millisecond still get distinct names.
#[derive(Debug, Default)]
pub struct OutputFileNamer {
    last_stamp: AtomicI64,
}

impl OutputFileNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `base_directory/recordings` exists and return a fresh path in it
    pub fn next_path(&self, base_directory: &Path) -> std::io::Result<PathBuf> {
        let dir = base_directory.join(RECORDINGS_DIR);
        if !dir.exists() {
            debug!("Creating recordings directory {:?}", dir);
            std::fs::create_dir_all(&dir)?;
        }

        let stamp = self.next_stamp(chrono::Utc::now().timestamp_millis());
        Ok(dir.join(format!("{}{}.{}", FILE_PREFIX, stamp, FILE_EXTENSION)))
    }

    fn next_stamp(&self, now_ms: i64) -> i64 {
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }
}
