//! Process-wide screen recorder
//!
//! Ties the consent broker, parameter resolution and the single
//! [`RecordingSession`] together. The session sits behind a mutex that is
//! only held for synchronous work, never across the consent await. Platform
//! calls under that mutex may block (process spawn, encoder finalize), so
//! they run through [`blocking`], and `status` reads a published copy of the
//! state instead of taking the lock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{broadcast, watch};
use tracing::info;

use super::grant::CaptureGrantBroker;
use super::platform::{Capabilities, CapturePlatform};
use super::session::{RecorderState, RecordingSession, StoppedRecording};
use super::settings::{RecordingRequest, SessionConfigurator};
use super::RecorderEvent;
use crate::error::{RecorderError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 16;

pub struct ScreenRecorder {
    platform: Arc<dyn CapturePlatform>,
    broker: CaptureGrantBroker,
    session: Mutex<RecordingSession>,
    capabilities: Capabilities,
    events: broadcast::Sender<RecorderEvent>,
    state: watch::Sender<RecorderState>,
}

impl ScreenRecorder {
    /// Build the recorder, resolving platform capabilities once
    pub fn new(platform: Arc<dyn CapturePlatform>, base_directory: PathBuf) -> Self {
        let capabilities = platform.capabilities();
        info!(
            "Screen recorder ready (recordings under {:?}, pause/resume: {})",
            base_directory, capabilities.pause_resume
        );

        let session = RecordingSession::new(Arc::clone(&platform), base_directory, capabilities);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(session.status());

        Self {
            platform,
            broker: CaptureGrantBroker::new(),
            session: Mutex::new(session),
            capabilities,
            events,
            state,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Current state. Never waits on an in-flight start or stop.
    pub fn status(&self) -> RecorderState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn watch_status(&self) -> watch::Receiver<RecorderState> {
        self.state.subscribe()
    }

    /// Whether a consent request is waiting for the user
    pub fn is_consent_pending(&self) -> bool {
        self.broker.is_pending()
    }

    /// Request consent, then start recording once it is granted
    ///
    /// Returns after the consent flow resolves and resources are acquired.
    /// Fails fast with [`RecorderError::RequestInProgress`] while another
    /// request is waiting on the user.
    pub async fn start_recording(&self, request: RecordingRequest) -> Result<PathBuf> {
        let state = self.status();
        if state != RecorderState::Idle {
            return Err(RecorderError::IllegalState("Already recording".to_string()));
        }

        let pending = self.broker.request_grant(self.platform.as_ref())?;
        self.emit(RecorderEvent::ConsentRequested {
            request_id: pending.request_id(),
        });

        let payload = pending.outcome().await?;
        let grant = self.broker.resolve_grant(self.platform.as_ref(), payload)?;

        // A failure from here on drops the grant, which releases it
        let active = blocking(|| {
            let metrics = self
                .platform
                .display_metrics()
                .map_err(RecorderError::start_failed)?;
            let config = SessionConfigurator::resolve(&request, &metrics);
            self.with_session(|session| session.start(grant, config))
        })?;
        self.emit(RecorderEvent::Started {
            session_id: active.session_id,
            output_path: active.output_path.clone(),
        });
        Ok(active.output_path)
    }

    pub fn pause_recording(&self) -> Result<()> {
        blocking(|| self.with_session(RecordingSession::pause))?;
        self.emit(RecorderEvent::Paused);
        Ok(())
    }

    pub fn resume_recording(&self) -> Result<()> {
        blocking(|| self.with_session(RecordingSession::resume))?;
        self.emit(RecorderEvent::Resumed);
        Ok(())
    }

    /// Stop the current recording; `None` if nothing was recording
    pub fn stop_recording(&self) -> Option<StoppedRecording> {
        let stopped = blocking(|| self.with_session(RecordingSession::stop))?;
        self.emit(RecorderEvent::Stopped {
            session_id: stopped.session_id,
            output_path: stopped.output_path.clone(),
            clean: stopped.is_clean(),
        });
        Some(stopped)
    }

    fn session(&self) -> MutexGuard<'_, RecordingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the session and publish the resulting state
    fn with_session<T>(&self, f: impl FnOnce(&mut RecordingSession) -> T) -> T {
        let mut session = self.session();
        let result = f(&mut *session);
        self.state.send_replace(session.status());
        result
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Run blocking platform work without stalling other tasks on this worker
///
/// Uses `block_in_place` on a multi-threaded runtime; elsewhere (no runtime,
/// or a current-thread runtime) `f` simply runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
