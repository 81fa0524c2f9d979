//! Screen-capture authorization
//!
//! The platform's consent flow completes out-of-band: `request_grant` returns
//! at once and the answer arrives later through a [`ConsentResponder`], on
//! whatever thread the platform uses. The broker keeps a single pending slot
//! so at most one request is outstanding per process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::platform::{CapturePlatform, InputSurface, ScreenProjection, VirtualDisplay, VirtualDisplaySpec};
use crate::error::{DenialReason, RecorderError, Result};

/// Opaque credential issued by the platform when the user consents
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionToken(String);

impl ProjectionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep credentials out of logs
        write!(f, "ProjectionToken(..{})", self.0.len())
    }
}

/// Outcome reported by the consent flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentResult {
    Granted,
    Denied,
    Cancelled,
}

/// Raw platform response to a consent request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentPayload {
    pub result: ConsentResult,
    pub token: Option<ProjectionToken>,
}

impl ConsentPayload {
    pub fn granted(token: ProjectionToken) -> Self {
        Self {
            result: ConsentResult::Granted,
            token: Some(token),
        }
    }

    pub fn denied() -> Self {
        Self {
            result: ConsentResult::Denied,
            token: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            result: ConsentResult::Cancelled,
            token: None,
        }
    }
}

type PendingSlot = Arc<Mutex<Option<u64>>>;

fn lock_slot(slot: &PendingSlot) -> std::sync::MutexGuard<'_, Option<u64>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frees the pending slot if it still belongs to `request_id`
fn clear_slot(slot: &PendingSlot, request_id: u64) {
    let mut pending = lock_slot(slot);
    if *pending == Some(request_id) {
        *pending = None;
    }
}

/// One-shot channel back from the platform's consent flow
pub struct ConsentResponder {
    request_id: u64,
    slot: PendingSlot,
    tx: Option<oneshot::Sender<ConsentPayload>>,
}

impl ConsentResponder {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Deliver the consent outcome. Safe to call from any thread.
    pub fn respond(mut self, payload: ConsentPayload) {
        clear_slot(&self.slot, self.request_id);
        if let Some(tx) = self.tx.take() {
            if tx.send(payload).is_err() {
                // The caller stopped waiting; nothing was acquired yet.
                debug!(
                    "Consent outcome for request {} arrived after the caller went away",
                    self.request_id
                );
            }
        }
    }
}

impl Drop for ConsentResponder {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(
                "Consent request {} dropped without an answer; treating as cancelled",
                self.request_id
            );
            clear_slot(&self.slot, self.request_id);
        }
    }
}

impl fmt::Debug for ConsentResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentResponder")
            .field("request_id", &self.request_id)
            .field("answered", &self.tx.is_none())
            .finish()
    }
}

/// A consent request awaiting its outcome
#[derive(Debug)]
pub struct PendingGrant {
    request_id: u64,
    rx: oneshot::Receiver<ConsentPayload>,
}

impl PendingGrant {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the platform's answer. There is no timeout.
    pub async fn outcome(self) -> Result<ConsentPayload> {
        self.rx
            .await
            .map_err(|_| RecorderError::GrantDenied(DenialReason::Cancelled))
    }
}

/// Issues consent requests and turns their answers into grants
#[derive(Debug, Default)]
pub struct CaptureGrantBroker {
    slot: PendingSlot,
    next_request_id: AtomicU64,
}

impl CaptureGrantBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a consent request is outstanding
    pub fn is_pending(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Ask the platform for capture consent without waiting for the answer
    pub fn request_grant(&self, platform: &dyn CapturePlatform) -> Result<PendingGrant> {
        let request_id = {
            let mut pending = lock_slot(&self.slot);
            if let Some(existing) = *pending {
                debug!("Rejecting consent request: request {} is pending", existing);
                return Err(RecorderError::RequestInProgress);
            }
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
            *pending = Some(id);
            id
        };

        let (tx, rx) = oneshot::channel();
        let responder = ConsentResponder {
            request_id,
            slot: Arc::clone(&self.slot),
            tx: Some(tx),
        };

        info!("Requesting screen capture consent (request {})", request_id);
        if let Err(e) = platform.launch_consent(responder) {
            warn!("Failed to launch consent flow: {:#}", e);
            clear_slot(&self.slot, request_id);
            return Err(RecorderError::start_failed(e));
        }

        Ok(PendingGrant { request_id, rx })
    }

    /// Convert a platform response into a grant, or a denial
    pub fn resolve_grant(
        &self,
        platform: &dyn CapturePlatform,
        payload: ConsentPayload,
    ) -> Result<CaptureGrant> {
        let token = match (payload.result, payload.token) {
            (ConsentResult::Granted, Some(token)) => token,
            (ConsentResult::Granted, None) => {
                return Err(RecorderError::GrantDenied(DenialReason::MissingToken))
            }
            (ConsentResult::Denied, _) => {
                return Err(RecorderError::GrantDenied(DenialReason::Rejected))
            }
            (ConsentResult::Cancelled, _) => {
                return Err(RecorderError::GrantDenied(DenialReason::Cancelled))
            }
        };

        let projection = platform.open_projection(&token).map_err(|e| {
            RecorderError::GrantDenied(DenialReason::ProjectionUnavailable(format!("{:#}", e)))
        })?;

        info!("Screen capture granted");
        Ok(CaptureGrant {
            token,
            projection: Some(projection),
            issued_at: Utc::now(),
        })
    }
}

/// A live capture authorization
///
/// Single-use and exclusively owned. Dropping an unreleased grant releases it.
pub struct CaptureGrant {
    token: ProjectionToken,
    projection: Option<Box<dyn ScreenProjection>>,
    issued_at: DateTime<Utc>,
}

impl CaptureGrant {
    /// Wrap an already opened projection
    pub fn new(token: ProjectionToken, projection: Box<dyn ScreenProjection>) -> Self {
        Self {
            token,
            projection: Some(projection),
            issued_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &ProjectionToken {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_released(&self) -> bool {
        self.projection.is_none()
    }

    /// Bind a virtual display to an encoder input surface
    pub fn bind_display(
        &mut self,
        spec: &VirtualDisplaySpec,
        surface: &InputSurface,
    ) -> anyhow::Result<Box<dyn VirtualDisplay>> {
        let projection = self
            .projection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Capture grant already released"))?;
        projection.create_virtual_display(spec, surface)
    }

    /// Revoke the underlying projection
    pub fn release(&mut self) -> anyhow::Result<()> {
        match self.projection.take() {
            Some(mut projection) => {
                debug!("Releasing capture grant issued at {}", self.issued_at);
                projection.stop()
            }
            None => Ok(()),
        }
    }
}

impl Drop for CaptureGrant {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Error releasing capture grant: {:#}", e);
        }
    }
}

impl fmt::Debug for CaptureGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGrant")
            .field("token", &self.token)
            .field("released", &self.is_released())
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::platform::{Capabilities, EncoderSink};
    use crate::capture::settings::{DeviceMetrics, RecordingConfig};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// Parks responders so tests can answer them later
    #[derive(Default)]
    struct ParkingPlatform {
        parked: Mutex<Vec<ConsentResponder>>,
        fail_launch: bool,
        stops: Arc<AtomicUsize>,
    }

    struct CountingProjection {
        stops: Arc<AtomicUsize>,
    }

    impl ScreenProjection for CountingProjection {
        fn create_virtual_display(
            &mut self,
            _spec: &VirtualDisplaySpec,
            _surface: &InputSurface,
        ) -> anyhow::Result<Box<dyn VirtualDisplay>> {
            anyhow::bail!("not used")
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl CapturePlatform for ParkingPlatform {
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        fn display_metrics(&self) -> anyhow::Result<DeviceMetrics> {
            anyhow::bail!("not used")
        }

        fn launch_consent(&self, responder: ConsentResponder) -> anyhow::Result<()> {
            if self.fail_launch {
                anyhow::bail!("no activity to host the consent dialog");
            }
            self.parked.lock().unwrap().push(responder);
            Ok(())
        }

        fn open_projection(
            &self,
            token: &ProjectionToken,
        ) -> anyhow::Result<Box<dyn ScreenProjection>> {
            if token.as_str() == "stale" {
                anyhow::bail!("token already consumed");
            }
            Ok(Box::new(CountingProjection {
                stops: Arc::clone(&self.stops),
            }))
        }

        fn create_encoder(
            &self,
            _output_path: &Path,
            _config: &RecordingConfig,
        ) -> anyhow::Result<Box<dyn EncoderSink>> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn test_second_request_fails_while_first_pending() {
        let platform = ParkingPlatform::default();
        let broker = CaptureGrantBroker::new();

        let first = broker.request_grant(&platform).unwrap();
        assert!(broker.is_pending());

        let second = broker.request_grant(&platform);
        assert!(matches!(second, Err(RecorderError::RequestInProgress)));

        let responder = platform.parked.lock().unwrap().pop().unwrap();
        responder.respond(ConsentPayload::granted(ProjectionToken::new("t1")));
        assert!(!broker.is_pending());

        let payload = first.outcome().await.unwrap();
        assert_eq!(payload.result, ConsentResult::Granted);
    }

    #[tokio::test]
    async fn test_dropped_responder_counts_as_cancellation() {
        let platform = ParkingPlatform::default();
        let broker = CaptureGrantBroker::new();

        let pending = broker.request_grant(&platform).unwrap();
        platform.parked.lock().unwrap().clear();

        assert!(!broker.is_pending());
        let err = pending.outcome().await.unwrap_err();
        assert!(err.is_user_cancellation());
    }

    #[test]
    fn test_launch_failure_frees_slot() {
        let platform = ParkingPlatform {
            fail_launch: true,
            ..Default::default()
        };
        let broker = CaptureGrantBroker::new();

        let err = broker.request_grant(&platform).unwrap_err();
        assert!(matches!(err, RecorderError::StartFailed(_)));
        assert!(!broker.is_pending());
    }

    #[test]
    fn test_resolve_denials() {
        let platform = ParkingPlatform::default();
        let broker = CaptureGrantBroker::new();

        let denied = broker.resolve_grant(&platform, ConsentPayload::denied());
        assert!(matches!(
            denied,
            Err(RecorderError::GrantDenied(DenialReason::Rejected))
        ));

        let cancelled = broker.resolve_grant(&platform, ConsentPayload::cancelled());
        assert!(matches!(
            cancelled,
            Err(RecorderError::GrantDenied(DenialReason::Cancelled))
        ));

        let no_token = ConsentPayload {
            result: ConsentResult::Granted,
            token: None,
        };
        assert!(matches!(
            broker.resolve_grant(&platform, no_token),
            Err(RecorderError::GrantDenied(DenialReason::MissingToken))
        ));

        let stale = ConsentPayload::granted(ProjectionToken::new("stale"));
        match broker.resolve_grant(&platform, stale) {
            Err(RecorderError::GrantDenied(DenialReason::ProjectionUnavailable(msg))) => {
                assert!(msg.contains("consumed"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_grant_released_once_on_drop() {
        let platform = ParkingPlatform::default();
        let broker = CaptureGrantBroker::new();

        let mut grant = broker
            .resolve_grant(&platform, ConsentPayload::granted(ProjectionToken::new("t")))
            .unwrap();
        grant.release().unwrap();
        assert!(grant.is_released());
        drop(grant);

        assert_eq!(platform.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_debug_hides_value() {
        let token = ProjectionToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret"));
    }
}
