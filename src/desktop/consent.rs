//! Terminal consent prompt
//!
//! Desktop systems have no per-request capture dialog, so the host asks the
//! operator instead. Every grant mints a fresh token that can open exactly
//! one projection. Only the newest token is valid; minting invalidates any
//! earlier one that was never redeemed.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{ConsentPayload, ConsentResponder, ProjectionToken};

#[derive(Debug, Clone, Default)]
struct TokenLedger {
    outstanding: Arc<Mutex<Option<String>>>,
}

impl TokenLedger {
    fn mint(&self) -> ProjectionToken {
        let value = Uuid::new_v4().to_string();
        if lock(&self.outstanding).replace(value.clone()).is_some() {
            debug!("Unredeemed capture token invalidated");
        }
        ProjectionToken::new(value)
    }

    fn redeem(&self, token: &ProjectionToken) -> bool {
        let mut outstanding = lock(&self.outstanding);
        if outstanding.as_deref() == Some(token.as_str()) {
            *outstanding = None;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        lock(&self.outstanding).is_none()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConsentPrompt {
    auto_grant: bool,
    parked: Mutex<Option<ConsentResponder>>,
    tokens: TokenLedger,
}

impl ConsentPrompt {
    pub fn new(auto_grant: bool) -> Self {
        Self {
            auto_grant,
            parked: Mutex::new(None),
            tokens: TokenLedger::default(),
        }
    }

    /// Start a consent flow; the answer is delivered later
    pub fn launch(&self, responder: ConsentResponder) -> Result<()> {
        if self.auto_grant {
            let tokens = self.tokens.clone();
            std::thread::Builder::new()
                .name("easyrec-consent".to_string())
                .spawn(move || {
                    info!(
                        "Screen capture auto-granted (request {})",
                        responder.request_id()
                    );
                    responder.respond(ConsentPayload::granted(tokens.mint()));
                })?;
            return Ok(());
        }

        let request_id = responder.request_id();
        if let Some(stale) = lock(&self.parked).replace(responder) {
            // Dropping it cancels the stale request
            warn!(
                "Replacing unanswered consent request {}",
                stale.request_id()
            );
        }
        info!(
            "Screen capture requested (request {}): answer 'allow' or 'deny'",
            request_id
        );
        Ok(())
    }

    /// Answer the waiting request. Returns false if nothing was waiting.
    pub fn answer(&self, allow: bool) -> bool {
        let Some(responder) = lock(&self.parked).take() else {
            return false;
        };

        let payload = if allow {
            ConsentPayload::granted(self.tokens.mint())
        } else {
            ConsentPayload::denied()
        };
        info!(
            "Consent request {} {}",
            responder.request_id(),
            if allow { "allowed" } else { "denied" }
        );
        responder.respond(payload);
        true
    }

    /// Drop the waiting request, which the caller sees as a cancellation
    pub fn dismiss(&self) -> bool {
        lock(&self.parked).take().is_some()
    }

    pub fn is_waiting(&self) -> bool {
        lock(&self.parked).is_some()
    }

    /// Consume a token. Each token opens at most one projection.
    pub fn redeem(&self, token: &ProjectionToken) -> Result<()> {
        if !self.tokens.redeem(token) {
            anyhow::bail!("Capture token is unknown or was already used");
        }
        Ok(())
    }
}
