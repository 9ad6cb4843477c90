//! Access-token holder shared by a storage backend and its callers.
//!
//! Every installed token carries a generation number. A refresh names the
//! generation it saw fail; if another task has already replaced that token
//! the refresh is skipped and the newer token returned. Refreshes run one
//! at a time, and a failed refresh leaves the current token untouched.

use std::future::Future;
use std::sync::RwLock;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, VeriquickError};

/// A snapshot of the installed token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub generation: u64,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct CredentialStore {
    current: RwLock<Credential>,
    refresh_token: Option<String>,
    refresh_gate: Mutex<()>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("generation", &self.current().generation)
            .field("can_refresh", &self.refresh_token.is_some())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            current: RwLock::new(Credential {
                access_token: access_token.into(),
                generation: 0,
            }),
            refresh_token,
            refresh_gate: Mutex::new(()),
        }
    }

    /// The installed token.
    pub fn current(&self) -> Credential {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Replace the token seen at `observed_generation` using `exchange`.
    ///
    /// `exchange` receives the refresh token and returns a new access token.
    /// When the generation has already moved on, `exchange` is not called.
    pub async fn refresh_if_current<F, Fut>(
        &self,
        observed_generation: u64,
        exchange: F,
    ) -> Result<Credential>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let _gate = self.refresh_gate.lock().await;

        let current = self.current();
        if current.generation != observed_generation {
            debug!(
                observed = observed_generation,
                current = current.generation,
                "Token already refreshed by another task"
            );
            return Ok(current);
        }

        let refresh_token = self.refresh_token.clone().ok_or_else(|| {
            VeriquickError::RefreshFailed("no refresh token configured".into())
        })?;

        let access_token = exchange(refresh_token).await.map_err(|e| {
            warn!(error = %e, "Credential refresh failed, keeping current token");
            match e {
                VeriquickError::RefreshFailed(_) => e,
                other => VeriquickError::RefreshFailed(other.to_string()),
            }
        })?;

        let next = Credential {
            access_token,
            generation: current.generation + 1,
        };
        match self.current.write() {
            Ok(mut guard) => *guard = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        info!(generation = next.generation, "Storage credential refreshed");
        Ok(next)
    }
}
