//! Store connection lifecycle: a startup retry policy, a lazy single probe
//! when the store was not reachable, and an explicit close.

use crate::models::ClusterHealth;
use crate::traits::DocumentStore;
use crate::{SearchError, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
        }
    }
}

pub struct StoreConnection<S> {
    store: S,
    connected: AtomicBool,
    ever_connected: AtomicBool,
    closed: AtomicBool,
}

impl<S: DocumentStore> StoreConnection<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Probes the store until it answers or the policy runs out of attempts.
    pub async fn connect(&self, policy: &RetryPolicy) -> Result<ClusterHealth, SearchError> {
        let attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.probe().await {
                Ok(status) => {
                    info!(attempt, status = status.as_str(), "document store connected");
                    return Ok(status);
                }
                Err(error) => {
                    warn!(attempt, max_attempts = attempts, %error, "document store not reachable");
                    last_error = error.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(policy.backoff.delay(attempt)).await;
            }
        }

        Err(SearchError::BackendUnavailable(format!(
            "gave up after {attempts} attempts: {last_error}"
        )))
    }

    /// The store, when it is usable for a request. Makes one lazy probe if the
    /// connection is down; never loops.
    pub async fn ready(&self) -> Result<&S, SearchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SearchError::BackendUnavailable(
                "connection has been closed".to_string(),
            ));
        }

        if self.connected.load(Ordering::Acquire) {
            return Ok(&self.store);
        }

        match self.probe().await {
            Ok(_) => Ok(&self.store),
            Err(error) => {
                let reason = if self.was_ever_connected() {
                    format!("reconnect failed: {error}")
                } else {
                    format!("connection was never established: {error}")
                };
                Err(SearchError::BackendUnavailable(reason))
            }
        }
    }

    pub async fn health(&self) -> Result<ClusterHealth, SearchError> {
        self.ready()
            .await?
            .health()
            .await
            .map_err(|error| SearchError::BackendUnavailable(error.to_string()))
    }

    /// Forces the next call to probe the store again.
    pub fn mark_unavailable(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!("document store marked unavailable");
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        info!("document store connection closed");
    }

    /// The underlying store, bypassing the readiness check.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn was_ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::Acquire)
    }

    async fn probe(&self) -> Result<ClusterHealth, StoreError> {
        let status = self.store.health().await?;
        self.connected.store(true, Ordering::Release);
        self.ever_connected.store(true, Ordering::Release);
        Ok(status)
    }
}
