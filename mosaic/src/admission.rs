//! Per-client sliding-window admission control
//!
//! Each client keeps the instants of its accepted requests inside the
//! trailing window. A request is admitted iff fewer than
//! `requests_per_window` instants remain after pruning. Prune, count and
//! append happen under one lock so concurrent callers can never
//! double-admit. A periodic sweeper forgets clients whose window emptied.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Client id used when neither a credential nor an address is known
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Sliding-window limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub requests_per_window: usize,
    pub window: Duration,
    /// How often idle clients are dropped
    pub sweep_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_window == 0 {
            return Err(PipelineError::Configuration(
                "requests_per_window must be greater than 0".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(PipelineError::Configuration(
                "rate limit window must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(PipelineError::Configuration(
                "admission sweep_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derive the client identity for admission purposes.
///
/// A non-empty API key wins over the network address.
pub fn client_id(api_key: Option<&str>, remote_addr: Option<&str>) -> String {
    api_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .or_else(|| remote_addr.map(str::trim).filter(|addr| !addr.is_empty()))
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

/// Outcome of a single admission attempt
enum Decision {
    Admitted,
    Rejected { retry_after: Duration },
}

/// Shared sliding-window rate limiter
#[derive(Clone)]
pub struct AdmissionController {
    config: AdmissionConfig,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Record a request from `client_id` if the window allows it
    pub async fn is_allowed(&self, client_id: &str) -> bool {
        matches!(self.decide(client_id).await, Decision::Admitted)
    }

    /// Like `is_allowed`, but rejection is a typed, retryable error
    pub async fn check(&self, client_id: &str) -> Result<()> {
        match self.decide(client_id).await {
            Decision::Admitted => Ok(()),
            Decision::Rejected { retry_after } => Err(PipelineError::AdmissionRejected {
                client_id: client_id.to_string(),
                retry_after,
            }),
        }
    }

    /// Requests `client_id` may still make in the current window
    pub async fn remaining(&self, client_id: &str) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        match windows.get_mut(client_id) {
            Some(instants) => {
                self.prune(instants, now);
                self.config.requests_per_window.saturating_sub(instants.len())
            }
            None => self.config.requests_per_window,
        }
    }

    /// Drop clients with no requests left in their window
    pub async fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();

        windows.retain(|_, instants| {
            self.prune(instants, now);
            !instants.is_empty()
        });

        let removed = before - windows.len();
        if removed > 0 {
            debug!("Swept {} idle admission windows", removed);
        }
        removed
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Periodically drop idle clients
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.config.sweep_interval;

        info!("Starting admission sweeper (interval: {:?})", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                controller.sweep_idle().await;
            }
        })
    }

    async fn decide(&self, client_id: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let instants = windows.entry(client_id.to_string()).or_default();

        self.prune(instants, now);

        if instants.len() < self.config.requests_per_window {
            instants.push_back(now);
            debug!(
                "Admitted {} ({}/{})",
                client_id,
                instants.len(),
                self.config.requests_per_window
            );
            return Decision::Admitted;
        }

        let retry_after = instants
            .front()
            .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
            .unwrap_or(self.config.window);

        warn!(
            "Rate limit exceeded for {}, retry in {:.1}s",
            client_id,
            retry_after.as_secs_f64()
        );
        Decision::Rejected { retry_after }
    }

    /// Keep only instants with `now - instant < window`
    fn prune(&self, instants: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = instants.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                instants.pop_front();
            } else {
                break;
            }
        }
    }
}
