// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # JWKS Refresher
//!
//! Background task that keeps the JWKS cache warm so request handling
//! rarely waits on the network.
//!
//! ## Strategy
//!
//! Every `refresh_interval` (default: half the cache TTL) the refresher
//! refetches the key set. A failure keeps the previous keys; the next
//! request that misses the cache retries on its own.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::jwks::JwksManager;

/// Background JWKS refresher.
pub struct JwksRefresher {
    jwks: JwksManager,
    refresh_interval: Duration,
}

impl JwksRefresher {
    pub fn new(jwks: JwksManager) -> Self {
        let refresh_interval = (jwks.cache_ttl() / 2).max(Duration::from_secs(1));
        Self {
            jwks,
            refresh_interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            url = %self.jwks.jwks_url(),
            interval_secs = self.refresh_interval.as_secs(),
            "JWKS refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("JWKS refresher shutting down");
                return;
            }

            self.refresh_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }
        }
    }

    async fn refresh_step(&self) {
        match self.jwks.refresh().await {
            Ok(keys) => debug!(count = keys.len(), "JWKS refresher: keys refreshed"),
            Err(e) => warn!(error = %e, "JWKS refresher: refresh failed, keeping cached keys"),
        }
    }
}

/// Wait for a spawned refresher to stop. Returns `false` when the task
/// panicked or was aborted.
pub async fn join(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "JWKS refresher task failed");
            false
        }
    }
}
