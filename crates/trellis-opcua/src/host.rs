// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine hosting with restart on failure.
//!
//! The host owns one engine and one [`ServerEndpoint`]. Each attempt starts
//! the engine, opens the endpoint and serves until the endpoint stops or a
//! shutdown is requested; the engine is shut down and the endpoint closed
//! on every exit path.
//!
//! ```text
//!  ┌────────► start engine ─► open endpoint ─► serve ──┐
//!  │                                                    │ failure
//!  │  backoff (1s, 2s, 4s ... max) ◄── close/shutdown ◄─┘
//!  └──────────┘       │
//!                     └─ a run longer than reset_after resets the counter
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{error, info, warn};
use trellis_core::{BackoffTracker, RetryConfig, RetryDecision, Subject};

use crate::engine::SynchronizationEngine;
use crate::error::{StartupError, SyncError, SyncResult};

// =============================================================================
// ServerEndpoint
// =============================================================================

/// Transport serving sessions of an engine.
#[async_trait]
pub trait ServerEndpoint: Send + Sync {
    /// Returns a description used in logs and errors.
    fn name(&self) -> &str;

    /// Opens the endpoint. The engine is already running.
    async fn open(&self, engine: &SynchronizationEngine) -> SyncResult<()>;

    /// Serves until the endpoint stops.
    ///
    /// Returning `Ok` means the endpoint closed without error; the host
    /// still restarts it unless a shutdown was requested.
    async fn serve(&self, engine: &SynchronizationEngine) -> SyncResult<()>;

    /// Releases endpoint resources. Called after every successful open.
    async fn close(&self);
}

/// In-process endpoint.
///
/// Sessions are opened directly on the engine; the endpoint only tracks
/// its own lifecycle. [`interrupt`](Self::interrupt) makes the current
/// `serve` call fail, which is how tests and the CLI simulate transport
/// loss.
#[derive(Debug)]
pub struct LocalEndpoint {
    name: String,
    open: AtomicBool,
    interrupted: Notify,
    reason: Mutex<Option<String>>,
}

impl LocalEndpoint {
    /// Creates a closed endpoint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: AtomicBool::new(false),
            interrupted: Notify::new(),
            reason: Mutex::new(None),
        }
    }

    /// Returns `true` between open and close.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Fails the running `serve` call with `reason`.
    pub fn interrupt(&self, reason: impl Into<String>) {
        *self.reason.lock() = Some(reason.into());
        self.interrupted.notify_one();
    }
}

#[async_trait]
impl ServerEndpoint for LocalEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, _engine: &SynchronizationEngine) -> SyncResult<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(StartupError::endpoint_unavailable(&self.name, "already open").into());
        }
        info!(endpoint = %self.name, "Local endpoint opened");
        Ok(())
    }

    async fn serve(&self, _engine: &SynchronizationEngine) -> SyncResult<()> {
        self.interrupted.notified().await;
        let reason = self.reason.lock().take();
        match reason {
            Some(message) => Err(StartupError::EndpointFailed {
                endpoint: self.name.clone(),
                message,
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!(endpoint = %self.name, "Local endpoint closed");
        }
    }
}

// =============================================================================
// EngineHost
// =============================================================================

/// Runs an engine behind an endpoint and restarts it with backoff.
pub struct EngineHost {
    engine: SynchronizationEngine,
    endpoint: Arc<dyn ServerEndpoint>,
    backoff: BackoffTracker,
    shutdown: Notify,
    stopping: AtomicBool,
}

impl EngineHost {
    /// Creates a host.
    pub fn new(engine: SynchronizationEngine, endpoint: Arc<dyn ServerEndpoint>, retry: RetryConfig) -> Self {
        Self {
            engine,
            endpoint,
            backoff: BackoffTracker::new(retry),
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Returns the hosted engine.
    pub fn engine(&self) -> &SynchronizationEngine {
        &self.engine
    }

    /// Returns the number of consecutive failed attempts.
    pub fn failures(&self) -> u32 {
        self.backoff.failures()
    }

    /// Asks [`run`](Self::run) to stop after the current attempt.
    pub fn request_shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Serves `root` until shutdown is requested or retries are exhausted.
    ///
    /// Returns the last error when the retry budget runs out or the error
    /// is not retryable.
    pub async fn run(&self, root: Arc<Subject>) -> SyncResult<()> {
        info!(endpoint = %self.endpoint.name(), "Engine host starting");
        loop {
            if self.is_stopping() {
                break;
            }

            let started = Instant::now();
            let result = self.attempt(&root).await;
            if self.is_stopping() {
                if let Err(e) = &result {
                    e.log("host shutdown");
                }
                break;
            }
            if self.backoff.record_run(started.elapsed()) {
                info!("Sustained run, failure counter reset");
            }

            let error = match result {
                Ok(()) => SyncError::from(StartupError::EndpointFailed {
                    endpoint: self.endpoint.name().to_string(),
                    message: "endpoint stopped".to_string(),
                }),
                Err(e) => e,
            };
            if !error.is_retryable() {
                error!(error = %error, "Engine host stopped on a permanent error");
                return Err(error);
            }
            match self.backoff.record_failure() {
                RetryDecision::Retry(delay) => {
                    warn!(
                        error = %error,
                        failures = self.backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Engine attempt failed, restarting"
                    );
                    if !self.sleep(delay).await {
                        break;
                    }
                }
                RetryDecision::DoNotRetry => {
                    error!(error = %error, failures = self.backoff.failures(), "Engine host giving up");
                    return Err(error);
                }
            }
        }
        info!("Engine host stopped");
        Ok(())
    }

    /// One start/open/serve cycle. Always leaves the engine stopped and the
    /// endpoint closed.
    async fn attempt(&self, root: &Arc<Subject>) -> SyncResult<()> {
        self.engine.start(root.clone()).await?;

        let result = match self.endpoint.open(&self.engine).await {
            Ok(()) => {
                let notified = self.shutdown.notified();
                let served = if self.is_stopping() {
                    Ok(())
                } else {
                    tokio::select! {
                        served = self.endpoint.serve(&self.engine) => served,
                        _ = notified => Ok(()),
                    }
                };
                self.endpoint.close().await;
                served
            }
            Err(e) => Err(e),
        };
        self.engine.shutdown().await;
        result
    }

    /// Sleeps unless shutdown is requested first. Returns `false` on shutdown.
    async fn sleep(&self, delay: std::time::Duration) -> bool {
        let notified = self.shutdown.notified();
        if self.is_stopping() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_stopping(),
            _ = notified => false,
        }
    }
}

impl std::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHost")
            .field("endpoint", &self.endpoint.name())
            .field("failures", &self.backoff.failures())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}
