// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Engine host restart and shutdown behaviour.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{sid, Model, ModelFixtures};
use trellis_core::RetryConfig;
use trellis_opcua::{
    EngineHost, LocalEndpoint, ServerEndpoint, StartupError, SyncResult, SynchronizationEngine,
};

/// Endpoint that fails to open a fixed number of times, then serves until
/// the host stops it.
struct FlakyEndpoint {
    fail_first: u32,
    opens: AtomicU32,
    closes: AtomicU32,
}

impl FlakyEndpoint {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        })
    }

    fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerEndpoint for FlakyEndpoint {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn open(&self, engine: &SynchronizationEngine) -> SyncResult<()> {
        assert!(engine.is_running());
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(StartupError::endpoint_unavailable("flaky", "port in use").into());
        }
        Ok(())
    }

    async fn serve(&self, _engine: &SynchronizationEngine) -> SyncResult<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn retry() -> RetryConfig {
    RetryConfig::default()
        .with_initial_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(8))
        .with_reset_after(Duration::from_secs(60))
}

fn host(model: &Model, endpoint: Arc<dyn ServerEndpoint>, retry: RetryConfig) -> EngineHost {
    let engine = SynchronizationEngine::new(ModelFixtures::config(), model.context.clone());
    EngineHost::new(engine, endpoint, retry)
}

#[tokio::test(start_paused = true)]
async fn test_host_retries_until_endpoint_opens() {
    let model = Model::new();
    let endpoint = FlakyEndpoint::new(2);
    let host = host(&model, endpoint.clone(), retry());

    let (result, ()) = tokio::join!(host.run(model.root.clone()), async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(endpoint.opens(), 3);
        assert_eq!(host.failures(), 2);
        assert!(host.engine().is_running());
        assert!(host.engine().address_space().contains(&sid("Root.Name")));
        host.request_shutdown();
    });

    result.unwrap();
    assert!(!host.engine().is_running());
    assert_eq!(host.engine().subject_count(), 0);
    assert_eq!(endpoint.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_host_gives_up_after_max_attempts() {
    let model = Model::new();
    let endpoint = FlakyEndpoint::new(u32::MAX);
    let host = host(&model, endpoint.clone(), retry().with_max_attempts(3));

    let err = host.run(model.root.clone()).await.unwrap_err();

    assert_eq!(err.category(), "startup");
    assert_eq!(endpoint.opens(), 3);
    assert_eq!(host.failures(), 3);
    assert!(!host.engine().is_running());
    // Failed opens are never paired with a close.
    assert_eq!(endpoint.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_host_restarts_interrupted_endpoint() {
    let model = Model::new();
    let endpoint = Arc::new(LocalEndpoint::new("local"));
    let host = host(&model, endpoint.clone(), retry());

    let (result, ()) = tokio::join!(host.run(model.root.clone()), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(endpoint.is_open());
        assert!(host.engine().is_running());

        endpoint.interrupt("link lost");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!endpoint.is_open());
        assert!(!host.engine().is_running());
        assert_eq!(host.failures(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(endpoint.is_open());
        assert!(host.engine().is_running());
        host.request_shutdown();
    });

    result.unwrap();
    assert!(!endpoint.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_host_shutdown_during_backoff() {
    let model = Model::new();
    let endpoint = FlakyEndpoint::new(u32::MAX);
    let host = host(&model, endpoint.clone(), retry().with_initial_delay(Duration::from_secs(30)));

    let (result, ()) = tokio::join!(host.run(model.root.clone()), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        host.request_shutdown();
    });

    result.unwrap();
    assert_eq!(endpoint.opens(), 1);
}

#[tokio::test]
async fn test_host_stops_on_permanent_error() {
    let model = Model::new();
    let endpoint = FlakyEndpoint::new(0);
    let host = host(&model, endpoint.clone(), retry());
    host.engine().start(model.root.clone()).await.unwrap();

    let err = host.run(model.root.clone()).await.unwrap_err();

    assert!(!err.is_retryable());
    assert_eq!(endpoint.opens(), 0);
    assert_eq!(host.failures(), 0);
    assert!(host.engine().is_running());
}
