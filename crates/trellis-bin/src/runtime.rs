// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime orchestration for `trellis run`.
//!
//! ```text
//!  DemoPlant ──► SubjectContext ──► SynchronizationEngine ──► EngineHost(LocalEndpoint)
//!      ▲                                     │
//!      └── simulation task                   └── model change watcher
//! ```
//!
//! All tasks stop on the shared [`ShutdownCoordinator`]; the host is asked
//! to stop and finishes its current attempt before `run` returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use trellis_config::{load_config, TrellisConfig};
use trellis_core::SubjectContext;
use trellis_opcua::{EngineHost, LocalEndpoint, ModelChangeNotification, SynchronizationEngine};

use crate::demo::{self, DemoPlant};
use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// TrellisRuntime
// =============================================================================

/// Serves the demo plant until shutdown.
pub struct TrellisRuntime {
    config: TrellisConfig,
    shutdown: ShutdownCoordinator,
    simulation: Option<Duration>,
}

impl TrellisRuntime {
    /// Creates a runtime without simulation.
    pub fn new(config: TrellisConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownCoordinator::new(),
            simulation: None,
        }
    }

    /// Sets the interval between simulated readings; `None` disables them.
    pub fn with_simulation(mut self, period: Option<Duration>) -> Self {
        self.simulation = period.filter(|p| !p.is_zero());
        self
    }

    /// Returns a handle that can stop the runtime.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Runs until a shutdown signal, or until the host gives up.
    pub async fn run(self) -> BinResult<()> {
        info!(version = trellis_opcua::VERSION, "Starting Trellis");

        let context = SubjectContext::new();
        let plant = Arc::new(DemoPlant::build(&context)?);
        let engine = SynchronizationEngine::with_type_registry(
            self.config.server.clone(),
            context.clone(),
            demo::type_registry(),
        );
        let changes = engine.subscribe_model_changes();
        let host = EngineHost::new(
            engine,
            Arc::new(LocalEndpoint::new("local")),
            self.config.host.clone(),
        );

        let watcher = tokio::spawn(watch_model_changes(changes, self.shutdown.subscribe()));
        let simulation = self.simulation.map(|period| {
            tokio::spawn(simulate(
                context.clone(),
                plant.clone(),
                period,
                self.shutdown.subscribe(),
            ))
        });

        let run = host.run(plant.root.clone());
        tokio::pin!(run);
        let result = tokio::select! {
            result = &mut run => result,
            _ = self.shutdown.wait_for_shutdown() => {
                info!("Shutdown requested, stopping engine host");
                host.request_shutdown();
                run.await
            }
        };

        // Also stops the helper tasks when the host gave up on its own.
        self.shutdown.initiate_shutdown();
        let helpers = join_helpers(simulation, watcher).await;

        info!("Trellis stopped");
        result.map_err(|e| BinError::from(e).with_context("engine host stopped"))?;
        helpers?;
        Ok(())
    }
}

impl std::fmt::Debug for TrellisRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrellisRuntime")
            .field("namespace_uri", &self.config.server.namespace_uri)
            .field("simulation", &self.simulation)
            .finish()
    }
}

/// Waits for the helper tasks; a panicked helper fails the run after the host stopped cleanly.
async fn join_helpers(
    simulation: Option<JoinHandle<()>>,
    watcher: JoinHandle<()>,
) -> anyhow::Result<()> {
    let simulation = match simulation {
        Some(task) => task.await.context("simulation task ended abnormally"),
        None => Ok(()),
    };
    let watcher = watcher.await.context("model change watcher ended abnormally");
    for outcome in [&simulation, &watcher] {
        if let Err(e) = outcome {
            warn!(error = %format!("{e:#}"), "Helper task failed");
        }
    }
    simulation.and(watcher)
}

/// Writes simulated readings every `period` until shutdown.
async fn simulate(
    context: SubjectContext,
    plant: Arc<DemoPlant>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut step = 0u64;
    debug!(period_ms = period.as_millis() as u64, "Simulation started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = plant.simulate_tick(&context, step) {
                    warn!(error = %e, step, "Simulation step failed");
                }
                step += 1;
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!(steps = step, "Simulation stopped");
}

/// Logs every model change batch published by the engine.
async fn watch_model_changes(
    mut changes: broadcast::Receiver<Arc<ModelChangeNotification>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Ok(batch) => {
                    info!(
                        sequence = batch.sequence_number,
                        changes = batch.changes.len(),
                        "Address space changed"
                    );
                    for change in &batch.changes {
                        debug!(node_id = %change.affected, verb = %change.verb, "Model change");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Model change watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`TrellisRuntime`].
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<TrellisConfig>,
    simulation: Option<Duration>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: TrellisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the simulation interval.
    pub fn simulation(mut self, period: Option<Duration>) -> Self {
        self.simulation = period;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<TrellisRuntime> {
        let config = resolve_config(self.config, self.config_path.as_deref())?;
        Ok(TrellisRuntime::new(config).with_simulation(self.simulation))
    }
}

/// Uses `config` if given, else loads `path`, else validated defaults.
pub fn resolve_config(config: Option<TrellisConfig>, path: Option<&Path>) -> BinResult<TrellisConfig> {
    match (config, path) {
        (Some(config), _) => {
            config.validate()?;
            Ok(config)
        }
        (None, Some(path)) => load_config(path).map_err(|e| {
            BinError::from(e).with_context(format!("failed to load {}", path.display()))
        }),
        (None, None) => {
            info!("No configuration file given, using defaults");
            let config = TrellisConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_uses_defaults_without_path() {
        let runtime = RuntimeBuilder::new().build().unwrap();
        assert_eq!(runtime.config.server.namespace_uri, "urn:trellis:subjects");
        assert!(runtime.simulation.is_none());
    }

    #[test]
    fn test_builder_loads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nnamespace_uri = \"urn:plant:test\"\nbuffer_time_ms = 25\n"
        )
        .unwrap();

        let runtime = RuntimeBuilder::new()
            .config_path(file.path())
            .simulation(Some(Duration::from_millis(5)))
            .build()
            .unwrap();
        assert_eq!(runtime.config.server.namespace_uri, "urn:plant:test");
        assert_eq!(runtime.config.server.buffer_time_ms, 25);
        assert_eq!(runtime.simulation, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_builder_reports_missing_file() {
        let err = RuntimeBuilder::new()
            .config_path("/nonexistent/trellis.yaml")
            .build()
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = TrellisConfig::default();
        config.server.max_sessions = 0;
        let err = RuntimeBuilder::new().config(config).build().unwrap_err();
        assert!(matches!(err, BinError::Config(_)));
    }

    #[tokio::test]
    async fn test_runtime_stops_on_shutdown() {
        let runtime = RuntimeBuilder::new()
            .simulation(Some(Duration::from_millis(5)))
            .build()
            .unwrap();
        let shutdown = runtime.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(5), runtime.run())
            .await
            .expect("runtime should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicked_helper_fails_the_run() {
        let watcher = tokio::spawn(async { panic!("watcher broke") });
        let simulation = tokio::spawn(async {});

        let err: BinError = join_helpers(Some(simulation), watcher).await.unwrap_err().into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("model change watcher ended abnormally"));
    }
}
