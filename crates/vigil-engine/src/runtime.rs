// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable pipeline runtime.
//!
//! [`PipelineRuntime`] assembles the scheduler-hosted tiers over a store,
//! a unit registry and a channel set, for embedding into an existing
//! tokio application. The `vigil` binary is a thin wrapper around it.
//!
//! ```rust,ignore
//! let runtime = PipelineRuntime::builder()
//!     .store(store)
//!     .registry(registry)
//!     .channels(channels)
//!     .event(nightly_event, Duration::from_secs(3600))
//!     .build()?
//!     .start()
//!     .await?;
//! // ...
//! runtime.shutdown().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vigil_store::{BufferConfig, BulkUpdateBuffer, DocStore};
use vigil_units::{ChannelConfig, UnitRegistry};

use crate::scheduler::Scheduler;
use crate::stats::publish_stats;
use crate::t2::{T2Controller, T2ControllerConfig};
use crate::t3::{T3Event, T3EventConfig};

/// Builder for a [`PipelineRuntime`].
pub struct PipelineRuntimeBuilder {
    store: Option<Arc<dyn DocStore>>,
    registry: Arc<UnitRegistry>,
    channels: Vec<ChannelConfig>,
    events: Vec<(T3EventConfig, Duration)>,
    buffer_config: BufferConfig,
    t2_config: T2ControllerConfig,
    t2_poll: Duration,
    stats_every: Option<Duration>,
}

impl Default for PipelineRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            registry: Arc::new(UnitRegistry::new()),
            channels: Vec::new(),
            events: Vec::new(),
            buffer_config: BufferConfig::default(),
            t2_config: T2ControllerConfig::default(),
            t2_poll: Duration::from_secs(5),
            stats_every: None,
        }
    }
}

impl std::fmt::Debug for PipelineRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRuntimeBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("channels", &self.channels.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl PipelineRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store (required).
    pub fn store(mut self, store: Arc<dyn DocStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the unit registry.
    pub fn registry(mut self, registry: Arc<UnitRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the channel configurations.
    pub fn channels(mut self, channels: Vec<ChannelConfig>) -> Self {
        self.channels = channels;
        self
    }

    /// Schedule a T3 event.
    pub fn event(mut self, config: T3EventConfig, every: Duration) -> Self {
        self.events.push((config, every));
        self
    }

    /// Override the bulk-buffer configuration.
    pub fn buffer_config(mut self, config: BufferConfig) -> Self {
        self.buffer_config = config;
        self
    }

    /// Override the T2 controller configuration.
    pub fn t2_config(mut self, config: T2ControllerConfig) -> Self {
        self.t2_config = config;
        self
    }

    /// Override the T2 poll interval.
    pub fn t2_poll(mut self, every: Duration) -> Self {
        self.t2_poll = every;
        self
    }

    /// Enable the stats publisher.
    pub fn stats_every(mut self, every: Duration) -> Self {
        self.stats_every = Some(every);
        self
    }

    /// Validate and assemble the runtime configuration.
    pub fn build(self) -> Result<PipelineRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        Ok(PipelineRuntimeConfig {
            store,
            registry: self.registry,
            channels: self.channels,
            events: self.events,
            buffer_config: self.buffer_config,
            t2_config: self.t2_config,
            t2_poll: self.t2_poll,
            stats_every: self.stats_every,
        })
    }
}

/// Validated runtime configuration.
pub struct PipelineRuntimeConfig {
    store: Arc<dyn DocStore>,
    registry: Arc<UnitRegistry>,
    channels: Vec<ChannelConfig>,
    events: Vec<(T3EventConfig, Duration)>,
    buffer_config: BufferConfig,
    t2_config: T2ControllerConfig,
    t2_poll: Duration,
    stats_every: Option<Duration>,
}

impl PipelineRuntimeConfig {
    /// Start the runtime, spawning the scheduler task.
    ///
    /// Refuses to start when the store is unreachable.
    pub async fn start(self) -> Result<PipelineRuntime> {
        self.store.health_check().await?;

        let buffer = BulkUpdateBuffer::new(self.store.clone(), self.buffer_config.clone());
        let stop = CancellationToken::new();
        let mut scheduler = Scheduler::new(stop.clone());

        // Periodic buffer flush
        {
            let buffer = buffer.clone();
            scheduler.add_periodic("buffer_flush", Duration::from_secs(1), move || {
                let buffer = buffer.clone();
                Box::pin(async move {
                    buffer.flush_if_due();
                })
            });
        }

        // T2 poll
        {
            let controller = Arc::new(T2Controller::new(
                self.store.clone(),
                self.registry.clone(),
                &self.channels,
                self.t2_config.clone(),
            ));
            scheduler.add_periodic("t2_poll", self.t2_poll, move || {
                let controller = controller.clone();
                Box::pin(async move {
                    if let Err(e) = controller.run_once().await {
                        error!(error = %e, "T2 pass failed");
                    }
                })
            });
        }

        // T3 events
        for (config, every) in self.events {
            let name = config.name.clone();
            let event = Arc::new(T3Event::new(
                config,
                self.store.clone(),
                self.registry.clone(),
                stop.clone(),
            ));
            scheduler.add_periodic(&name, every, move || {
                let event = event.clone();
                Box::pin(async move {
                    if let Err(e) = event.run().await {
                        error!(error = %e, "Event failed");
                    }
                })
            });
        }

        // Stats publisher
        if let Some(every) = self.stats_every {
            let store = self.store.clone();
            let buffer_for_stats = buffer.clone();
            scheduler.add_periodic("stats", every, move || {
                let store = store.clone();
                let buffer = buffer_for_stats.clone();
                Box::pin(async move {
                    if let Err(e) = publish_stats(store.as_ref(), &buffer).await {
                        error!(error = %e, "Stats snapshot failed");
                    }
                })
            });
        }

        let handle = tokio::spawn(scheduler.run());
        info!("Pipeline runtime started");

        Ok(PipelineRuntime {
            store: self.store,
            buffer,
            stop,
            handle,
        })
    }
}

/// A running pipeline that can be embedded in an application.
pub struct PipelineRuntime {
    store: Arc<dyn DocStore>,
    buffer: BulkUpdateBuffer,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl PipelineRuntime {
    /// Create a new builder.
    pub fn builder() -> PipelineRuntimeBuilder {
        PipelineRuntimeBuilder::new()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn DocStore> {
        &self.store
    }

    /// The shared bulk buffer; alert processors write through it.
    pub fn buffer(&self) -> &BulkUpdateBuffer {
        &self.buffer
    }

    /// Whether the scheduler task is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Gracefully shut down: stop the scheduler, then drain the buffer.
    pub async fn shutdown(self) -> Result<()> {
        info!("Pipeline runtime shutting down...");
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            error!("Scheduler task panicked: {}", e);
            return Err(anyhow::anyhow!("scheduler task panicked: {}", e));
        }
        self.buffer.close().await;
        info!("Pipeline runtime shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_store::MemStore;

    #[test]
    fn test_builder_requires_store() {
        assert!(PipelineRuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_debug_hides_store() {
        let builder = PipelineRuntimeBuilder::new().store(Arc::new(MemStore::new()));
        let debug = format!("{:?}", builder);
        assert!(debug.contains("..."));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let runtime = PipelineRuntime::builder()
            .store(Arc::new(MemStore::new()))
            .stats_every(Duration::from_secs(60))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        assert!(runtime.is_running());
        runtime.shutdown().await.unwrap();
    }
}
