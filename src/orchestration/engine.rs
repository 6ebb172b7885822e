//! # Auto-Assign Engine
//!
//! Wires the store, metrics provider, publisher, builder, coordinator,
//! lifecycle manager and read services from one [`AutoAssignConfig`].
//!
//! ```rust,no_run
//! use autoassign_core::config::AutoAssignConfig;
//! use autoassign_core::orchestration::AutoAssignEngine;
//! use autoassign_core::providers::StaticMetricsProvider;
//! use autoassign_core::store::InMemoryQueueStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> autoassign_core::error::Result<()> {
//! let engine = AutoAssignEngine::builder(AutoAssignConfig::default())
//!     .store(Arc::new(InMemoryQueueStore::new()))
//!     .provider(Arc::new(StaticMetricsProvider::new()))
//!     .build()?;
//! let sweeper = engine.start_sweeper();
//! // ... serve requests ...
//! sweeper.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::info;

use super::expiry_sweeper::{ExpirySweeper, ExpirySweeperHandle};
use super::lifecycle::InvitationLifecycleManager;
use super::queue_builder::{BuilderConfig, QueueBuilder};
use super::regeneration::{RegenerationCoordinator, RegenerationOutcome, RegenerationSettingsView};
use crate::config::AutoAssignConfig;
use crate::error::{AutoAssignError, Result};
use crate::events::{QueueEventPublisher, QueueSubscription};
use crate::models::TargetRef;
use crate::providers::CandidateMetricsProvider;
use crate::services::{QueueFilter, QueueListing, QueueQueryService, QueueVelocity, QueueVelocityService};
use crate::store::QueueStore;
use crate::utils::{SharedClock, SystemClock};

/// Fully wired engine; cheap to share behind an `Arc`
#[derive(Debug)]
pub struct AutoAssignEngine {
    config: AutoAssignConfig,
    store: Arc<dyn QueueStore>,
    publisher: QueueEventPublisher,
    coordinator: RegenerationCoordinator,
    lifecycle: InvitationLifecycleManager,
    query: QueueQueryService,
    velocity: QueueVelocityService,
}

#[derive(Debug)]
pub struct AutoAssignEngineBuilder {
    config: AutoAssignConfig,
    store: Option<Arc<dyn QueueStore>>,
    provider: Option<Arc<dyn CandidateMetricsProvider>>,
    clock: Option<SharedClock>,
}

impl AutoAssignEngineBuilder {
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CandidateMetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<AutoAssignEngine> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| AutoAssignError::Configuration("queue store is required".to_string()))?;
        let provider = self.provider.ok_or_else(|| {
            AutoAssignError::Configuration("candidate metrics provider is required".to_string())
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let config = self.config;

        let store_timeout = config.regeneration.store_timeout();
        let publisher = QueueEventPublisher::new(store.clone(), config.publisher.subscriber_buffer)?
            .with_snapshot_timeout(store_timeout);

        let coordinator = RegenerationCoordinator::new(
            QueueBuilder::from_config(&config),
            provider,
            store.clone(),
            publisher.clone(),
            clock.clone(),
            RegenerationSettingsView::from_config(&config),
        );
        let lifecycle = InvitationLifecycleManager::new(
            store.clone(),
            publisher.clone(),
            clock.clone(),
            store_timeout,
        );
        let query = QueueQueryService::new(
            store.clone(),
            config.query.clone(),
            store_timeout,
            config.retry.clone(),
        );
        let velocity = QueueVelocityService::new(store.clone(), clock, config.velocity.clone());

        info!(
            policy = ?config.regeneration.policy,
            sweep_interval_ms = config.lifecycle.sweep_interval_ms,
            subscriber_buffer = config.publisher.subscriber_buffer,
            "🚀 Auto-assign engine ready"
        );

        Ok(AutoAssignEngine {
            config,
            store,
            publisher,
            coordinator,
            lifecycle,
            query,
            velocity,
        })
    }
}

impl AutoAssignEngine {
    pub fn builder(config: AutoAssignConfig) -> AutoAssignEngineBuilder {
        AutoAssignEngineBuilder {
            config,
            store: None,
            provider: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &AutoAssignConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn publisher(&self) -> &QueueEventPublisher {
        &self.publisher
    }

    pub fn coordinator(&self) -> &RegenerationCoordinator {
        &self.coordinator
    }

    pub fn lifecycle(&self) -> &InvitationLifecycleManager {
        &self.lifecycle
    }

    pub fn query(&self) -> &QueueQueryService {
        &self.query
    }

    /// Request defaults taken from the `builder` config section
    pub fn default_builder_config(&self) -> BuilderConfig {
        BuilderConfig::from_settings(&self.config.builder)
    }

    pub async fn regenerate(
        &self,
        target: TargetRef,
        config: &BuilderConfig,
    ) -> Result<RegenerationOutcome> {
        self.coordinator.regenerate(target, config).await
    }

    pub async fn list_queue(&self, filter: &QueueFilter) -> Result<QueueListing> {
        self.query.list_queue(filter).await
    }

    pub async fn subscribe(&self, target: TargetRef) -> Result<QueueSubscription> {
        self.publisher.subscribe(target).await
    }

    pub async fn velocity(&self, target: Option<TargetRef>) -> Result<QueueVelocity> {
        self.velocity.velocity(target).await
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::from_settings(self.lifecycle.clone(), &self.config.lifecycle)
    }

    /// Spawn the periodic expiry sweep on the current runtime.
    pub fn start_sweeper(&self) -> ExpirySweeperHandle {
        self.sweeper().spawn()
    }
}
