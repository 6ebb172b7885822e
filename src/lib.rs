#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Auto-Assign Core
//!
//! Fairness-aware queue engine that ranks eligible freelancers against open
//! work items, issues time-boxed invitations, tracks their lifecycle, and
//! streams queue state to live subscribers.
//!
//! ## Architecture
//!
//! Data flows leaves-first:
//!
//! 1. A [`providers::CandidateMetricsProvider`] supplies per-freelancer signals
//! 2. The [`scoring::FairnessScorer`] turns signals and weights into a 0–100 score
//! 3. The [`orchestration::QueueBuilder`] ranks candidates, reserving the top
//!    slot for an eligible newcomer, and the
//!    [`orchestration::RegenerationCoordinator`] swaps the result in as the
//!    target's next generation
//! 4. The [`orchestration::InvitationLifecycleManager`] and the
//!    [`orchestration::ExpirySweeper`] move entries through their state machine
//!    with conditional, versioned writes
//! 5. Every committed change is fanned out by the [`events::QueueEventPublisher`]
//!    and is visible through the [`services::QueueQueryService`]
//!
//! ## Module Organization
//!
//! - [`api`] - Transport-independent request validation and handlers
//! - [`config`] - Layered TOML + environment configuration
//! - [`error`] - Structured error taxonomy
//! - [`events`] - Per-target live event fan-out
//! - [`models`] - Queue entries, targets and candidate metrics
//! - [`orchestration`] - Builder, regeneration, lifecycle and sweeper
//! - [`scoring`] - Weights and the fairness scorer
//! - [`services`] - Paginated queries and velocity metrics
//! - [`state_machine`] - Entry states and transition rules
//! - [`store`] - Queue store trait with in-memory and PostgreSQL backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autoassign_core::config::AutoAssignConfig;
//! use autoassign_core::models::{TargetRef, TargetType};
//! use autoassign_core::orchestration::AutoAssignEngine;
//! use autoassign_core::providers::StaticMetricsProvider;
//! use autoassign_core::store::InMemoryQueueStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> autoassign_core::Result<()> {
//! autoassign_core::logging::init_structured_logging();
//!
//! let engine = AutoAssignEngine::builder(AutoAssignConfig::load(None)?)
//!     .store(Arc::new(InMemoryQueueStore::new()))
//!     .provider(Arc::new(StaticMetricsProvider::new()))
//!     .build()?;
//!
//! let target = TargetRef::new(TargetType::Gig, 42);
//! let outcome = engine.regenerate(target, &engine.default_builder_config()).await?;
//! println!("generation {} has {} entries", outcome.generation, outcome.entries.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! DATABASE_URL=postgres://... cargo test -- --ignored   # PostgreSQL store tests
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod providers;
pub mod query_builder;
pub mod resilience;
pub mod scoring;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod utils;

pub use config::{AutoAssignConfig, ConfigManager, ConfigurationError};
pub use constants::status_groups;
pub use error::{AutoAssignError, ErrorKind, Result};
pub use events::{QueueEvent, QueueEventPayload, QueueEventPublisher, QueueSubscription};
pub use models::{CandidateMetrics, NewQueueEntry, QueueEntry, TargetRef, TargetType};
pub use orchestration::{
    AutoAssignEngine, BuilderConfig, FairnessConfig, InvitationLifecycleManager, QueueBuilder,
    RegenerationCoordinator, RegenerationPolicy,
};
pub use scoring::{FairnessScorer, PartialWeights, ScoringWeights};
pub use services::{QueueFilter, QueueListing, QueueQueryService};
pub use state_machine::{EntryStatus, TransitionRequest};
pub use store::{InMemoryQueueStore, QueueStore};
