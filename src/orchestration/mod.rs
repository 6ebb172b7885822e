//! # Orchestration
//!
//! The write side of the engine.
//!
//! ## Core Components
//!
//! - **QueueBuilder**: scores and ranks candidates into a bounded queue,
//!   reserving the top slot for an eligible newcomer when configured
//! - **RegenerationCoordinator**: at most one regeneration in flight per
//!   target, with reject or supersede semantics and fail-safe timeouts
//! - **InvitationLifecycleManager**: conditional, versioned entry transitions
//! - **ExpirySweeper**: periodic background expiry of overdue invitations
//! - **AutoAssignEngine**: wires all of the above from one configuration

pub mod engine;
pub mod expiry_sweeper;
pub mod lifecycle;
pub mod queue_builder;
pub mod regeneration;

pub use engine::{AutoAssignEngine, AutoAssignEngineBuilder};
pub use expiry_sweeper::{ExpirySweeper, ExpirySweeperHandle};
pub use lifecycle::{InvitationLifecycleManager, SweepReport};
pub use queue_builder::{BuilderConfig, BuiltQueue, FairnessConfig, QueueBuilder, ENSURED_NEWCOMER_KEY};
pub use regeneration::{
    RegenerationCoordinator, RegenerationOutcome, RegenerationPolicy, RegenerationSettingsView,
};
