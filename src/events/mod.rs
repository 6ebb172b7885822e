//! Live queue updates: payload types and the per-target publisher.

pub mod publisher;
pub mod types;

// Re-export key types for convenience
pub use publisher::{
    CommitPermit, PublishError, PublisherStats, QueueEventPublisher, QueueSubscription,
};
pub use types::{QueueEvent, QueueEventPayload};
