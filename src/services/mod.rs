//! Read-side services over the queue store.

pub mod queue_query_service;
pub mod velocity;

pub use queue_query_service::{
    parse_status_tokens, QueueFilter, QueueListing, QueueQueryService, QueueView,
};
pub use velocity::{MetricValue, QueueVelocity, QueueVelocityService};
