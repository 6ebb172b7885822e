//! # Resilience Module
//!
//! Fault tolerance for calls that leave the engine: the candidate metrics
//! provider and the queue store.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use autoassign_core::resilience::{retry_with_backoff, BackoffConfig};
//!
//! # async fn example() -> autoassign_core::error::Result<()> {
//! let value = retry_with_backoff("load_metrics", &BackoffConfig::default(), || async {
//!     Ok::<_, autoassign_core::error::AutoAssignError>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;

pub use backoff::{retry_with_backoff, BackoffConfig};
