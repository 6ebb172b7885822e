//! # Queue API Boundary
//!
//! Request validation and handlers for the queue surfaces, independent of any
//! HTTP framework.
//!
//! - [`requests`]: enqueue bodies and list query strings
//! - [`handlers`]: [`QueueApi`] operations
//! - [`errors`]: [`ApiError`] with status and error-code mapping

pub mod errors;
pub mod handlers;
pub mod requests;

pub use errors::{ApiError, ApiResult};
pub use handlers::{EnqueueResponse, QueueApi};
pub use requests::{parse_target, EnqueueRequest, FairnessOverrides, ListQueueQuery};
