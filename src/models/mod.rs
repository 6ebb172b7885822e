pub mod candidate;
pub mod queue_entry;
pub mod target;

// Re-export core models for easy access
pub use candidate::CandidateMetrics;
pub use queue_entry::{EntryResponse, Metadata, NewQueueEntry, QueueEntry};
pub use target::{TargetRef, TargetType};
