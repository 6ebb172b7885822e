// State machine module for queue entry lifecycle
//
// Entries move pending -> notified -> {accepted, declined, expired, reassigned},
// and accepted -> completed. Transitions are computed purely here and persisted
// by the lifecycle manager with conditional writes.

pub mod entry_state_machine;
pub mod errors;
pub mod events;
pub mod states;

// Re-export main types for convenient access
pub use entry_state_machine::EntryStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{CompletionDetails, EntryEvent, ResponseDetails, TransitionRequest};
pub use states::EntryStatus;
