//! # System Constants
//!
//! Defaults, hard limits and status groupings that define the operational
//! boundaries of the auto-assign queue engine.

use std::collections::HashMap;

pub use crate::state_machine::EntryStatus;

/// Event names published for queue mutations
pub mod events {
    pub const QUEUE_REGENERATED: &str = "queue.regenerated";
    pub const QUEUE_SNAPSHOT: &str = "queue.snapshot";

    pub const ENTRY_NOTIFIED: &str = "entry.notified";
    pub const ENTRY_ACCEPTED: &str = "entry.accepted";
    pub const ENTRY_DECLINED: &str = "entry.declined";
    pub const ENTRY_EXPIRED: &str = "entry.expired";
    pub const ENTRY_REASSIGNED: &str = "entry.reassigned";
    pub const ENTRY_COMPLETED: &str = "entry.completed";
    pub const ENTRY_UPDATED: &str = "entry.updated";
}

/// Queue builder defaults and limits
pub mod builder {
    pub const DEFAULT_QUEUE_LIMIT: u32 = 10;
    pub const MAX_QUEUE_LIMIT: u32 = 100;
    pub const DEFAULT_EXPIRES_IN_MINUTES: u32 = 240;
    /// One week; longer invitations are rejected at the boundary.
    pub const MAX_EXPIRES_IN_MINUTES: u32 = 7 * 24 * 60;
    pub const DEFAULT_ENSURE_NEWCOMER: bool = true;
    pub const DEFAULT_MAX_ASSIGNMENTS: u32 = 1;
    pub const DEFAULT_WINDOW_DAYS: u32 = 30;
    /// Bucket assigned to the fairness-reserved newcomer slot.
    pub const NEWCOMER_PRIORITY_BUCKET: i32 = 1;
}

/// Scoring defaults
pub mod scoring {
    /// Returned when every weight is zero.
    pub const NEUTRAL_SCORE: f64 = 40.0;
    pub const MAX_SCORE: f64 = 100.0;
    pub const MAX_RATING: f64 = 5.0;
    pub const MAX_WEIGHT: f64 = 1000.0;
    pub const DEFAULT_EARNINGS_CAP: f64 = 10_000.0;
    pub const DEFAULT_INCLUSION_THRESHOLD: u32 = 2;
    pub const SCORE_DECIMALS: i32 = 4;

    pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.25;
    pub const DEFAULT_RATING_WEIGHT: f64 = 0.25;
    pub const DEFAULT_COMPLETION_WEIGHT: f64 = 0.20;
    pub const DEFAULT_EARNINGS_WEIGHT: f64 = 0.15;
    pub const DEFAULT_INCLUSION_WEIGHT: f64 = 0.15;
}

/// Reasons recorded on reassigned entries
pub mod reasons {
    /// Manual removal without an explicit reason code
    pub const MANUAL_REMOVAL: &str = "manual_removal";
}

/// Query service pagination limits
pub mod query {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 50;
}

/// Status groupings for views and lifecycle logic
pub mod status_groups {
    use super::EntryStatus;

    /// Entries a freelancer can still act on
    pub const OPEN_STATES: &[EntryStatus] = &[EntryStatus::Pending, EntryStatus::Notified];

    /// Entries that can no longer change
    pub const FINAL_STATES: &[EntryStatus] = &[
        EntryStatus::Declined,
        EntryStatus::Expired,
        EntryStatus::Reassigned,
        EntryStatus::Completed,
    ];

    /// Default filter of the freelancer-facing view
    pub const FREELANCER_VIEW_DEFAULT: &[EntryStatus] = OPEN_STATES;

    /// Default filter of the historical/audit view
    pub const AUDIT_VIEW_DEFAULT: &[EntryStatus] = EntryStatus::ALL;
}

pub type EntryTransitionKey = (EntryStatus, EntryStatus);
pub type EntryTransitionMap = HashMap<EntryTransitionKey, &'static str>;

/// Build the event name map for every allowed entry transition
pub fn build_entry_transition_map() -> EntryTransitionMap {
    let mut map = HashMap::new();

    map.insert(
        (EntryStatus::Pending, EntryStatus::Notified),
        events::ENTRY_NOTIFIED,
    );
    map.insert(
        (EntryStatus::Pending, EntryStatus::Reassigned),
        events::ENTRY_REASSIGNED,
    );

    map.insert(
        (EntryStatus::Notified, EntryStatus::Accepted),
        events::ENTRY_ACCEPTED,
    );
    map.insert(
        (EntryStatus::Notified, EntryStatus::Declined),
        events::ENTRY_DECLINED,
    );
    map.insert(
        (EntryStatus::Notified, EntryStatus::Expired),
        events::ENTRY_EXPIRED,
    );
    map.insert(
        (EntryStatus::Notified, EntryStatus::Reassigned),
        events::ENTRY_REASSIGNED,
    );

    map.insert(
        (EntryStatus::Accepted, EntryStatus::Completed),
        events::ENTRY_COMPLETED,
    );

    map
}
