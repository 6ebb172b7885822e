use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue entry state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Created by the queue builder, not yet delivered
    Pending,
    /// Invitation delivered; the candidate may respond until it expires
    Notified,
    /// Candidate accepted before expiry
    Accepted,
    /// Candidate declined before expiry
    Declined,
    /// Expiry passed with no response
    Expired,
    /// Superseded by regeneration or administrative removal
    Reassigned,
    /// Work for an accepted invitation finished
    Completed,
}

impl EntryStatus {
    pub const ALL: &'static [EntryStatus] = &[
        Self::Pending,
        Self::Notified,
        Self::Accepted,
        Self::Declined,
        Self::Expired,
        Self::Reassigned,
        Self::Completed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Declined | Self::Expired | Self::Reassigned | Self::Completed
        )
    }

    /// Check if the invitation is still open (pending or notified)
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Notified)
    }

    /// Allowed transition table
    pub fn can_transition_to(&self, to: EntryStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Notified)
                | (Self::Pending, Self::Reassigned)
                | (Self::Notified, Self::Accepted)
                | (Self::Notified, Self::Declined)
                | (Self::Notified, Self::Expired)
                | (Self::Notified, Self::Reassigned)
                | (Self::Accepted, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::Reassigned => "reassigned",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "notified" => Ok(Self::Notified),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "expired" => Ok(Self::Expired),
            "reassigned" => Ok(Self::Reassigned),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid entry status: {s}")),
        }
    }
}

/// Default state for new queue entries
impl Default for EntryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(EntryStatus::Declined.is_terminal());
        assert!(EntryStatus::Expired.is_terminal());
        assert!(EntryStatus::Reassigned.is_terminal());
        assert!(EntryStatus::Completed.is_terminal());
        assert!(!EntryStatus::Pending.is_terminal());
        assert!(!EntryStatus::Notified.is_terminal());
        assert!(!EntryStatus::Accepted.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in EntryStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in EntryStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn test_declined_cannot_be_renotified() {
        assert!(!EntryStatus::Declined.can_transition_to(EntryStatus::Notified));
        assert!(EntryStatus::Notified.can_transition_to(EntryStatus::Declined));
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(EntryStatus::Reassigned.to_string(), "reassigned");
        assert_eq!(
            "notified".parse::<EntryStatus>().unwrap(),
            EntryStatus::Notified
        );
        assert!("cancelled".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&EntryStatus::Accepted).unwrap();
        assert_eq!(json, "\"accepted\"");

        let parsed: EntryStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntryStatus::Accepted);
    }
}
