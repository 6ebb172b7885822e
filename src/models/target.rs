//! # Target Model
//!
//! A target is the work item a queue is built for. Targets live outside the
//! engine; only their identity is carried here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work item being matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Project,
    Gig,
    Job,
    Launchpad,
    Volunteer,
}

impl TargetType {
    pub const ALL: &'static [TargetType] = &[
        Self::Project,
        Self::Gig,
        Self::Job,
        Self::Launchpad,
        Self::Volunteer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Gig => "gig",
            Self::Job => "job",
            Self::Launchpad => "launchpad",
            Self::Volunteer => "volunteer",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "gig" => Ok(Self::Gig),
            "job" => Ok(Self::Job),
            "launchpad" => Ok(Self::Launchpad),
            "volunteer" => Ok(Self::Volunteer),
            other => Err(format!("Invalid target type: {other}")),
        }
    }
}

/// Identity of one target queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub target_type: TargetType,
    pub target_id: i64,
}

impl TargetRef {
    pub fn new(target_type: TargetType, target_id: i64) -> Self {
        Self {
            target_type,
            target_id,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_type_parsing() {
        assert_eq!("gig".parse::<TargetType>().unwrap(), TargetType::Gig);
        assert_eq!(
            " Launchpad ".parse::<TargetType>().unwrap(),
            TargetType::Launchpad
        );
        assert!("contest".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_target_ref_display() {
        let target = TargetRef::new(TargetType::Volunteer, 17);
        assert_eq!(target.to_string(), "volunteer:17");
    }
}
