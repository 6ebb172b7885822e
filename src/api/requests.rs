//! Request bodies and query strings accepted at the boundary.
//!
//! Everything here is validated before it reaches the engine: identifiers
//! must be positive integers, weights are checked against the closed key set,
//! and numeric fields are range-checked. Unknown status tokens are the one
//! exception and are dropped rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::BuilderSettings;
use crate::error::{AutoAssignError, Result};
use crate::models::{Metadata, TargetRef, TargetType};
use crate::orchestration::{BuilderConfig, FairnessConfig, RegenerationPolicy};
use crate::scoring::PartialWeights;
use crate::services::{QueueFilter, QueueView};
use crate::utils::serde::parse_positive_id;

/// Partial fairness block; omitted fields keep their configured defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FairnessOverrides {
    pub ensure_newcomer: Option<bool>,
    pub max_assignments: Option<u32>,
    pub window_days: Option<u32>,
}

impl FairnessOverrides {
    pub fn apply(&self, base: &FairnessConfig) -> FairnessConfig {
        FairnessConfig {
            ensure_newcomer: self.ensure_newcomer.unwrap_or(base.ensure_newcomer),
            max_assignments: self.max_assignments.unwrap_or(base.max_assignments),
            window_days: self.window_days.unwrap_or(base.window_days),
        }
    }
}

/// Body of `POST /targets/{id}/enqueue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnqueueRequest {
    pub target_type: TargetType,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub expires_in_minutes: Option<u32>,
    /// Closed key set; parsed with [`PartialWeights::from_json_map`]
    #[serde(default)]
    pub weights: Option<Map<String, Value>>,
    #[serde(default)]
    pub fairness: Option<FairnessOverrides>,
    #[serde(default)]
    pub project_value: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Overrides the configured regeneration policy for this request
    #[serde(default)]
    pub policy: Option<RegenerationPolicy>,
}

impl EnqueueRequest {
    pub fn from_json(body: Value) -> Result<Self> {
        Ok(serde_json::from_value(body)?)
    }

    /// Merge this request over the configured builder defaults.
    pub fn into_builder_config(self, defaults: &BuilderSettings) -> Result<BuilderConfig> {
        let weights = match &self.weights {
            Some(map) => PartialWeights::from_json_map(map)?,
            None => PartialWeights::default(),
        };
        let config = BuilderConfig {
            limit: self.limit.unwrap_or(defaults.limit),
            expires_in_minutes: self.expires_in_minutes.unwrap_or(defaults.expires_in_minutes),
            weights,
            fairness: self
                .fairness
                .map_or_else(|| defaults.fairness.clone(), |o| o.apply(&defaults.fairness)),
            project_value: self.project_value,
            metadata: self.metadata.unwrap_or_default(),
        };
        config.validate(defaults.max_limit)?;
        Ok(config)
    }
}

/// Raw `GET queue?...` parameters, exactly as they arrive in a query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueueQuery {
    pub freelancer_id: Option<String>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    /// Comma-separated status tokens
    pub statuses: Option<String>,
    pub view: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl ListQueueQuery {
    pub fn into_filter(self) -> Result<QueueFilter> {
        let freelancer_id = non_empty(&self.freelancer_id)
            .map(|raw| parse_positive_id("freelancerId", raw))
            .transpose()?;

        let target = match (non_empty(&self.target_id), non_empty(&self.target_type)) {
            (Some(id), Some(kind)) => Some(parse_target(kind, id)?),
            (Some(_), None) => {
                return Err(AutoAssignError::validation(
                    "targetType is required with targetId",
                ))
            }
            (None, Some(_)) => {
                return Err(AutoAssignError::validation(
                    "targetId is required with targetType",
                ))
            }
            (None, None) => None,
        };

        let view = non_empty(&self.view)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "freelancer" => Ok(QueueView::Freelancer),
                "audit" => Ok(QueueView::Audit),
                other => Err(AutoAssignError::validation(format!(
                    "view must be 'freelancer' or 'audit', got '{other}'"
                ))),
            })
            .transpose()?;

        Ok(QueueFilter {
            freelancer_id,
            target,
            statuses: self.statuses.into_iter().collect(),
            view,
            page: parse_count("page", &self.page)?,
            page_size: parse_count("pageSize", &self.page_size)?,
        })
    }
}

/// Parse a `(targetType, targetId)` pair from path or query segments.
pub fn parse_target(target_type: &str, target_id: &str) -> Result<TargetRef> {
    let target_type = target_type
        .parse::<TargetType>()
        .map_err(AutoAssignError::Validation)?;
    Ok(TargetRef::new(
        target_type,
        parse_positive_id("targetId", target_id)?,
    ))
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().filter(|value| !value.trim().is_empty())
}

fn parse_count(field: &str, raw: &Option<String>) -> Result<Option<u32>> {
    non_empty(raw)
        .map(|value| {
            value.trim().parse::<u32>().map_err(|_| {
                AutoAssignError::validation(format!(
                    "{field} must be a non-negative integer, got '{value}'"
                ))
            })
        })
        .transpose()
}
