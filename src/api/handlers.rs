//! # Queue API Handlers
//!
//! Transport-independent handlers for the enqueue, patch, list and subscribe
//! surfaces. An HTTP or SSE adapter extracts raw path segments, query strings
//! and JSON bodies, calls these, and renders [`ApiError::body`] with
//! [`ApiError::status_code`] on failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::{ApiError, ApiResult};
use super::requests::{parse_target, EnqueueRequest, ListQueueQuery};
use crate::events::QueueSubscription;
use crate::models::{QueueEntry, TargetRef, TargetType};
use crate::orchestration::AutoAssignEngine;
use crate::services::{QueueListing, QueueVelocity};
use crate::state_machine::TransitionRequest;
use crate::utils::serde::parse_positive_id;

/// Response of a successful enqueue (regeneration)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub target_id: i64,
    pub target_type: TargetType,
    pub generation: i64,
    pub entries: Vec<QueueEntry>,
    /// Ids of earlier open entries invalidated by this generation
    pub reassigned: Vec<i64>,
    pub reserved_newcomer: Option<i64>,
    pub candidates_considered: usize,
}

#[derive(Debug, Clone)]
pub struct QueueApi {
    engine: Arc<AutoAssignEngine>,
}

impl QueueApi {
    pub fn new(engine: Arc<AutoAssignEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<AutoAssignEngine> {
        &self.engine
    }

    /// `POST /targets/{id}/enqueue`
    ///
    /// Every call regenerates; requests are never deduplicated.
    pub async fn enqueue(&self, target_id: &str, body: Value) -> ApiResult<EnqueueResponse> {
        let target_id = parse_positive_id("targetId", target_id)?;
        let request = EnqueueRequest::from_json(body)?;
        let target = TargetRef::new(request.target_type, target_id);
        let policy = request
            .policy
            .unwrap_or(self.engine.config().regeneration.policy);
        let config = request.into_builder_config(&self.engine.config().builder)?;

        let outcome = self
            .engine
            .coordinator()
            .regenerate_with_policy(target, &config, policy)
            .await?;

        info!(
            queue = %target,
            generation = outcome.generation,
            entries = outcome.entries.len(),
            reassigned = outcome.reassigned.len(),
            "Queue enqueued"
        );
        Ok(EnqueueResponse {
            target_id,
            target_type: target.target_type,
            generation: outcome.generation,
            reassigned: outcome.reassigned.iter().map(|entry| entry.id).collect(),
            entries: outcome.entries,
            reserved_newcomer: outcome.reserved_newcomer,
            candidates_considered: outcome.candidates_considered,
        })
    }

    /// `PATCH /queue/{entryId}`
    pub async fn update_entry(&self, entry_id: &str, body: Value) -> ApiResult<QueueEntry> {
        let entry_id = parse_positive_id("entryId", entry_id)?;
        let request: TransitionRequest = serde_json::from_value(body)
            .map_err(|e| ApiError::bad_request(format!("invalid transition payload: {e}")))?;
        debug!(entry_id, status = %request.status, "Entry update requested");
        Ok(self
            .engine
            .lifecycle()
            .update_queue_entry(entry_id, &request)
            .await?)
    }

    /// `GET queue?freelancerId=...` or `GET queue?targetId=...&targetType=...`
    pub async fn list(&self, query: ListQueueQuery) -> ApiResult<QueueListing> {
        let filter = query.into_filter()?;
        Ok(self.engine.list_queue(&filter).await?)
    }

    /// Long-lived per-target stream; the first event is always a snapshot.
    /// Reconnecting clients simply subscribe again.
    pub async fn subscribe(&self, target_type: &str, target_id: &str) -> ApiResult<QueueSubscription> {
        let target = parse_target(target_type, target_id)?;
        Ok(self.engine.subscribe(target).await?)
    }

    /// Velocity metrics for one target, or all targets when both are `None`.
    pub async fn velocity(
        &self,
        target_type: Option<&str>,
        target_id: Option<&str>,
    ) -> ApiResult<QueueVelocity> {
        let target = match (target_type, target_id) {
            (Some(kind), Some(id)) => Some(parse_target(kind, id)?),
            (None, None) => None,
            _ => {
                return Err(ApiError::bad_request(
                    "targetType and targetId must be given together",
                ))
            }
        };
        Ok(self.engine.velocity(target).await?)
    }
}
