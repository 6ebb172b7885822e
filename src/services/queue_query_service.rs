use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::QuerySettings;
use crate::constants::status_groups::{AUDIT_VIEW_DEFAULT, FREELANCER_VIEW_DEFAULT};
use crate::error::{AutoAssignError, Result};
use crate::models::{QueueEntry, TargetRef};
use crate::query_builder::{Pagination, PaginationInfo};
use crate::resilience::{retry_with_backoff, BackoffConfig};
use crate::state_machine::EntryStatus;
use crate::store::{EntryQuery, EntryScope, QueueStore};

/// Which default status set applies when a filter names none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueView {
    /// Entries a freelancer can still act on
    Freelancer,
    /// Full history
    Audit,
}

impl QueueView {
    pub fn default_statuses(&self) -> &'static [EntryStatus] {
        match self {
            Self::Freelancer => FREELANCER_VIEW_DEFAULT,
            Self::Audit => AUDIT_VIEW_DEFAULT,
        }
    }
}

/// Listing filter as received from a caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueFilter {
    pub freelancer_id: Option<i64>,
    pub target: Option<TargetRef>,
    /// Raw status tokens; unknown ones are dropped
    pub statuses: Vec<String>,
    /// Defaults to `Freelancer` for freelancer listings and `Audit` for
    /// target listings
    pub view: Option<QueueView>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl QueueFilter {
    pub fn for_freelancer(freelancer_id: i64) -> Self {
        Self {
            freelancer_id: Some(freelancer_id),
            ..Self::default()
        }
    }

    pub fn for_target(target: TargetRef) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn with_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn with_view(mut self, view: QueueView) -> Self {
        self.view = Some(view);
        self
    }
}

/// Parse status tokens, silently dropping unknown or malformed ones.
///
/// Tokens may also be comma-separated lists. The result keeps the first
/// occurrence order and contains no duplicates; it may be empty.
pub fn parse_status_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<EntryStatus> {
    let mut statuses = Vec::new();
    for status in tokens
        .iter()
        .flat_map(|token| token.as_ref().split(','))
        .filter_map(|token| token.trim().to_ascii_lowercase().parse::<EntryStatus>().ok())
    {
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    statuses
}

/// One page of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListing {
    pub entries: Vec<QueueEntry>,
    pub pagination: PaginationInfo,
}

/// Paginated, filterable read API over stored entries
#[derive(Debug, Clone)]
pub struct QueueQueryService {
    store: Arc<dyn QueueStore>,
    settings: QuerySettings,
    read_timeout: Duration,
    retry: BackoffConfig,
}

impl QueueQueryService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        settings: QuerySettings,
        read_timeout: Duration,
        retry: BackoffConfig,
    ) -> Self {
        Self {
            store,
            settings,
            read_timeout,
            retry,
        }
    }

    /// Validate a filter into a store query plus page.
    pub fn resolve(&self, filter: &QueueFilter) -> Result<(EntryQuery, Pagination)> {
        let scope = match (filter.freelancer_id, filter.target) {
            (Some(id), None) => {
                require_positive("freelancerId", id)?;
                EntryScope::Freelancer(id)
            }
            (None, Some(target)) => {
                require_positive("targetId", target.target_id)?;
                EntryScope::Target(target)
            }
            (Some(_), Some(_)) => {
                return Err(AutoAssignError::validation(
                    "freelancerId and targetId are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(AutoAssignError::validation(
                    "either freelancerId or targetId is required",
                ))
            }
        };

        let view = filter.view.unwrap_or(match scope {
            EntryScope::Freelancer(_) => QueueView::Freelancer,
            EntryScope::Target(_) => QueueView::Audit,
        });
        let mut statuses = parse_status_tokens(&filter.statuses);
        if statuses.is_empty() {
            statuses = view.default_statuses().to_vec();
        }

        let page = filter.page.unwrap_or(1);
        if page == 0 {
            return Err(AutoAssignError::validation("page must be at least 1"));
        }
        let page_size = filter.page_size.unwrap_or(self.settings.default_page_size);
        if page_size == 0 || page_size > self.settings.max_page_size {
            return Err(AutoAssignError::validation(format!(
                "pageSize must be between 1 and {}, got {page_size}",
                self.settings.max_page_size
            )));
        }

        Ok((EntryQuery { scope, statuses }, Pagination::new(page, page_size)))
    }

    pub async fn list_queue(&self, filter: &QueueFilter) -> Result<QueueListing> {
        let (query, pagination) = self.resolve(filter)?;

        let read_timeout = self.read_timeout;
        let store = &self.store;
        let query_ref = &query;
        let (entries, total) = retry_with_backoff("list_entries", &self.retry, || async move {
            tokio::time::timeout(
                read_timeout,
                store.list_entries(query_ref, pagination.offset(), pagination.limit()),
            )
            .await
            .map_err(|_| {
                AutoAssignError::Timeout(format!(
                    "queue listing after {}ms",
                    read_timeout.as_millis()
                ))
            })?
            .map_err(AutoAssignError::from)
        })
        .await?;

        debug!(
            scope = ?query.scope,
            statuses = ?query.statuses,
            page = pagination.page,
            returned = entries.len(),
            total,
            "Listed queue entries"
        );

        Ok(QueueListing {
            entries,
            pagination: pagination.info(total),
        })
    }
}

fn require_positive(field: &str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(AutoAssignError::validation(format!(
            "{field} must be a positive integer, got {value}"
        )));
    }
    Ok(())
}
