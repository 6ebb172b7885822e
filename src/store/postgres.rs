//! PostgreSQL queue store.
//!
//! Generation swaps run in one transaction that first bumps the target's row
//! in `autoassign_target_generations`; that row lock serializes concurrent
//! swaps for the same target even across processes. Single-entry updates are
//! `UPDATE ... WHERE id = $1 AND status = $2 AND version = $3`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use super::{
    CasOutcome, EntryQuery, EntryScope, QueueStore, ReplacedGeneration, StoreError, StoreResult,
    REGENERATION_REASSIGN_REASON,
};
use crate::config::DatabaseSettings;
use crate::models::{EntryResponse, Metadata, NewQueueEntry, QueueEntry, TargetRef};
use crate::scoring::{ScoreBreakdown, ScoringWeights};
use crate::state_machine::EntryStatus;

const ONE_OPEN_ENTRY_INDEX: &str = "idx_autoassign_entries_one_open";

const ENTRY_COLUMNS: &str = "id, target_id, target_type, freelancer_id, generation, position, \
     status, score, priority_bucket, weights, breakdown, project_value, metadata, response, \
     invitation_ttl_minutes, version, created_at, updated_at, notified_at, expires_at, resolved_at";

#[derive(Debug, FromRow)]
struct QueueEntryRow {
    id: i64,
    target_id: i64,
    target_type: String,
    freelancer_id: i64,
    generation: i64,
    position: i32,
    status: String,
    score: f64,
    priority_bucket: Option<i32>,
    weights: Json<ScoringWeights>,
    breakdown: Json<ScoreBreakdown>,
    project_value: Option<f64>,
    metadata: Json<Metadata>,
    response: Option<Json<EntryResponse>>,
    invitation_ttl_minutes: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    notified_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = StoreError;

    fn try_from(row: QueueEntryRow) -> StoreResult<Self> {
        let entry_id = row.id;
        let corrupt = move |message: String| StoreError::CorruptRow { entry_id, message };
        let target_type = row.target_type.parse().map_err(corrupt)?;
        let status = row.status.parse().map_err(corrupt)?;
        let invitation_ttl_minutes = u32::try_from(row.invitation_ttl_minutes)
            .map_err(|_| corrupt(format!("negative ttl {}", row.invitation_ttl_minutes)))?;

        Ok(QueueEntry {
            id: row.id,
            target_id: row.target_id,
            target_type,
            freelancer_id: row.freelancer_id,
            generation: row.generation,
            position: row.position,
            status,
            score: row.score,
            priority_bucket: row.priority_bucket,
            weights: row.weights.0,
            breakdown: row.breakdown.0,
            project_value: row.project_value,
            metadata: row.metadata.0,
            response: row.response.map(|json| json.0),
            invitation_ttl_minutes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            notified_at: row.notified_at,
            expires_at: row.expires_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn into_entries(rows: Vec<QueueEntryRow>) -> StoreResult<Vec<QueueEntry>> {
    rows.into_iter().map(QueueEntry::try_from).collect()
}

fn status_tokens(statuses: &[EntryStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &EntryQuery) {
    match query.scope {
        EntryScope::Target(target) => {
            builder
                .push(" WHERE target_type = ")
                .push_bind(target.target_type.as_str())
                .push(" AND target_id = ")
                .push_bind(target.target_id);
        }
        EntryScope::Freelancer(freelancer_id) => {
            builder
                .push(" WHERE freelancer_id = ")
                .push_bind(freelancer_id);
        }
    }
    builder
        .push(" AND status = ANY(")
        .push_bind(status_tokens(&query.statuses))
        .push(")");
}

fn map_insert_error(error: sqlx::Error, target: TargetRef, freelancer_id: i64) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.constraint() == Some(ONE_OPEN_ENTRY_INDEX) {
            return StoreError::DuplicateOpenEntry {
                target,
                freelancer_id,
            };
        }
    }
    StoreError::from(error)
}

#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from settings; `database.url` falls back to `DATABASE_URL`.
    pub async fn connect(settings: &DatabaseSettings) -> StoreResult<Self> {
        let url = settings
            .url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| {
                StoreError::Backend("database.url is not set and DATABASE_URL is missing".into())
            })?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&url)
            .await?;
        info!(max_connections = settings.max_connections, "💾 Connected queue store pool");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bump_generation(
        tx: &mut Transaction<'_, Postgres>,
        target: TargetRef,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let generation: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO autoassign_target_generations (target_type, target_id, generation, updated_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (target_type, target_id)
            DO UPDATE SET generation = autoassign_target_generations.generation + 1,
                          updated_at = EXCLUDED.updated_at
            RETURNING generation
            "#,
        )
        .bind(target.target_type.as_str())
        .bind(target.target_id)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(generation)
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn replace_generation(
        &self,
        target: TargetRef,
        drafts: Vec<NewQueueEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<ReplacedGeneration> {
        let mut tx = self.pool.begin().await?;
        let generation = Self::bump_generation(&mut tx, target, now).await?;

        let reassigned_rows: Vec<QueueEntryRow> = sqlx::query_as(&format!(
            r#"
            UPDATE autoassign_queue_entries
            SET status = 'reassigned',
                expires_at = NULL,
                resolved_at = $3,
                updated_at = $3,
                version = version + 1,
                metadata = metadata || jsonb_build_object('reassignReason', $4::text)
            WHERE target_type = $1 AND target_id = $2
              AND status IN ('pending', 'notified')
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(target.target_type.as_str())
        .bind(target.target_id)
        .bind(now)
        .bind(REGENERATION_REASSIGN_REASON)
        .fetch_all(&mut *tx)
        .await?;
        let reassigned = into_entries(reassigned_rows)?;

        let insert_sql = format!(
            r#"
            INSERT INTO autoassign_queue_entries
                (target_id, target_type, freelancer_id, generation, position, status, score,
                 priority_bucket, weights, breakdown, project_value, metadata, response,
                 invitation_ttl_minutes, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $11, NULL, $12, 1, $13, $13)
            RETURNING {ENTRY_COLUMNS}
            "#
        );
        let mut entries = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let freelancer_id = draft.freelancer_id;
            let ttl = i32::try_from(draft.invitation_ttl_minutes)
                .map_err(|_| StoreError::Backend("invitation ttl out of range".into()))?;
            let row: QueueEntryRow = sqlx::query_as(&insert_sql)
                .bind(draft.target_id)
                .bind(draft.target_type.as_str())
                .bind(draft.freelancer_id)
                .bind(generation)
                .bind(draft.position)
                .bind(draft.score)
                .bind(draft.priority_bucket)
                .bind(Json(draft.weights))
                .bind(Json(draft.breakdown))
                .bind(draft.project_value)
                .bind(Json(draft.metadata))
                .bind(ttl)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_insert_error(e, target, freelancer_id))?;
            entries.push(QueueEntry::try_from(row)?);
        }

        tx.commit().await?;
        debug!(
            queue = %target,
            generation,
            inserted = entries.len(),
            reassigned = reassigned.len(),
            "Committed queue generation"
        );

        Ok(ReplacedGeneration {
            generation,
            entries,
            reassigned,
        })
    }

    async fn get_entry(&self, entry_id: i64) -> StoreResult<Option<QueueEntry>> {
        let row: Option<QueueEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn compare_and_swap(
        &self,
        updated: &QueueEntry,
        expected_status: EntryStatus,
        expected_version: i64,
    ) -> StoreResult<CasOutcome> {
        let row: Option<QueueEntryRow> = sqlx::query_as(&format!(
            r#"
            UPDATE autoassign_queue_entries
            SET status = $4,
                metadata = $5,
                response = $6,
                version = $7,
                updated_at = $8,
                expires_at = $9,
                resolved_at = $10,
                notified_at = $11
            WHERE id = $1 AND status = $2 AND version = $3
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(updated.id)
        .bind(expected_status.as_str())
        .bind(expected_version)
        .bind(updated.status.as_str())
        .bind(Json(&updated.metadata))
        .bind(updated.response.as_ref().map(Json))
        .bind(updated.version)
        .bind(updated.updated_at)
        .bind(updated.expires_at)
        .bind(updated.resolved_at)
        .bind(updated.notified_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(CasOutcome::Applied(QueueEntry::try_from(row)?)),
            None => match self.get_entry(updated.id).await? {
                Some(current) => Ok(CasOutcome::Conflict { current }),
                None => Ok(CasOutcome::Missing),
            },
        }
    }

    async fn list_entries(
        &self,
        query: &EntryQuery,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<QueueEntry>, u64)> {
        let order_clause = match query.scope {
            EntryScope::Target(_) => "generation DESC, position ASC, id ASC",
            EntryScope::Freelancer(_) => "created_at DESC, id DESC",
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM autoassign_queue_entries");
        push_filter(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut page = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries"
        ));
        push_filter(&mut page, query);
        page.push(format!(" ORDER BY {order_clause} OFFSET "))
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        let rows: Vec<QueueEntryRow> = page.build_query_as().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        Ok((into_entries(rows)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn find_due_expirations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueueEntry>> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries \
             WHERE status = 'notified' AND expires_at <= $1 \
             ORDER BY expires_at ASC, id ASC LIMIT $2"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn current_generation(&self, target: TargetRef) -> StoreResult<Option<i64>> {
        let generation: Option<i64> = sqlx::query_scalar(
            "SELECT generation FROM autoassign_target_generations \
             WHERE target_type = $1 AND target_id = $2",
        )
        .bind(target.target_type.as_str())
        .bind(target.target_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(generation)
    }

    async fn current_entries(&self, target: TargetRef) -> StoreResult<Vec<QueueEntry>> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries e
            WHERE e.target_type = $1 AND e.target_id = $2
              AND e.generation = (
                  SELECT g.generation FROM autoassign_target_generations g
                  WHERE g.target_type = $1 AND g.target_id = $2
              )
            ORDER BY e.position ASC, e.id ASC
            "#
        ))
        .bind(target.target_type.as_str())
        .bind(target.target_id)
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn open_entries_for_freelancer(
        &self,
        freelancer_id: i64,
    ) -> StoreResult<Vec<QueueEntry>> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries \
             WHERE freelancer_id = $1 AND status IN ('pending', 'notified') ORDER BY id"
        ))
        .bind(freelancer_id)
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }

    async fn resolved_since(
        &self,
        target: Option<TargetRef>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueueEntry>> {
        let rows: Vec<QueueEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM autoassign_queue_entries \
             WHERE resolved_at >= $1 \
               AND ($2::text IS NULL OR (target_type = $2 AND target_id = $3)) \
             ORDER BY resolved_at, id"
        ))
        .bind(since)
        .bind(target.map(|t| t.target_type.as_str()))
        .bind(target.map(|t| t.target_id))
        .fetch_all(&self.pool)
        .await?;
        into_entries(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetType;

    fn draft(freelancer_id: i64, position: i32) -> NewQueueEntry {
        NewQueueEntry {
            target_id: 7,
            target_type: TargetType::Gig,
            freelancer_id,
            position,
            score: 42.5,
            priority_bucket: None,
            weights: ScoringWeights::default(),
            breakdown: ScoreBreakdown::default(),
            project_value: Some(1200.0),
            metadata: Metadata::new(),
            invitation_ttl_minutes: 30,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_generation_swap_round_trip(pool: PgPool) {
        let store = PgQueueStore::new(pool);
        let target = TargetRef::new(TargetType::Gig, 7);
        let now = Utc::now();

        let first = store
            .replace_generation(target, vec![draft(1, 1), draft(2, 2)], now)
            .await
            .unwrap();
        assert_eq!(first.generation, 1);

        let second = store
            .replace_generation(target, vec![draft(2, 1)], now)
            .await
            .unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(second.reassigned.len(), 2);
        assert_eq!(store.current_entries(target).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_compare_and_swap_conflict(pool: PgPool) {
        let store = PgQueueStore::new(pool);
        let target = TargetRef::new(TargetType::Gig, 7);
        let now = Utc::now();
        let entry = store
            .replace_generation(target, vec![draft(1, 1)], now)
            .await
            .unwrap()
            .entries
            .remove(0);

        let mut notified = entry.clone();
        notified.status = EntryStatus::Notified;
        notified.version += 1;
        notified.expires_at = Some(now + chrono::Duration::minutes(30));

        let applied = store
            .compare_and_swap(&notified, EntryStatus::Pending, entry.version)
            .await
            .unwrap();
        assert!(matches!(applied, CasOutcome::Applied(_)));

        let stale = store
            .compare_and_swap(&notified, EntryStatus::Pending, entry.version)
            .await
            .unwrap();
        assert!(matches!(stale, CasOutcome::Conflict { .. }));
    }
}
