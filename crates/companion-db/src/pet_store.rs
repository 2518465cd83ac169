//! `PostgreSQL`-backed [`PetStore`].
//!
//! The pet is stored as a `JSONB` document on its entity row; the
//! generation status and start time are mirrored into plain columns so the
//! stale-job sweeper can find in-flight jobs with an index scan.
//!
//! Compare-and-swap is a single conditional update:
//!
//! ```text
//! UPDATE entities SET ..., version = version + 1
//!  WHERE entity_id = $1 AND version = $expected
//! ```
//!
//! and award rows are inserted in the same transaction.
//!
//! Queries are built at runtime (not compile-time checked) so the workspace
//! builds without a live database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use companion_types::{EntityId, EntityRecord, PetRecord, TokenAward};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use uuid::Uuid;

use crate::error::DbError;
use crate::store::{CasOutcome, PetStore};

/// Entity store on a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgPetStore {
    pool: PgPool,
}

/// How long a request waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl PgPetStore {
    /// Open a pool on `database_url` and bring the `entities` and
    /// `token_awards` tables up to date.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unparsable URL,
    /// [`DbError::Postgres`] if no connection can be made, or
    /// [`DbError::Migration`] if the schema cannot be applied.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = database_url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(max_connections, "pet store connected, schema current");
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl PetStore for PgPetStore {
    async fn get(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, DbError> {
        let row = sqlx::query_as::<_, EntityRow>(
            r"SELECT entity_id, version, pet, created_at
              FROM entities
              WHERE entity_id = $1",
        )
        .bind(entity_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRow::into_record).transpose()
    }

    async fn register_entity(&self, entity_id: EntityId) -> Result<EntityRecord, DbError> {
        let record = EntityRecord::new(entity_id);
        let inserted = sqlx::query(
            r"INSERT INTO entities (entity_id, version, pet, created_at)
              VALUES ($1, 0, NULL, $2)
              ON CONFLICT (entity_id) DO NOTHING",
        )
        .bind(entity_id.into_inner())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(DbError::EntityExists(entity_id));
        }
        Ok(record)
    }

    async fn remove_entity(&self, entity_id: EntityId) -> Result<bool, DbError> {
        // token_awards rows go with it via ON DELETE CASCADE.
        let removed = sqlx::query(r"DELETE FROM entities WHERE entity_id = $1")
            .bind(entity_id.into_inner())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn compare_and_swap(
        &self,
        next: &EntityRecord,
        expected_version: u64,
        awards: &[TokenAward],
    ) -> Result<CasOutcome, DbError> {
        let expected = to_i64(expected_version, "version")?;
        let pet = next.pet.as_ref().map(serde_json::to_value).transpose()?;
        let status = next
            .pet
            .as_ref()
            .map_or("none", |p| p.generation.status.as_str());
        let started_at = next.pet.as_ref().and_then(|p| p.generation.started_at);

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"UPDATE entities
              SET pet = $3,
                  generation_status = $4,
                  generation_started_at = $5,
                  version = version + 1,
                  updated_at = now()
              WHERE entity_id = $1 AND version = $2",
        )
        .bind(next.entity_id.into_inner())
        .bind(expected)
        .bind(&pet)
        .bind(status)
        .bind(started_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            let exists = sqlx::query_scalar::<_, i64>(
                r"SELECT COUNT(*) FROM entities WHERE entity_id = $1",
            )
            .bind(next.entity_id.into_inner())
            .fetch_one(&self.pool)
            .await?;
            if exists == 0 {
                return Err(DbError::EntityNotFound(next.entity_id));
            }
            return Ok(CasOutcome::Conflict);
        }

        for award in awards {
            sqlx::query(
                r"INSERT INTO token_awards
                  (id, entity_id, requested_delta, applied_delta, balance_after, reason, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(award.id.into_inner())
            .bind(award.entity_id.into_inner())
            .bind(award.requested_delta)
            .bind(award.applied_delta)
            .bind(to_i64(award.balance_after, "balance_after")?)
            .bind(&award.reason)
            .bind(award.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut stored = next.clone();
        stored.version = expected_version
            .checked_add(1)
            .ok_or_else(|| DbError::Corrupt(format!("version overflow on {}", next.entity_id)))?;
        tracing::debug!(
            entity_id = %next.entity_id,
            version = stored.version,
            awards = awards.len(),
            "entity record committed"
        );
        Ok(CasOutcome::Committed(stored))
    }

    async fn awards_for(&self, entity_id: EntityId) -> Result<Vec<TokenAward>, DbError> {
        let rows = sqlx::query_as::<_, AwardRow>(
            r"SELECT id, entity_id, requested_delta, applied_delta, balance_after, reason, created_at
              FROM token_awards
              WHERE entity_id = $1
              ORDER BY seq",
        )
        .bind(entity_id.into_inner())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AwardRow::into_award).collect()
    }

    async fn list_in_flight(&self) -> Result<Vec<EntityRecord>, DbError> {
        let rows = sqlx::query_as::<_, EntityRow>(
            r"SELECT entity_id, version, pet, created_at
              FROM entities
              WHERE generation_status IN ('pending', 'generating')
              ORDER BY generation_started_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntityRow::into_record).collect()
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from the `entities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntityRow {
    /// Owning entity.
    pub entity_id: Uuid,
    /// Optimistic-concurrency counter.
    pub version: i64,
    /// The pet document, if hatched.
    pub pet: Option<serde_json::Value>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl EntityRow {
    /// Convert the row into a domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] for an unreadable pet document or
    /// [`DbError::Corrupt`] for a negative version.
    pub fn into_record(self) -> Result<EntityRecord, DbError> {
        let pet: Option<PetRecord> = self.pet.map(serde_json::from_value).transpose()?;
        Ok(EntityRecord {
            entity_id: EntityId::from(self.entity_id),
            version: u64::try_from(self.version)
                .map_err(|e| DbError::Corrupt(format!("negative version on {}: {e}", self.entity_id)))?,
            pet,
            created_at: self.created_at,
        })
    }
}

/// A row from the `token_awards` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AwardRow {
    /// Award id.
    pub id: Uuid,
    /// Owning entity.
    pub entity_id: Uuid,
    /// Delta the caller requested.
    pub requested_delta: i64,
    /// Delta applied after clamping.
    pub applied_delta: i64,
    /// Balance after the award.
    pub balance_after: i64,
    /// Attribution.
    pub reason: String,
    /// When the award was recorded.
    pub created_at: DateTime<Utc>,
}

impl AwardRow {
    /// Convert the row into a domain award.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] for a negative balance.
    pub fn into_award(self) -> Result<TokenAward, DbError> {
        Ok(TokenAward {
            id: self.id.into(),
            entity_id: self.entity_id.into(),
            requested_delta: self.requested_delta,
            applied_delta: self.applied_delta,
            balance_after: u64::try_from(self.balance_after)
                .map_err(|e| DbError::Corrupt(format!("negative balance on award {}: {e}", self.id)))?,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|e| DbError::Corrupt(format!("{field} {value} exceeds BIGINT: {e}")))
}
