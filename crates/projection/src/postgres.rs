//! PostgreSQL-backed projection store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::Result;
use crate::fork::BlockRef;
use crate::rows::{
    ActorRow, ClassRow, EduProgramRow, EnvironmentRow, ProjectedEntity, RecordRow, VotingRow,
};
use crate::store::ProjectionStore;

/// Entity tables written by upserts and targeted by fork rollback.
///
/// Every table listed here must appear in [`SCHEMA`] and vice versa (minus
/// `blocks`); the audit test below enforces it.
pub(crate) const ENTITY_TABLES: &[&str] = &[
    "actors",
    "records",
    "classes",
    "edu_programs",
    "votings",
    "environment",
];

const SCHEMA: &[(&str, &str)] = &[
    (
        "blocks",
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            block_num  bigint PRIMARY KEY,
            block_id   varchar NOT NULL
        )
        "#,
    ),
    (
        "actors",
        r#"
        CREATE TABLE IF NOT EXISTS actors (
            address            varchar PRIMARY KEY,
            actor_public_key   varchar NOT NULL,
            manager_public_key varchar NOT NULL,
            id                 varchar NOT NULL,
            role               varchar NOT NULL,
            status             varchar NOT NULL,
            start_block_num    bigint NOT NULL,
            timestamp          timestamptz NOT NULL,
            transaction_id     varchar NOT NULL
        )
        "#,
    ),
    (
        "records",
        r#"
        CREATE TABLE IF NOT EXISTS records (
            address            varchar PRIMARY KEY,
            owner_public_key   varchar NOT NULL,
            issuer_public_key  varchar NOT NULL,
            manager_public_key varchar NOT NULL,
            record_id          varchar NOT NULL,
            portfolio_id       varchar NOT NULL,
            record_status      varchar NOT NULL,
            record_type        varchar NOT NULL,
            start_block_num    bigint NOT NULL,
            timestamp          timestamptz NOT NULL,
            transaction_id     varchar NOT NULL
        )
        "#,
    ),
    (
        "classes",
        r#"
        CREATE TABLE IF NOT EXISTS classes (
            address                varchar NOT NULL,
            student_public_key     varchar NOT NULL,
            class_id               varchar NOT NULL,
            institution_public_key varchar NOT NULL,
            subject_id             varchar NOT NULL,
            teacher_public_key     varchar NOT NULL,
            credit                 int NOT NULL,
            start_block_num        bigint NOT NULL,
            timestamp              timestamptz NOT NULL,
            transaction_id         varchar NOT NULL,
            PRIMARY KEY (address, student_public_key)
        )
        "#,
    ),
    (
        "edu_programs",
        r#"
        CREATE TABLE IF NOT EXISTS edu_programs (
            address            varchar PRIMARY KEY,
            owner_public_key   varchar NOT NULL,
            manager_public_key varchar NOT NULL,
            id                 varchar NOT NULL,
            name               varchar NOT NULL,
            total_credit       int NOT NULL,
            min_year           smallint NOT NULL,
            max_year           smallint NOT NULL,
            start_block_num    bigint NOT NULL,
            timestamp          timestamptz NOT NULL,
            transaction_id     varchar NOT NULL
        )
        "#,
    ),
    (
        "votings",
        r#"
        CREATE TABLE IF NOT EXISTS votings (
            address              varchar PRIMARY KEY,
            publisher_public_key varchar NOT NULL,
            elector_public_key   varchar NOT NULL,
            vote_type            varchar NOT NULL,
            vote_result          varchar NOT NULL,
            close_vote_timestamp timestamptz NOT NULL,
            start_block_num      bigint NOT NULL,
            timestamp            timestamptz NOT NULL,
            transaction_id       varchar NOT NULL
        )
        "#,
    ),
    (
        "environment",
        r#"
        CREATE TABLE IF NOT EXISTS environment (
            address         varchar PRIMARY KEY,
            id              varchar NOT NULL,
            data            varchar NOT NULL,
            start_block_num bigint NOT NULL,
            timestamp       timestamptz NOT NULL,
            transaction_id  varchar NOT NULL
        )
        "#,
    ),
];

/// PostgreSQL projection store.
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    /// Wraps an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with exponential backoff.
    #[tracing::instrument(skip(url))]
    pub async fn connect(url: &str, retries: u32, initial_delay: Duration) -> Result<Self> {
        let mut delay = initial_delay;
        for attempt in 0..retries {
            match PgPoolOptions::new().max_connections(5).connect(url).await {
                Ok(pool) => {
                    tracing::info!("connected to database");
                    return Ok(Self { pool });
                }
                Err(err) => {
                    tracing::debug!(
                        %err,
                        remaining = retries - attempt,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        tracing::info!("connected to database");
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the projection tables if they do not exist.
    pub async fn create_tables(&self) -> Result<()> {
        for (name, ddl) in SCHEMA {
            tracing::debug!(table = name, "creating table");
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn drop_fork(tx: &mut Transaction<'_, Postgres>, block_num: i64) -> Result<()> {
        for table in ENTITY_TABLES {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE start_block_num >= $1"
            ))
            .bind(block_num)
            .execute(&mut **tx)
            .await?;
        }
        sqlx::query("DELETE FROM blocks WHERE block_num >= $1")
            .bind(block_num)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn upsert(tx: &mut Transaction<'_, Postgres>, row: &ProjectedEntity) -> Result<()> {
        match row {
            ProjectedEntity::Actor(row) => Self::upsert_actor(tx, row).await,
            ProjectedEntity::Record(row) => Self::upsert_record(tx, row).await,
            ProjectedEntity::Class(row) => Self::upsert_class(tx, row).await,
            ProjectedEntity::EduProgram(row) => Self::upsert_edu_program(tx, row).await,
            ProjectedEntity::Voting(row) => Self::upsert_voting(tx, row).await,
            ProjectedEntity::Environment(row) => Self::upsert_environment(tx, row).await,
        }
    }

    async fn upsert_actor(tx: &mut Transaction<'_, Postgres>, row: &ActorRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO actors (address, actor_public_key, manager_public_key, id, role,
                                status, start_block_num, timestamp, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (address) DO UPDATE SET
                status = EXCLUDED.status,
                start_block_num = EXCLUDED.start_block_num,
                timestamp = EXCLUDED.timestamp,
                transaction_id = EXCLUDED.transaction_id
            "#,
        )
        .bind(row.address.as_str())
        .bind(row.actor_public_key.as_str())
        .bind(row.manager_public_key.as_str())
        .bind(&row.id)
        .bind(&row.role)
        .bind(&row.status)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_record(tx: &mut Transaction<'_, Postgres>, row: &RecordRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (address, owner_public_key, issuer_public_key,
                                 manager_public_key, record_id, portfolio_id, record_status,
                                 record_type, start_block_num, timestamp, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (address) DO UPDATE SET
                portfolio_id = EXCLUDED.portfolio_id,
                record_status = EXCLUDED.record_status,
                start_block_num = EXCLUDED.start_block_num,
                timestamp = EXCLUDED.timestamp,
                transaction_id = EXCLUDED.transaction_id
            "#,
        )
        .bind(row.address.as_str())
        .bind(row.owner_public_key.as_str())
        .bind(row.issuer_public_key.as_str())
        .bind(row.manager_public_key.as_str())
        .bind(&row.record_id)
        .bind(&row.portfolio_id)
        .bind(&row.record_status)
        .bind(&row.record_type)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_class(tx: &mut Transaction<'_, Postgres>, row: &ClassRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO classes (address, student_public_key, class_id,
                                 institution_public_key, subject_id, teacher_public_key,
                                 credit, start_block_num, timestamp, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (address, student_public_key) DO NOTHING
            "#,
        )
        .bind(row.address.as_str())
        .bind(row.student_public_key.as_str())
        .bind(&row.class_id)
        .bind(row.institution_public_key.as_str())
        .bind(&row.subject_id)
        .bind(row.teacher_public_key.as_str())
        .bind(row.credit)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_edu_program(
        tx: &mut Transaction<'_, Postgres>,
        row: &EduProgramRow,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO edu_programs (address, owner_public_key, manager_public_key, id,
                                      name, total_credit, min_year, max_year,
                                      start_block_num, timestamp, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(row.address.as_str())
        .bind(row.owner_public_key.as_str())
        .bind(row.manager_public_key.as_str())
        .bind(&row.id)
        .bind(&row.name)
        .bind(row.total_credit)
        .bind(row.min_year)
        .bind(row.max_year)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_voting(tx: &mut Transaction<'_, Postgres>, row: &VotingRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO votings (address, publisher_public_key, elector_public_key,
                                 vote_type, vote_result, close_vote_timestamp,
                                 start_block_num, timestamp, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (address) DO UPDATE SET
                vote_type = EXCLUDED.vote_type,
                vote_result = EXCLUDED.vote_result,
                close_vote_timestamp = EXCLUDED.close_vote_timestamp,
                start_block_num = EXCLUDED.start_block_num,
                timestamp = EXCLUDED.timestamp,
                transaction_id = EXCLUDED.transaction_id
            "#,
        )
        .bind(row.address.as_str())
        .bind(row.publisher_public_key.as_str())
        .bind(row.elector_public_key.as_str())
        .bind(&row.vote_type)
        .bind(&row.vote_result)
        .bind(row.close_vote_timestamp)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_environment(
        tx: &mut Transaction<'_, Postgres>,
        row: &EnvironmentRow,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO environment (address, id, data, start_block_num, timestamp,
                                     transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (address) DO UPDATE SET
                data = EXCLUDED.data,
                start_block_num = EXCLUDED.start_block_num,
                timestamp = EXCLUDED.timestamp,
                transaction_id = EXCLUDED.transaction_id
            "#,
        )
        .bind(row.address.as_str())
        .bind(&row.id)
        .bind(&row.data)
        .bind(row.start_block_num)
        .bind(row.timestamp)
        .bind(row.transaction_id.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn row_to_block(row: PgRow) -> Result<BlockRef> {
        Ok(BlockRef {
            block_num: row.try_get("block_num")?,
            block_id: row.try_get("block_id")?,
        })
    }
}

#[async_trait]
impl ProjectionStore for PostgresProjectionStore {
    async fn fetch_block(&self, block_num: i64) -> Result<Option<BlockRef>> {
        let row = sqlx::query("SELECT block_num, block_id FROM blocks WHERE block_num = $1")
            .bind(block_num)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_block).transpose()
    }

    async fn last_known_blocks(&self, count: i64) -> Result<Vec<BlockRef>> {
        let rows = sqlx::query(
            "SELECT block_num, block_id FROM blocks ORDER BY block_num DESC LIMIT $1",
        )
        .bind(count)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_block).collect()
    }

    #[tracing::instrument(skip(self, rows), fields(block_num = block.block_num, rows = rows.len()))]
    async fn apply_block(
        &self,
        block: &BlockRef,
        rollback_from: Option<i64>,
        rows: Vec<ProjectedEntity>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(block_num) = rollback_from {
            Self::drop_fork(&mut tx, block_num).await?;
        }

        for row in &rows {
            Self::upsert(&mut tx, row).await?;
        }

        sqlx::query(
            "INSERT INTO blocks (block_num, block_id) VALUES ($1, $2) \
             ON CONFLICT (block_num) DO NOTHING",
        )
        .bind(block.block_num)
        .bind(&block.block_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rollback and schema creation must agree on the table set, or a fork
    /// would try to delete from tables that were never created.
    #[test]
    fn rollback_targets_exactly_the_defined_entity_tables() {
        let schema_names: Vec<&str> = SCHEMA.iter().map(|(name, _)| *name).collect();
        assert!(schema_names.contains(&"blocks"));
        for table in ENTITY_TABLES {
            assert!(
                schema_names.contains(table),
                "rollback targets undefined table {table}"
            );
        }
        assert_eq!(schema_names.len(), ENTITY_TABLES.len() + 1);
    }

    #[test]
    fn every_entity_table_carries_start_block_num() {
        for (name, ddl) in SCHEMA {
            if *name == "blocks" {
                continue;
            }
            assert!(
                ddl.contains("start_block_num"),
                "table {name} cannot be rolled back without start_block_num"
            );
        }
    }
}
