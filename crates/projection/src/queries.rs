//! Read queries for the external reporting layer.
//!
//! These run against the same pool as the writer; Postgres read-committed
//! isolation means a reader never observes a partially applied block.

use addressing::{Address, manager_segment, owner_segment};
use common::{PrivilegedKeys, PublicKey};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::Result;
use crate::postgres::PostgresProjectionStore;
use crate::rows::RecordRow;

/// Certificate totals for one institution in one commit year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCount {
    pub institution_id: String,
    pub year: i32,
    pub certificates: i64,
}

fn row_to_record(row: PgRow) -> Result<RecordRow> {
    Ok(RecordRow {
        address: Address::new(row.try_get::<String, _>("address")?),
        owner_public_key: PublicKey::new(row.try_get::<String, _>("owner_public_key")?),
        issuer_public_key: PublicKey::new(row.try_get::<String, _>("issuer_public_key")?),
        manager_public_key: PublicKey::new(row.try_get::<String, _>("manager_public_key")?),
        record_id: row.try_get("record_id")?,
        portfolio_id: row.try_get("portfolio_id")?,
        record_status: row.try_get("record_status")?,
        record_type: row.try_get("record_type")?,
        start_block_num: row.try_get("start_block_num")?,
        timestamp: row.try_get("timestamp")?,
        transaction_id: row.try_get::<String, _>("transaction_id")?.into(),
    })
}

const RECORD_COLUMNS: &str = "address, owner_public_key, issuer_public_key, \
     manager_public_key, record_id, portfolio_id, record_status, record_type, \
     start_block_num, timestamp, transaction_id";

impl PostgresProjectionStore {
    /// Fetches the projected record at an address.
    pub async fn record_by_address(&self, address: &Address) -> Result<Option<RecordRow>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE address = $1"
        ))
        .bind(address.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_record).transpose()
    }

    /// Fetches every record whose address embeds `key`'s owner correlation
    /// segment — the `isOwner` predicate evaluated in SQL.
    pub async fn records_owned_by(&self, key: &PublicKey) -> Result<Vec<RecordRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE substr(address, 10, 10) = $1"
        ))
        .bind(owner_segment(key))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Fetches every record whose address embeds `key`'s manager correlation
    /// segment.
    pub async fn records_managed_by(&self, key: &PublicKey) -> Result<Vec<RecordRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE substr(address, 20, 10) = $1"
        ))
        .bind(manager_segment(key))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Certificate counts grouped by issuing institution and commit year.
    pub async fn certificate_counts_by_year(&self) -> Result<Vec<CertificateCount>> {
        let rows = sqlx::query(
            r#"
            SELECT actors.id AS institution_id,
                   EXTRACT(YEAR FROM records.timestamp)::int AS year,
                   COUNT(records.address) AS certificates
            FROM actors, records
            WHERE actors.role = 'INSTITUTION'
              AND records.record_type = 'CERTIFICATE'
              AND actors.actor_public_key = records.manager_public_key
            GROUP BY actors.id, EXTRACT(YEAR FROM records.timestamp)
            ORDER BY year, institution_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CertificateCount {
                    institution_id: row.try_get("institution_id")?,
                    year: row.try_get("year")?,
                    certificates: row.try_get("certificates")?,
                })
            })
            .collect()
    }

    /// Same as [`Self::certificate_counts_by_year`], restricted to
    /// institutions whose manager key is on the ministry list.
    pub async fn certificate_counts_by_ministry_year(
        &self,
        ministries: &PrivilegedKeys,
    ) -> Result<Vec<CertificateCount>> {
        let keys: Vec<String> = ministries.iter().map(|k| k.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT actors.id AS institution_id,
                   EXTRACT(YEAR FROM records.timestamp)::int AS year,
                   COUNT(records.address) AS certificates
            FROM actors, records
            WHERE actors.role = 'INSTITUTION'
              AND records.record_type = 'CERTIFICATE'
              AND actors.actor_public_key = records.manager_public_key
              AND actors.manager_public_key = ANY($1)
            GROUP BY actors.id, EXTRACT(YEAR FROM records.timestamp)
            ORDER BY year, institution_id
            "#,
        )
        .bind(&keys)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CertificateCount {
                    institution_id: row.try_get("institution_id")?,
                    year: row.try_get("year")?,
                    certificates: row.try_get("certificates")?,
                })
            })
            .collect()
    }
}
