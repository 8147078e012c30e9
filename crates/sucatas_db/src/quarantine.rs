//! Quarantine-store operations.

use crate::error::Result;
use crate::SucatasDb;
use sqlx::Row;
use sucatas_protocol::RejectionRecord;
use tracing::debug;

impl SucatasDb {
    /// Insert a quarantine row; a record reappearing within the same run
    /// replaces its earlier entry instead of duplicating it.
    ///
    /// The safety brake covers quarantine too: at capacity ALL writes fail
    /// closed, not only the primary table.
    pub async fn upsert_quarentena(&self, rejection: &RejectionRecord) -> Result<()> {
        self.check_capacity().await?;
        sqlx::query(
            r#"
            INSERT INTO editais_quarentena (
                run_id, id_interno, status, errors, raw_record, normalized_record
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id, id_interno) DO UPDATE SET
                status = EXCLUDED.status,
                errors = EXCLUDED.errors,
                raw_record = EXCLUDED.raw_record,
                normalized_record = EXCLUDED.normalized_record
            "#,
        )
        .bind(&rejection.run_id)
        .bind(&rejection.id_interno)
        .bind(rejection.status.as_str())
        .bind(serde_json::to_value(&rejection.errors)?)
        .bind(&rejection.raw_record)
        .bind(&rejection.normalized_record)
        .execute(&self.pool)
        .await?;

        debug!(
            run_id = %rejection.run_id,
            id_interno = %rejection.id_interno,
            status = %rejection.status,
            "record quarantined"
        );
        Ok(())
    }

    /// Quarantine rows recorded for one run.
    pub async fn count_quarentena(&self, run_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM editais_quarentena WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("total"))
    }
}
