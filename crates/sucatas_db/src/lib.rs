//! Postgres repository for the Ache Sucatas datastore (Supabase's
//! database).
//!
//! One connection pool, one `SucatasDb` handle, operations grouped by
//! domain across the files of this crate:
//! - `editais`: primary-table upserts behind the capacity safety brake
//! - `quarantine`: rejection rows keyed by `(run_id, id_interno)`
//! - `runs`: execution history and batched pipeline events
//! - `taxonomy`: tag keyword table and auctioneer whitelist

mod editais;
mod error;
mod quarantine;
mod runs;
mod schema;
mod taxonomy;

pub use error::{DbError, Result};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Repository handle. Cheap to clone; all methods take `&self`.
#[derive(Clone)]
pub struct SucatasDb {
    pool: PgPool,
    /// Safety brake: primary-table writes fail closed at this row count.
    max_primary_rows: i64,
}

impl SucatasDb {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_primary_rows: i64) -> Result<Self> {
        if database_url.is_empty() {
            return Err(DbError::Config("database URL is empty".to_string()));
        }
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let db = Self {
            pool,
            max_primary_rows,
        };
        db.ensure_schema().await?;
        info!(max_primary_rows, "datastore connected");
        Ok(db)
    }

    /// Wrap an existing pool (tests, embedded use).
    pub fn from_pool(pool: PgPool, max_primary_rows: i64) -> Self {
        Self {
            pool,
            max_primary_rows,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
