//! Startup lookups: tag taxonomy and auctioneer whitelist.

use crate::error::Result;
use crate::SucatasDb;
use sqlx::Row;
use std::collections::HashSet;
use tracing::info;

impl SucatasDb {
    /// `(tag, keyword)` rows of the automotive taxonomy. An empty result
    /// means the caller should fall back to the compiled-in table.
    pub async fn load_taxonomy(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT tag, keyword FROM taxonomia_automotiva ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        let entries: Vec<(String, String)> = rows
            .iter()
            .map(|row| (row.get::<String, _>("tag"), row.get::<String, _>("keyword")))
            .collect();
        info!(entries = entries.len(), "taxonomy loaded");
        Ok(entries)
    }

    /// Trusted auctioneer hostnames, lowercase.
    pub async fn load_whitelist(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT hostname FROM leiloeiro_whitelist")
            .fetch_all(&self.pool)
            .await?;
        let hosts: HashSet<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("hostname").to_lowercase())
            .collect();
        info!(hosts = hosts.len(), "auctioneer whitelist loaded");
        Ok(hosts)
    }
}
