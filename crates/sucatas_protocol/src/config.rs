//! Pipeline configuration shared by the orchestrator and its components.

use crate::defaults;
use crate::types::{RunMode, SourceName};
use serde::{Deserialize, Serialize};

/// Canonical pipeline configuration. Built once from CLI flags plus
/// environment and passed by reference; components never read the
/// environment themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    // Upstream endpoints
    pub search_endpoint: String,
    pub details_endpoint_template: String,
    pub files_endpoint_template: String,
    pub sitemap_url: Option<String>,

    // HTTP behavior
    pub user_agent: String,
    pub timeout_secs: u64,
    pub rate_limit_secs: f64,
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    pub backoff_cap_secs: f64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_secs: u64,

    // Discovery window
    pub dias_retroativos: u32,
    pub paginas_por_termo: u32,
    pub tamanho_pagina: u32,
    pub run_limit: Option<usize>,
    pub search_terms: Vec<String>,
    /// Restrict the run to one source when set.
    pub source_filter: Option<SourceName>,

    // Execution
    pub mode: RunMode,
    pub worker_pool_size: usize,
    pub pdf_parse_limit_secs: u64,

    // Datastore
    pub database_url: String,
    pub max_primary_rows: i64,

    // Blob storage
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub storage_bucket: String,

    // Optional enrichment
    pub openai_api_key: Option<String>,
    pub openai_model: String,

    // Alerting
    pub email_address: Option<String>,
    pub email_app_password: Option<String>,
    pub alert_email_to: Option<String>,

    pub versao_miner: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            search_endpoint: defaults::PNCP_SEARCH_ENDPOINT.to_string(),
            details_endpoint_template: defaults::PNCP_DETAILS_TEMPLATE.to_string(),
            files_endpoint_template: defaults::PNCP_FILES_TEMPLATE.to_string(),
            sitemap_url: None,
            user_agent: defaults::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: defaults::DEFAULT_TIMEOUT_SECS,
            rate_limit_secs: defaults::DEFAULT_RATE_LIMIT_SECS,
            max_retries: defaults::DEFAULT_MAX_RETRIES,
            backoff_base_secs: defaults::DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: defaults::DEFAULT_BACKOFF_CAP_SECS,
            breaker_failure_threshold: defaults::DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_reset_secs: defaults::DEFAULT_BREAKER_RESET_SECS,
            dias_retroativos: defaults::DEFAULT_DIAS_RETROATIVOS,
            paginas_por_termo: defaults::DEFAULT_PAGINAS_POR_TERMO,
            tamanho_pagina: defaults::DEFAULT_TAMANHO_PAGINA,
            run_limit: None,
            search_terms: defaults::DEFAULT_SEARCH_TERMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source_filter: None,
            mode: RunMode::Incremental,
            worker_pool_size: defaults::DEFAULT_WORKER_POOL_SIZE,
            pdf_parse_limit_secs: defaults::DEFAULT_PDF_PARSE_LIMIT_SECS,
            database_url: String::new(),
            max_primary_rows: defaults::DEFAULT_MAX_PRIMARY_ROWS,
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            storage_bucket: defaults::DEFAULT_STORAGE_BUCKET.to_string(),
            openai_api_key: None,
            openai_model: defaults::DEFAULT_OPENAI_MODEL.to_string(),
            email_address: None,
            email_app_password: None,
            alert_email_to: None,
            versao_miner: defaults::VERSAO_MINER.to_string(),
        }
    }
}

impl MinerConfig {
    /// Snapshot persisted with the run row. Secrets are elided, not masked:
    /// the snapshot records which knobs were on, never their values.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "dias_retroativos": self.dias_retroativos,
            "paginas_por_termo": self.paginas_por_termo,
            "tamanho_pagina": self.tamanho_pagina,
            "run_limit": self.run_limit,
            "search_terms": self.search_terms,
            "source_filter": self.source_filter,
            "mode": self.mode,
            "worker_pool_size": self.worker_pool_size,
            "rate_limit_secs": self.rate_limit_secs,
            "max_retries": self.max_retries,
            "max_primary_rows": self.max_primary_rows,
            "storage_bucket": self.storage_bucket,
            "enrichment_enabled": self.openai_api_key.is_some(),
            "openai_model": self.openai_model,
            "versao_miner": self.versao_miner,
        })
    }

    /// Enrichment is active only when a key is configured.
    pub fn enrichment_enabled(&self) -> bool {
        self.openai_api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_incremental() {
        let config = MinerConfig::default();
        assert_eq!(config.mode, RunMode::Incremental);
        assert_eq!(config.dias_retroativos, 1);
        assert_eq!(config.breaker_failure_threshold, 8);
    }

    #[test]
    fn snapshot_never_contains_secrets() {
        let config = MinerConfig {
            openai_api_key: Some("sk-secret".to_string()),
            supabase_service_key: "service-role-secret".to_string(),
            email_app_password: Some("app-pass".to_string()),
            ..Default::default()
        };
        let snapshot = serde_json::to_string(&config.snapshot()).unwrap();
        assert!(!snapshot.contains("sk-secret"));
        assert!(!snapshot.contains("service-role-secret"));
        assert!(!snapshot.contains("app-pass"));
        assert!(snapshot.contains("\"enrichment_enabled\":true"));
    }

    #[test]
    fn enrichment_requires_non_empty_key() {
        let mut config = MinerConfig::default();
        assert!(!config.enrichment_enabled());
        config.openai_api_key = Some(String::new());
        assert!(!config.enrichment_enabled());
        config.openai_api_key = Some("sk-x".to_string());
        assert!(config.enrichment_enabled());
    }
}
