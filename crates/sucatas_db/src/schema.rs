//! Schema bootstrap for all Ache Sucatas tables.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::SucatasDb;
use tracing::info;

impl SucatasDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_primary_tables().await?;
        self.create_run_tables().await?;
        self.create_config_tables().await?;
        info!("Database schema verified");
        Ok(())
    }

    async fn create_primary_tables(&self) -> Result<()> {
        // Primary table: every row is VALID by construction
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS editais_leilao (
                id_interno TEXT PRIMARY KEY,
                source_name TEXT NOT NULL,
                source_external_id TEXT NOT NULL,
                municipio TEXT NOT NULL,
                uf TEXT NOT NULL,
                ibge_code BIGINT,
                lat DOUBLE PRECISION,
                lon DOUBLE PRECISION,
                data_publicacao TEXT,
                data_atualizacao TEXT,
                data_leilao TEXT,
                titulo TEXT NOT NULL,
                descricao TEXT NOT NULL,
                orgao TEXT NOT NULL,
                n_edital TEXT,
                objeto_resumido TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                valor_estimado NUMERIC(14,2),
                quantidade_itens BIGINT,
                tipo_leilao TEXT,
                modalidade TEXT,
                nome_leiloeiro TEXT,
                pncp_url TEXT NOT NULL,
                leiloeiro_url TEXT,
                storage_path TEXT,
                pdf_hash TEXT,
                versao_auditor TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (source_name, source_external_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS editais_quarentena (
                run_id TEXT NOT NULL,
                id_interno TEXT NOT NULL,
                status TEXT NOT NULL,
                errors JSONB NOT NULL DEFAULT '[]',
                raw_record JSONB NOT NULL DEFAULT '{}',
                normalized_record JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (run_id, id_interno)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_editais_uf ON editais_leilao(uf)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_editais_data_leilao ON editais_leilao(data_leilao)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_quarentena_status ON editais_quarentena(status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_run_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS miner_execucoes (
                run_id TEXT PRIMARY KEY,
                execution_start TIMESTAMPTZ NOT NULL,
                execution_end TIMESTAMPTZ,
                status TEXT NOT NULL,
                mode TEXT NOT NULL,
                versao_miner TEXT NOT NULL,
                editais_encontrados BIGINT NOT NULL DEFAULT 0,
                editais_novos BIGINT NOT NULL DEFAULT 0,
                editais_skip_existe BIGINT NOT NULL DEFAULT 0,
                editais_duplicados BIGINT NOT NULL DEFAULT 0,
                downloads_ok BIGINT NOT NULL DEFAULT 0,
                downloads_fail BIGINT NOT NULL DEFAULT 0,
                quality_report JSONB,
                finops JSONB,
                config JSONB
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS pipeline_eventos (
                id BIGSERIAL PRIMARY KEY,
                run_id TEXT NOT NULL,
                etapa TEXT NOT NULL,
                evento TEXT NOT NULL,
                nivel TEXT NOT NULL,
                mensagem TEXT NOT NULL,
                dados JSONB,
                duracao_ms BIGINT,
                contador BIGINT,
                created_at TIMESTAMPTZ NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_eventos_run ON pipeline_eventos(run_id, etapa)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_config_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS taxonomia_automotiva (
                id BIGSERIAL PRIMARY KEY,
                tag TEXT NOT NULL,
                keyword TEXT NOT NULL,
                UNIQUE (tag, keyword)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS leiloeiro_whitelist (
                hostname TEXT PRIMARY KEY
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
