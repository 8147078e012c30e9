//! Run-execution history and pipeline-event persistence.

use crate::error::Result;
use crate::SucatasDb;
use chrono::Utc;
use sucatas_protocol::{MinerConfig, PipelineEvent, RunExecution, RunStatus};
use tracing::debug;

impl SucatasDb {
    /// Insert the RUNNING row for a fresh execution.
    pub async fn iniciar_execucao(
        &self,
        run_id: &str,
        config: &MinerConfig,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO miner_execucoes (
                run_id, execution_start, status, mode, versao_miner, config
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run_id)
        .bind(Utc::now())
        .bind(RunStatus::Running.as_str())
        .bind(config.mode.as_str())
        .bind(&config.versao_miner)
        .bind(config.snapshot())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stamp the terminal state, counters, quality report and FinOps.
    pub async fn finalizar_execucao(&self, execution: &RunExecution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE miner_execucoes SET
                execution_end = $2,
                status = $3,
                editais_encontrados = $4,
                editais_novos = $5,
                editais_skip_existe = $6,
                editais_duplicados = $7,
                downloads_ok = $8,
                downloads_fail = $9,
                quality_report = $10,
                finops = $11
            WHERE run_id = $1
            "#,
        )
        .bind(&execution.run_id)
        .bind(execution.execution_end.unwrap_or_else(Utc::now))
        .bind(execution.status.as_str())
        .bind(execution.editais_encontrados)
        .bind(execution.editais_novos)
        .bind(execution.editais_skip_existe)
        .bind(execution.editais_duplicados)
        .bind(execution.downloads_ok)
        .bind(execution.downloads_fail)
        .bind(&execution.quality_report)
        .bind(&execution.finops)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Batch-insert buffered pipeline events inside one transaction.
    pub async fn insert_eventos(&self, events: &[PipelineEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO pipeline_eventos (
                    run_id, etapa, evento, nivel, mensagem, dados,
                    duracao_ms, contador, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&event.run_id)
            .bind(event.etapa.as_str())
            .bind(&event.evento)
            .bind(event.nivel.as_str())
            .bind(&event.mensagem)
            .bind(&event.dados)
            .bind(event.duracao_ms)
            .bind(event.contador)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = events.len(), "pipeline events flushed");
        Ok(())
    }
}
