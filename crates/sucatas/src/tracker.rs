//! Run tracking: execution row, quality report, buffered pipeline events.

use chrono::Utc;
use std::sync::Mutex;
use sucatas_db::SucatasDb;
use sucatas_protocol::defaults::DEFAULT_EVENT_BUFFER_SIZE;
use sucatas_protocol::{
    FinOpsReport, MinerConfig, PipelineEvent, QualityReport, RecordStatus, RunExecution, RunMode,
    RunStatus, ValidationError,
};
use tracing::warn;

/// Cascade-level counters for one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub editais_encontrados: i64,
    pub editais_novos: i64,
    pub editais_skip_existe: i64,
    pub editais_duplicados: i64,
    pub downloads_ok: i64,
    pub downloads_fail: i64,
    pub pdfs_extraidos: i64,
    pub details_calls: i64,
}

/// What the final summary line prints.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub total_processados: u64,
    pub total_validos: u64,
    pub total_quarentena: u64,
    pub duration_seconds: f64,
    pub cost_total: f64,
}

impl RunSummary {
    pub fn line(&self) -> String {
        format!(
            "RUN {} {} total={} valid={} quarantine={} dur={:.1}s cost=${:.4}",
            self.run_id,
            self.status,
            self.total_processados,
            self.total_validos,
            self.total_quarentena,
            self.duration_seconds,
            self.cost_total,
        )
    }
}

/// Tracks one execution. The report, counters and event buffer are each
/// behind a plain mutex: workers only take them for increments, flushes
/// happen outside the locks.
pub struct RunTracker {
    db: SucatasDb,
    run_id: String,
    mode: RunMode,
    versao_miner: String,
    report: Mutex<QualityReport>,
    stats: Mutex<RunStats>,
    buffer: Mutex<Vec<PipelineEvent>>,
    buffer_size: usize,
}

impl RunTracker {
    /// Insert the RUNNING row and start tracking.
    pub async fn start(
        db: SucatasDb,
        run_id: &str,
        config: &MinerConfig,
    ) -> sucatas_db::Result<Self> {
        db.iniciar_execucao(run_id, config).await?;
        Ok(Self {
            db,
            run_id: run_id.to_string(),
            mode: config.mode,
            versao_miner: config.versao_miner.clone(),
            report: Mutex::new(QualityReport::new(run_id)),
            stats: Mutex::new(RunStats::default()),
            buffer: Mutex::new(Vec::new()),
            buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Buffer an event; flushes as a batch when the buffer fills.
    pub async fn record_event(&self, event: PipelineEvent) {
        let batch = {
            let mut buffer = self.buffer.lock().expect("event buffer lock");
            buffer.push(event);
            if buffer.len() >= self.buffer_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            if let Err(err) = self.db.insert_eventos(&batch).await {
                warn!(%err, "event batch insert failed, {} events dropped", batch.len());
            }
        }
    }

    pub fn register_validation(&self, status: RecordStatus, errors: &[ValidationError]) {
        self.report
            .lock()
            .expect("report lock")
            .register(status, errors);
    }

    pub fn with_stats<R>(&self, f: impl FnOnce(&mut RunStats) -> R) -> R {
        f(&mut self.stats.lock().expect("stats lock"))
    }

    pub fn stats(&self) -> RunStats {
        *self.stats.lock().expect("stats lock")
    }

    /// Flush events, freeze the report and stamp the terminal run row.
    pub async fn finalize(
        &self,
        status: RunStatus,
        cost_openai: f64,
    ) -> sucatas_db::Result<RunSummary> {
        let remaining = {
            let mut buffer = self.buffer.lock().expect("event buffer lock");
            std::mem::take(&mut *buffer)
        };
        if let Err(err) = self.db.insert_eventos(&remaining).await {
            warn!(%err, "final event flush failed");
        }

        let (report_json, summary_base) = {
            let mut report = self.report.lock().expect("report lock");
            report.finalize();
            (
                report.to_json(),
                (
                    report.total_processados,
                    report.total_validos,
                    report.total_quarentena(),
                    report.duration_seconds,
                ),
            )
        };
        let stats = self.stats();
        let finops = FinOpsReport::compute(
            stats.pdfs_extraidos.max(0) as u64,
            stats.editais_novos.max(0) as u64,
            cost_openai,
        );

        let execution = RunExecution {
            run_id: self.run_id.clone(),
            execution_start: Utc::now(), // preserved by the UPDATE, informational here
            execution_end: Some(Utc::now()),
            status,
            mode: self.mode,
            versao_miner: self.versao_miner.clone(),
            editais_encontrados: stats.editais_encontrados,
            editais_novos: stats.editais_novos,
            editais_skip_existe: stats.editais_skip_existe,
            editais_duplicados: stats.editais_duplicados,
            downloads_ok: stats.downloads_ok,
            downloads_fail: stats.downloads_fail,
            quality_report: Some(report_json),
            finops: Some(finops.to_json()),
            config_snapshot: None,
        };
        self.db.finalizar_execucao(&execution).await?;

        let (total, valid, quarantine, duration) = summary_base;
        Ok(RunSummary {
            run_id: self.run_id.clone(),
            status,
            total_processados: total,
            total_validos: valid,
            total_quarentena: quarantine,
            duration_seconds: duration,
            cost_total: finops.cost_total,
        })
    }
}
