//! Top-level pipeline driver: discovery, bounded worker pool, routing,
//! finalization.

use crate::discover::{self, pncp, sitemap, Candidate};
use crate::fetch::Fetcher;
use crate::tracker::{RunSummary, RunTracker};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sucatas_db::SucatasDb;
use sucatas_enrich::{Enricher, NoopEnricher, OpenAiEnricher};
use sucatas_extract::{Cascade, ExtractionBundle, TagTaxonomy};
use sucatas_http::HttpClient;
use sucatas_protocol::ids::{new_run_id, stable_id_interno};
use sucatas_protocol::{
    AuctionRecord, DocumentKind, ErrorCode, MinerConfig, PipelineEvent, PipelineStage,
    RecordStatus, RunMode, RunStatus, SourceName, ValidationError,
};
use sucatas_storage::StorageClient;
use sucatas_validate::validate_record;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Result of one pipeline run. A fatal reason forces exit code 1 and an
/// alert e-mail even though the summary was persisted.
pub struct PipelineOutcome {
    pub summary: RunSummary,
    pub fatal_reason: Option<String>,
}

struct WorkerContext {
    config: MinerConfig,
    client: Arc<HttpClient>,
    storage: Arc<StorageClient>,
    db: SucatasDb,
    tracker: Arc<RunTracker>,
    cascade: Arc<Cascade>,
    enricher: Arc<dyn Enricher>,
    /// id_internos already handled in this run (duplicate collapsing).
    seen: Mutex<HashSet<String>>,
    shutdown: Arc<AtomicBool>,
    fatal: AtomicBool,
    fatal_reason: Mutex<Option<String>>,
}

impl WorkerContext {
    fn should_stop(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) || self.fatal.load(Ordering::SeqCst)
    }

    fn trip_fatal(&self, reason: String) {
        let mut slot = self.fatal_reason.lock().expect("fatal reason lock");
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.fatal.store(true, Ordering::SeqCst);
    }
}

/// Run the whole pipeline once.
pub async fn run_pipeline(
    config: MinerConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<PipelineOutcome> {
    let run_id = new_run_id();
    info!(%run_id, mode = %config.mode, "pipeline starting");

    let db = SucatasDb::connect(&config.database_url, config.max_primary_rows)
        .await
        .context("datastore unreachable")?;
    let tracker = Arc::new(
        RunTracker::start(db.clone(), &run_id, &config)
            .await
            .context("run tracking row could not be created")?,
    );

    // HTTP-layer warnings flow into the same event stream as everything else
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let client = Arc::new(HttpClient::new(&config, &run_id, Some(events_tx))?);
    let pump_tracker = tracker.clone();
    let event_pump = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            pump_tracker.record_event(event).await;
        }
    });

    let storage = Arc::new(StorageClient::new(
        &config.supabase_url,
        &config.supabase_service_key,
        &config.storage_bucket,
    )?);

    let enricher: Arc<dyn Enricher> = if config.enrichment_enabled() {
        let key = config.openai_api_key.clone().unwrap_or_default();
        Arc::new(OpenAiEnricher::new(key, config.openai_model.clone())?)
    } else {
        Arc::new(NoopEnricher)
    };
    info!(enricher = enricher.name(), "enrichment backend selected");

    let taxonomy_rows = db.load_taxonomy().await.unwrap_or_else(|err| {
        warn!(%err, "taxonomy load failed, using built-in table");
        Vec::new()
    });
    let whitelist = db.load_whitelist().await.unwrap_or_else(|err| {
        warn!(%err, "whitelist load failed, starting empty");
        HashSet::new()
    });
    let cascade = Arc::new(Cascade::new(TagTaxonomy::from_rows(&taxonomy_rows), whitelist));

    tracker
        .record_event(
            PipelineEvent::info(run_id.as_str(), PipelineStage::Inicio, "run_start", "pipeline started")
                .with_dados(config.snapshot()),
        )
        .await;

    let ctx = Arc::new(WorkerContext {
        config: config.clone(),
        client,
        storage,
        db,
        tracker: tracker.clone(),
        cascade,
        enricher: enricher.clone(),
        seen: Mutex::new(HashSet::new()),
        shutdown: shutdown.clone(),
        fatal: AtomicBool::new(false),
        fatal_reason: Mutex::new(None),
    });

    let mut remaining_limit = config.run_limit;
    for source in active_sources(&config) {
        if ctx.should_stop() {
            break;
        }
        if matches!(remaining_limit, Some(0)) {
            break;
        }
        process_source(&ctx, source, &mut remaining_limit).await;
    }

    let final_stats = tracker.stats();
    tracker
        .record_event(
            PipelineEvent::info(
                run_id.as_str(),
                PipelineStage::Fim,
                "run_end",
                "candidate processing finished",
            )
            .with_dados(json!({
                "details_calls": final_stats.details_calls,
                "pdfs_extraidos": final_stats.pdfs_extraidos,
            })),
        )
        .await;

    let fatal_reason = ctx.fatal_reason.lock().expect("fatal reason lock").clone();
    let interrupted = shutdown.load(Ordering::SeqCst);
    let status = if fatal_reason.is_some() || interrupted {
        RunStatus::Failed
    } else {
        RunStatus::Success
    };

    let cost_openai = enricher.stats().estimated_cost_usd;

    // Drop every HttpClient holder so the event pump sees channel close
    drop(ctx);
    let _ = event_pump.await;

    let summary = tracker
        .finalize(status, cost_openai)
        .await
        .context("run finalization failed")?;

    let fatal_reason = if interrupted && fatal_reason.is_none() {
        Some("interrupted".to_string())
    } else {
        fatal_reason
    };

    Ok(PipelineOutcome {
        summary,
        fatal_reason,
    })
}

fn active_sources(config: &MinerConfig) -> Vec<SourceName> {
    let mut sources = Vec::new();
    for source in [SourceName::Pncp, SourceName::Leiloeiro] {
        if let Some(filter) = config.source_filter {
            if filter != source {
                continue;
            }
        }
        if source == SourceName::Leiloeiro && config.sitemap_url.is_none() {
            continue;
        }
        sources.push(source);
    }
    sources
}

async fn process_source(
    ctx: &Arc<WorkerContext>,
    source: SourceName,
    remaining_limit: &mut Option<usize>,
) {
    let run_id = ctx.tracker.run_id().to_string();

    let mut candidates = match source {
        SourceName::Pncp => pncp::discover(&ctx.client, &ctx.config).await,
        SourceName::Leiloeiro => {
            let sitemap_url = ctx.config.sitemap_url.clone().unwrap_or_default();
            let (candidates, report) = sitemap::discover(&ctx.client, &sitemap_url).await;
            ctx.tracker
                .record_event(
                    PipelineEvent::info(
                        run_id.as_str(),
                        PipelineStage::Busca,
                        "discovery_report",
                        format!("sitemap discovery for {}", sitemap_url),
                    )
                    .with_dados(serde_json::to_value(&report).unwrap_or_default()),
                )
                .await;
            candidates
        }
    };

    discover::sort_most_recent_first(&mut candidates);
    if let Some(limit) = remaining_limit {
        if candidates.len() > *limit {
            candidates.truncate(*limit);
        }
        *limit -= candidates.len();
    }

    ctx.tracker
        .with_stats(|s| s.editais_encontrados += candidates.len() as i64);
    ctx.tracker
        .record_event(
            PipelineEvent::info(
                run_id.as_str(),
                PipelineStage::Busca,
                "discovery_done",
                format!("{} candidates from {}", candidates.len(), source),
            )
            .with_contador(candidates.len() as i64),
        )
        .await;

    // Bounded worker pool over a channel; the buffer is the backpressure
    let pool_size = ctx.config.worker_pool_size.max(1);
    let (tx, rx) = mpsc::channel::<Candidate>(pool_size * 2);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let ctx = ctx.clone();
        let rx = rx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let candidate = { rx.lock().await.recv().await };
                match candidate {
                    Some(candidate) => process_candidate(&ctx, candidate).await,
                    None => break,
                }
            }
        }));
    }

    for candidate in candidates {
        if ctx.should_stop() {
            break;
        }
        if tx.send(candidate).await.is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        if let Err(err) = worker.await {
            error!(%err, "worker task panicked");
        }
    }
}

async fn process_candidate(ctx: &Arc<WorkerContext>, candidate: Candidate) {
    if ctx.should_stop() {
        return;
    }
    let run_id = ctx.tracker.run_id().to_string();
    let source = candidate.notice.source_name;
    let external_id = candidate.notice.source_external_id.clone();
    let id_interno = stable_id_interno(source, &external_id);

    // Duplicate listing within the run: process once, count the rest
    {
        let mut seen = ctx.seen.lock().expect("seen lock");
        if !seen.insert(id_interno.clone()) {
            ctx.tracker.with_stats(|s| s.editais_duplicados += 1);
            return;
        }
    }

    // Incremental mode skips ids the primary table already has
    if ctx.config.mode == RunMode::Incremental {
        match ctx.db.edital_exists(&id_interno).await {
            Ok(true) => {
                ctx.tracker.with_stats(|s| s.editais_skip_existe += 1);
                return;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(%err, %id_interno, "existence check failed, processing anyway");
            }
        }
    }

    let fetcher = Fetcher::new(&ctx.client, &ctx.storage, &ctx.config, &ctx.tracker);
    let Some(notice) = fetcher.fetch(&candidate).await else {
        return;
    };

    // Extraction: every document feeds the bundle; PDF parsing is bounded
    let mut bundle = ExtractionBundle::from_metadata(
        &notice.raw_metadata,
        Some(candidate.notice.raw_url.clone()),
    );
    let mut storage_path = None;
    let mut pdf_hash = None;
    for doc in &notice.documents {
        if doc.kind == DocumentKind::Pdf {
            if storage_path.is_none() {
                storage_path = doc.storage_path.clone();
                pdf_hash = Some(doc.hash.clone());
            }
            ingest_pdf_bounded(ctx, &run_id, &mut bundle, &doc.file_name, doc.bytes.clone()).await;
        } else {
            bundle.ingest_document(doc.kind, &doc.file_name, &doc.bytes);
        }
    }

    let mut record = AuctionRecord::seed(source, &external_id, &ctx.config.versao_miner);
    ctx.cascade.resolve(&mut record, &bundle);
    record.storage_path = storage_path;
    record.pdf_hash = pdf_hash;

    // Optional enrichment; never fails the candidate
    let pdf_head: String = bundle
        .pdf
        .as_ref()
        .map(|p| p.text.chars().take(2_000).collect())
        .unwrap_or_default();
    let enriched = ctx.enricher.enrich(record, &pdf_head).await;
    if let Some(warning) = enriched.warning {
        ctx.tracker
            .record_event(PipelineEvent::warning(
                run_id.as_str(),
                PipelineStage::Enrich,
                "enrich_err",
                warning,
            ))
            .await;
    }
    let record = enriched.record;

    let result = validate_record(&record);
    ctx.tracker.register_validation(result.status, &result.errors);
    ctx.tracker
        .record_event(
            PipelineEvent::info(
                run_id.as_str(),
                PipelineStage::Validate,
                "validated",
                format!("{} -> {}", id_interno, result.status),
            )
            .with_dados(json!({ "errors": result.errors.len() })),
        )
        .await;

    route(ctx, &run_id, &record, &result).await;
}

async fn ingest_pdf_bounded(
    ctx: &Arc<WorkerContext>,
    run_id: &str,
    bundle: &mut ExtractionBundle,
    file_name: &str,
    bytes: Vec<u8>,
) {
    if bundle.pdf.is_some() {
        return;
    }
    let limit = Duration::from_secs(ctx.config.pdf_parse_limit_secs);
    let parse = tokio::time::timeout(
        limit,
        tokio::task::spawn_blocking(move || sucatas_extract::pdf::extract_pdf(&bytes)),
    )
    .await;

    match parse {
        Ok(Ok(Ok(parsed))) => {
            ctx.tracker.with_stats(|s| s.pdfs_extraidos += 1);
            bundle.pdf = Some(parsed);
        }
        Ok(Ok(Err(err))) => {
            bundle.errors.push(err.to_validation_error(file_name));
        }
        Ok(Err(join_err)) => {
            bundle.errors.push(ValidationError::new(
                ErrorCode::ExtractionError,
                file_name,
                format!("PDF parse task failed: {join_err}"),
            ));
        }
        Err(_elapsed) => {
            bundle.errors.push(ValidationError::new(
                ErrorCode::ExtractionError,
                file_name,
                format!("PDF parse exceeded {}s", ctx.config.pdf_parse_limit_secs),
            ));
            ctx.tracker
                .record_event(PipelineEvent::warning(
                    run_id,
                    PipelineStage::PdfParse,
                    "pdf_parse_timeout",
                    format!("{} abandoned after {}s", file_name, ctx.config.pdf_parse_limit_secs),
                ))
                .await;
        }
    }
}

async fn route(
    ctx: &Arc<WorkerContext>,
    run_id: &str,
    raw_record: &AuctionRecord,
    result: &sucatas_validate::ValidationResult,
) {
    if result.status == RecordStatus::Valid {
        match ctx.db.upsert_edital(&result.normalized_record).await {
            Ok(()) => {
                ctx.tracker.with_stats(|s| s.editais_novos += 1);
                ctx.tracker
                    .record_event(PipelineEvent::info(
                        run_id,
                        PipelineStage::Upsert,
                        "upsert.ok",
                        result.normalized_record.id_interno.clone(),
                    ))
                    .await;
            }
            Err(err) if err.is_capacity() => {
                error!(%err, "safety brake tripped, failing the run");
                ctx.tracker
                    .record_event(PipelineEvent::error(
                        run_id,
                        PipelineStage::Upsert,
                        "capacity_exceeded",
                        err.to_string(),
                    ))
                    .await;
                ctx.trip_fatal(err.to_string());
            }
            Err(err) => {
                ctx.tracker
                    .record_event(PipelineEvent::warning(
                        run_id,
                        PipelineStage::Upsert,
                        "upsert.err",
                        err.to_string(),
                    ))
                    .await;
            }
        }
        return;
    }

    let rejection = result.to_rejection(run_id, raw_record);
    match ctx.db.upsert_quarentena(&rejection).await {
        Ok(()) => {
            ctx.tracker
                .record_event(
                    PipelineEvent::info(
                        run_id,
                        PipelineStage::Quarantine,
                        "quarantine.ok",
                        format!("{} ({})", rejection.id_interno, rejection.status),
                    )
                    .with_dados(json!({ "errors": rejection.errors.len() })),
                )
                .await;
        }
        Err(err) if err.is_capacity() => {
            ctx.tracker
                .record_event(PipelineEvent::error(
                    run_id,
                    PipelineStage::Quarantine,
                    "capacity_exceeded",
                    err.to_string(),
                ))
                .await;
            ctx.trip_fatal(err.to_string());
        }
        Err(err) => {
            ctx.tracker
                .record_event(PipelineEvent::warning(
                    run_id,
                    PipelineStage::Quarantine,
                    "quarantine.err",
                    err.to_string(),
                ))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_filter_restricts_the_source_list() {
        let mut config = MinerConfig {
            sitemap_url: Some("https://www.leiloes.com.br/sitemap.xml".to_string()),
            ..Default::default()
        };
        assert_eq!(
            active_sources(&config),
            vec![SourceName::Pncp, SourceName::Leiloeiro]
        );

        config.source_filter = Some(SourceName::Pncp);
        assert_eq!(active_sources(&config), vec![SourceName::Pncp]);

        config.source_filter = None;
        config.sitemap_url = None;
        assert_eq!(active_sources(&config), vec![SourceName::Pncp]);
    }
}
