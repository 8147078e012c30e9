//! Candidate fetching: metadata enrichment, attachment download, blob
//! upload.

use crate::discover::Candidate;
use crate::tracker::RunTracker;
use serde_json::{json, Value};
use sucatas_http::HttpClient;
use sucatas_protocol::ids::pdf_hash_hex;
use sucatas_protocol::{
    DocumentKind, FetchedDocument, FetchedNotice, MinerConfig, PipelineEvent, PipelineStage,
    SourceName,
};
use sucatas_storage::StorageClient;
use tracing::{debug, warn};

/// Attachments fetched per candidate, at most.
const MAX_ATTACHMENTS: usize = 5;

pub struct Fetcher<'a> {
    client: &'a HttpClient,
    storage: &'a StorageClient,
    config: &'a MinerConfig,
    tracker: &'a RunTracker,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        client: &'a HttpClient,
        storage: &'a StorageClient,
        config: &'a MinerConfig,
        tracker: &'a RunTracker,
    ) -> Self {
        Self {
            client,
            storage,
            config,
            tracker,
        }
    }

    /// Pull everything the pipeline needs for one candidate. `None` means
    /// the candidate is gone (tombstoned) or yielded nothing usable.
    pub async fn fetch(&self, candidate: &Candidate) -> Option<FetchedNotice> {
        match candidate.notice.source_name {
            SourceName::Pncp => self.fetch_pncp(candidate).await,
            SourceName::Leiloeiro => self.fetch_leiloeiro(candidate).await,
        }
    }

    async fn fetch_pncp(&self, candidate: &Candidate) -> Option<FetchedNotice> {
        let mut metadata = candidate.payload.clone().unwrap_or_else(|| json!({}));

        // Details call only when the search payload is thin
        if sucatas_extract::json::needs_details(&metadata) {
            if let Some(details_url) = self.pncp_endpoint(&metadata, false) {
                self.tracker.with_stats(|s| s.details_calls += 1);
                let outcome = self
                    .client
                    .get_json(PipelineStage::Coleta, &details_url, &[])
                    .await;
                if outcome.is_tombstone() {
                    self.record_tombstone(candidate, &details_url).await;
                    return None;
                }
                if let Some(details) = outcome.json() {
                    metadata = sucatas_extract::json::merge_details(&metadata, &details);
                }
            }
        }

        let mut notice = FetchedNotice {
            raw_metadata: metadata,
            documents: Vec::new(),
        };

        if let Some(files_url) = self.pncp_endpoint(&notice.raw_metadata, true) {
            let outcome = self
                .client
                .get_json(PipelineStage::Coleta, &files_url, &[])
                .await;
            if let Some(listing) = outcome.json() {
                let urls = attachment_urls(&listing);
                for (file_name, url) in urls.into_iter().take(MAX_ATTACHMENTS) {
                    self.download_attachment(candidate, &file_name, &url, &mut notice)
                        .await;
                }
            }
        }

        self.upload_main_pdf(candidate, &mut notice).await;
        Some(notice)
    }

    /// Auctioneer lots have no files endpoint; the lot URL itself is the
    /// document bundle (a PDF, a JSON payload, sometimes an archive).
    async fn fetch_leiloeiro(&self, candidate: &Candidate) -> Option<FetchedNotice> {
        let outcome = self
            .client
            .get(PipelineStage::Coleta, &candidate.notice.raw_url, &[])
            .await;
        if outcome.is_tombstone() {
            self.record_tombstone(candidate, &candidate.notice.raw_url).await;
            return None;
        }
        if !outcome.ok {
            self.tracker.with_stats(|s| s.downloads_fail += 1);
            return None;
        }
        self.tracker.with_stats(|s| s.downloads_ok += 1);

        let kind = DocumentKind::detect(outcome.content_type.as_deref(), &outcome.body);
        let mut notice = FetchedNotice::default();
        if kind == DocumentKind::Json {
            notice.raw_metadata =
                serde_json::from_slice(&outcome.body).unwrap_or_else(|_| json!({}));
        } else {
            let hash = pdf_hash_hex(&outcome.body);
            notice.documents.push(FetchedDocument {
                kind,
                file_name: format!("lote_{}", candidate.notice.source_external_id),
                content_type: outcome.content_type.clone(),
                bytes: outcome.body,
                hash,
                storage_path: None,
            });
        }

        self.upload_main_pdf(candidate, &mut notice).await;
        Some(notice)
    }

    async fn download_attachment(
        &self,
        candidate: &Candidate,
        file_name: &str,
        url: &str,
        notice: &mut FetchedNotice,
    ) {
        let outcome = self.client.get_bytes(PipelineStage::PdfDownload, url).await;
        if outcome.is_tombstone() {
            debug!(url, "attachment gone, tombstoned");
            self.tracker.with_stats(|s| s.downloads_fail += 1);
            return;
        }
        if !outcome.ok {
            self.tracker.with_stats(|s| s.downloads_fail += 1);
            return;
        }
        self.tracker.with_stats(|s| s.downloads_ok += 1);

        let kind = DocumentKind::detect(outcome.content_type.as_deref(), &outcome.body);
        let hash = pdf_hash_hex(&outcome.body);
        debug!(
            id = %candidate.notice.source_external_id,
            file_name,
            kind = %kind,
            bytes = outcome.body.len(),
            "attachment downloaded"
        );
        notice.documents.push(FetchedDocument {
            kind,
            file_name: file_name.to_string(),
            content_type: outcome.content_type.clone(),
            bytes: outcome.body,
            hash,
            storage_path: None,
        });
    }

    /// Push the main PDF and the metadata companion to blob storage,
    /// recording the storage path on the document.
    async fn upload_main_pdf(&self, candidate: &Candidate, notice: &mut FetchedNotice) {
        if !self.storage.is_configured() {
            return;
        }
        let external_id = candidate.notice.source_external_id.clone();

        if let Some(doc) = notice
            .documents
            .iter_mut()
            .find(|d| d.kind == DocumentKind::Pdf)
        {
            match self
                .storage
                .upload_pdf(&external_id, &doc.hash, &doc.file_name, doc.bytes.clone())
                .await
            {
                Ok(path) => doc.storage_path = Some(path),
                Err(err) => {
                    warn!(%err, id = %external_id, "main PDF upload failed");
                    self.tracker
                        .record_event(PipelineEvent::warning(
                            self.tracker.run_id(),
                            PipelineStage::PdfDownload,
                            "storage_upload_err",
                            err.to_string(),
                        ))
                        .await;
                }
            }
        }

        if !notice.raw_metadata.is_null() && notice.raw_metadata.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            if let Err(err) = self
                .storage
                .upload_metadata(&external_id, &notice.raw_metadata)
                .await
            {
                warn!(%err, id = %external_id, "metadata upload failed");
            }
        }
    }

    async fn record_tombstone(&self, candidate: &Candidate, url: &str) {
        self.tracker
            .record_event(
                PipelineEvent::warning(
                    self.tracker.run_id(),
                    PipelineStage::Coleta,
                    "tombstone",
                    format!(
                        "candidate {} is gone upstream",
                        candidate.notice.source_external_id
                    ),
                )
                .with_dados(json!({ "url": url })),
            )
            .await;
    }

    /// Details or files endpoint for a PNCP purchase, from its keys.
    fn pncp_endpoint(&self, metadata: &Value, files: bool) -> Option<String> {
        let fields = sucatas_extract::json::extract_json(metadata);
        let (cnpj, ano, seq) = (fields.cnpj?, fields.ano?, fields.sequencial?);
        let template = if files {
            &self.config.files_endpoint_template
        } else {
            &self.config.details_endpoint_template
        };
        Some(
            template
                .replace("{cnpj}", &cnpj)
                .replace("{ano}", &ano.to_string())
                .replace("{seq}", &seq.to_string()),
        )
    }
}

/// `(name, url)` pairs from the attachment listing, which is either a bare
/// array or `{"data": [...]}`.
fn attachment_urls(listing: &Value) -> Vec<(String, String)> {
    let items = match listing {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| {
            let url = item
                .get("url")
                .or_else(|| item.get("uri"))
                .and_then(|v| v.as_str())?
                .trim()
                .to_string();
            if url.is_empty() {
                return None;
            }
            let name = item
                .get("titulo")
                .or_else(|| item.get("nome"))
                .and_then(|v| v.as_str())
                .unwrap_or("anexo")
                .to_string();
            Some((name, url))
        })
        .collect()
}
