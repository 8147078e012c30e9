//! OpenAI chat-completions enricher with token and cost tracking.

use crate::{EnrichOutcome, EnrichStats, Enricher};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use sucatas_extract::urls;
use sucatas_protocol::AuctionRecord;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// USD per million tokens (gpt-4o-mini pricing).
pub const PRICE_INPUT_PER_1M: f64 = 0.15;
pub const PRICE_OUTPUT_PER_1M: f64 = 0.60;

/// How much of the PDF text rides along in the prompt.
const PDF_HEAD_CHARS: usize = 2_000;
const DESCRICAO_PROMPT_CHARS: usize = 2_000;

/// Structured reply expected from the model.
#[derive(Debug, Deserialize, Default)]
struct EnrichReply {
    #[serde(default)]
    commercial_title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    vehicle_list: Option<Vec<String>>,
    #[serde(default)]
    auctioneer_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// LLM-backed enricher. Counters are atomics: workers share one instance.
pub struct OpenAiEnricher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    total_requests: AtomicU64,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl OpenAiEnricher {
    pub fn new(api_key: String, model: String) -> Result<Self, reqwest::Error> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            total_requests: AtomicU64::new(0),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
        })
    }

    fn build_prompt(record: &AuctionRecord, pdf_head: &str) -> String {
        let titulo = record.titulo.as_deref().unwrap_or("");
        let descricao: String = record
            .descricao
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(DESCRICAO_PROMPT_CHARS)
            .collect();
        let head: String = pdf_head.chars().take(PDF_HEAD_CHARS).collect();
        format!(
            "Você analisa editais de leilão de veículos brasileiros. \
             Responda SOMENTE com JSON contendo as chaves commercial_title, \
             summary, vehicle_list e auctioneer_url.\n\n\
             TITULO: {titulo}\n\nDESCRICAO: {descricao}\n\nDOCUMENTO: {head}"
        )
    }

    async fn call_model(&self, prompt: &str) -> Result<EnrichReply, String> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| format!("undecodable response: {err}"))?;

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = &parsed.usage {
            self.total_input_tokens
                .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        }

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| "empty choices".to_string())?;
        serde_json::from_str::<EnrichReply>(content)
            .map_err(|err| format!("reply is not the expected JSON: {err}"))
    }
}

/// Merge reply fields into the record, only where the cascade left gaps.
fn merge_reply(mut record: AuctionRecord, reply: EnrichReply) -> AuctionRecord {
    if record.titulo.as_deref().map(str::is_empty).unwrap_or(true) {
        record.titulo = reply.commercial_title.filter(|t| !t.trim().is_empty());
    }
    if record.descricao.as_deref().map(str::is_empty).unwrap_or(true) {
        record.descricao = reply.summary.filter(|s| !s.trim().is_empty());
    }
    if record
        .objeto_resumido
        .as_deref()
        .map(str::is_empty)
        .unwrap_or(true)
    {
        if let Some(vehicles) = reply.vehicle_list.filter(|v| !v.is_empty()) {
            record.objeto_resumido = Some(vehicles.join(", "));
        }
    }
    if record.leiloeiro_url.is_none() {
        record.leiloeiro_url = reply
            .auctioneer_url
            .as_deref()
            .and_then(urls::normalize_url);
    }
    record
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, record: AuctionRecord, pdf_head: &str) -> EnrichOutcome {
        let prompt = Self::build_prompt(&record, pdf_head);
        match self.call_model(&prompt).await {
            Ok(reply) => {
                debug!(id = %record.id_interno, "enrichment reply merged");
                EnrichOutcome {
                    record: merge_reply(record, reply),
                    warning: None,
                }
            }
            Err(reason) => {
                warn!(id = %record.id_interno, %reason, "enrichment failed, record unchanged");
                EnrichOutcome {
                    record,
                    warning: Some(reason),
                }
            }
        }
    }

    fn stats(&self) -> EnrichStats {
        let input = self.total_input_tokens.load(Ordering::Relaxed);
        let output = self.total_output_tokens.load(Ordering::Relaxed);
        EnrichStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_input_tokens: input,
            total_output_tokens: output,
            estimated_cost_usd: (input as f64 / 1e6) * PRICE_INPUT_PER_1M
                + (output as f64 / 1e6) * PRICE_OUTPUT_PER_1M,
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sucatas_protocol::SourceName;
    use wiremock::matchers::{header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_with_gaps() -> AuctionRecord {
        let mut record = AuctionRecord::seed(SourceName::Pncp, "ext", "v");
        record.titulo = Some("Título do cascade".to_string());
        record
    }

    #[test]
    fn merge_never_overwrites_cascade_values() {
        let reply = EnrichReply {
            commercial_title: Some("Título do modelo".to_string()),
            summary: Some("Resumo do modelo".to_string()),
            vehicle_list: Some(vec!["FIAT Uno".to_string(), "VW Gol".to_string()]),
            auctioneer_url: Some("www.leiloes.com.br".to_string()),
        };
        let merged = merge_reply(record_with_gaps(), reply);
        assert_eq!(merged.titulo.as_deref(), Some("Título do cascade"));
        assert_eq!(merged.descricao.as_deref(), Some("Resumo do modelo"));
        assert_eq!(merged.objeto_resumido.as_deref(), Some("FIAT Uno, VW Gol"));
        assert_eq!(
            merged.leiloeiro_url.as_deref(),
            Some("https://www.leiloes.com.br")
        );
    }

    #[test]
    fn cost_model_matches_published_prices() {
        let enricher =
            OpenAiEnricher::new("sk-test".to_string(), "gpt-4o-mini".to_string()).unwrap();
        enricher.total_input_tokens.store(1_000_000, Ordering::Relaxed);
        enricher.total_output_tokens.store(100_000, Ordering::Relaxed);
        let stats = enricher.stats();
        assert!((stats.estimated_cost_usd - 0.21).abs() < 1e-9);
    }

    #[tokio::test]
    async fn successful_call_counts_tokens() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "{\"summary\": \"Leilão de 12 veículos\"}"
                }
            }],
            "usage": { "prompt_tokens": 800, "completion_tokens": 60 }
        });
        Mock::given(method("POST"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let enricher = OpenAiEnricher::with_base_url(
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            server.uri(),
        )
        .unwrap();
        let outcome = enricher.enrich(record_with_gaps(), "cabeçalho do pdf").await;
        assert!(outcome.warning.is_none());
        assert_eq!(
            outcome.record.descricao.as_deref(),
            Some("Leilão de 12 veículos")
        );
        let stats = enricher.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_input_tokens, 800);
        assert_eq!(stats.total_output_tokens, 60);
    }

    #[tokio::test]
    async fn failure_returns_record_unchanged_with_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let enricher = OpenAiEnricher::with_base_url(
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            server.uri(),
        )
        .unwrap();
        let record = record_with_gaps();
        let outcome = enricher.enrich(record.clone(), "").await;
        assert_eq!(outcome.record, record);
        assert!(outcome.warning.is_some());
    }
}
