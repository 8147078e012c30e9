//! The process-wide HTTP client.

use crate::breaker::{BreakerDecision, BreakerRegistry};
use crate::limit::HostRateLimiter;
use crate::outcome::{ErrorClass, FetchOutcome};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use sucatas_protocol::{EventLevel, MinerConfig, PipelineEvent, PipelineStage};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use url::Url;

/// Construction-time failures only; request-time failures are data, not
/// errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Shared HTTP client. Construct once in the orchestrator and pass by
/// reference; the connection pool, rate limiter, breakers and tombstones
/// are all per-process state.
pub struct HttpClient {
    client: reqwest::Client,
    limiter: HostRateLimiter,
    breakers: BreakerRegistry,
    tombstones: Mutex<HashSet<String>>,
    max_retries: u32,
    backoff_base_secs: f64,
    backoff_cap_secs: f64,
    run_id: String,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl HttpClient {
    pub fn new(
        config: &MinerConfig,
        run_id: &str,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            limiter: HostRateLimiter::new(Duration::from_secs_f64(config.rate_limit_secs)),
            breakers: BreakerRegistry::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_reset_secs),
            ),
            tombstones: Mutex::new(HashSet::new()),
            max_retries: config.max_retries,
            backoff_base_secs: config.backoff_base_secs,
            backoff_cap_secs: config.backoff_cap_secs,
            run_id: run_id.to_string(),
            events,
        })
    }

    /// True when the URL already answered 404/410 during this run.
    pub fn is_tombstoned(&self, url: &str) -> bool {
        self.tombstones.lock().expect("tombstone lock").contains(url)
    }

    /// GET returning raw bytes.
    pub async fn get_bytes(&self, stage: PipelineStage, url: &str) -> FetchOutcome {
        self.get(stage, url, &[]).await
    }

    /// GET whose body must parse as JSON; a 2xx with an undecodable body is
    /// reported as a `Decode` failure.
    pub async fn get_json(
        &self,
        stage: PipelineStage,
        url: &str,
        query: &[(&str, String)],
    ) -> FetchOutcome {
        let outcome = self.get(stage, url, query).await;
        if outcome.ok && serde_json::from_slice::<serde_json::Value>(&outcome.body).is_err() {
            warn!(url, "response body is not valid JSON");
            return FetchOutcome::failure(outcome.status, ErrorClass::Decode);
        }
        outcome
    }

    /// Rate-limited GET with retry, backoff and breaker accounting.
    pub async fn get(
        &self,
        stage: PipelineStage,
        url: &str,
        query: &[(&str, String)],
    ) -> FetchOutcome {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(String::from)) {
            Some(host) => host,
            None => {
                warn!(url, "unparseable URL");
                return FetchOutcome::failure(None, ErrorClass::Connect);
            }
        };

        if self.is_tombstoned(url) {
            debug!(url, "skipping tombstoned URL");
            return FetchOutcome::failure(None, ErrorClass::Tombstone);
        }

        match self.breakers.check(&host) {
            BreakerDecision::Block => {
                debug!(%host, url, "circuit open, request blocked");
                return FetchOutcome::failure(None, ErrorClass::CircuitOpen);
            }
            BreakerDecision::Probe => {
                debug!(%host, "circuit half-open, sending probe");
            }
            BreakerDecision::Allow => {}
        }

        let mut last_failure = FetchOutcome::failure(None, ErrorClass::Connect);
        for attempt in 0..=self.max_retries {
            self.limiter.acquire(&host).await;

            let request = self.client.get(url).query(query);
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let content_type = response
                            .headers()
                            .get(reqwest::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        match response.bytes().await {
                            Ok(body) => {
                                self.breakers.on_success(&host);
                                return FetchOutcome::success(
                                    status.as_u16(),
                                    content_type,
                                    body.to_vec(),
                                );
                            }
                            Err(err) => {
                                // Body read aborted mid-stream; treat like a
                                // network failure.
                                last_failure = self.network_failure(&host, url, &err);
                            }
                        }
                    } else if status.as_u16() == 404 || status.as_u16() == 410 {
                        self.tombstones
                            .lock()
                            .expect("tombstone lock")
                            .insert(url.to_string());
                        debug!(url, status = status.as_u16(), "tombstoned");
                        return FetchOutcome::failure(Some(status.as_u16()), ErrorClass::HttpStatus);
                    } else if is_retriable_status(status.as_u16()) {
                        self.record_failure(&host);
                        last_failure =
                            FetchOutcome::failure(Some(status.as_u16()), ErrorClass::HttpStatus);
                    } else {
                        // Other 4xx/5xx are final on first sight.
                        if status.is_server_error() {
                            self.record_failure(&host);
                        }
                        self.emit_warning(stage, url, ErrorClass::HttpStatus, Some(status.as_u16()));
                        return FetchOutcome::failure(Some(status.as_u16()), ErrorClass::HttpStatus);
                    }
                }
                Err(err) => {
                    last_failure = self.network_failure(&host, url, &err);
                }
            }

            if attempt < self.max_retries {
                let delay =
                    crate::backoff_delay(attempt, self.backoff_base_secs, self.backoff_cap_secs);
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
            }
        }

        self.emit_warning(stage, url, last_failure.error_class.unwrap_or(ErrorClass::Connect), last_failure.status);
        last_failure
    }

    fn network_failure(&self, host: &str, url: &str, err: &reqwest::Error) -> FetchOutcome {
        self.record_failure(host);
        let class = if err.is_timeout() {
            ErrorClass::Timeout
        } else {
            ErrorClass::Connect
        };
        debug!(url, error = %err, class = class.as_str(), "request failed");
        FetchOutcome::failure(None, class)
    }

    fn record_failure(&self, host: &str) {
        if self.breakers.on_failure(host) {
            // Exactly one event per opening.
            self.emit(
                PipelineEvent::new(
                    self.run_id.clone(),
                    PipelineStage::Coleta,
                    "circuit_open",
                    EventLevel::Warning,
                    format!("circuit breaker opened for host {}", host),
                )
                .with_dados(serde_json::json!({ "host": host })),
            );
        }
    }

    fn emit_warning(
        &self,
        stage: PipelineStage,
        url: &str,
        class: ErrorClass,
        status: Option<u16>,
    ) {
        warn!(url, class = class.as_str(), status, "fetch failed");
        self.emit(
            PipelineEvent::new(
                self.run_id.clone(),
                stage,
                "http_error",
                EventLevel::Warning,
                format!("fetch failed for {}", url),
            )
            .with_dados(serde_json::json!({
                "url": url,
                "error_class": class.as_str(),
                "status": status,
            })),
        );
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}
