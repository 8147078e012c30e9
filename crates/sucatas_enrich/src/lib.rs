//! Optional LLM enrichment.
//!
//! The pipeline works complete with [`NoopEnricher`]; the OpenAI backend is
//! wired in only when a key is configured. Enrichment NEVER overwrites a
//! value the cascade produced and NEVER fails a candidate: on any error the
//! record comes back unchanged with a warning for the event log.

mod openai;

pub use openai::OpenAiEnricher;

use async_trait::async_trait;
use sucatas_protocol::AuctionRecord;

/// Token/cost accounting snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnrichStats {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// What one enrichment attempt produced.
pub struct EnrichOutcome {
    pub record: AuctionRecord,
    /// Present when the attempt failed and the record is unchanged.
    pub warning: Option<String>,
}

/// Capability abstraction over the external LLM.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fill commercial fields the cascade left empty.
    async fn enrich(&self, record: AuctionRecord, pdf_head: &str) -> EnrichOutcome;

    /// Accumulated FinOps numbers for this run.
    fn stats(&self) -> EnrichStats;

    fn name(&self) -> &'static str;
}

/// Enricher that does nothing; the default when no key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, record: AuctionRecord, _pdf_head: &str) -> EnrichOutcome {
        EnrichOutcome {
            record,
            warning: None,
        }
    }

    fn stats(&self) -> EnrichStats {
        EnrichStats::default()
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
