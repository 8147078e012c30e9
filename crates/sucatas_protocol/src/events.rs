//! Pipeline audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stage an event belongs to.
/// This is the CANONICAL definition - the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Inicio,
    Busca,
    Coleta,
    PdfDownload,
    PdfParse,
    Extract,
    Enrich,
    Validate,
    Upsert,
    Quarantine,
    Fim,
}

impl PipelineStage {
    pub const ALL: &'static [PipelineStage] = &[
        PipelineStage::Inicio,
        PipelineStage::Busca,
        PipelineStage::Coleta,
        PipelineStage::PdfDownload,
        PipelineStage::PdfParse,
        PipelineStage::Extract,
        PipelineStage::Enrich,
        PipelineStage::Validate,
        PipelineStage::Upsert,
        PipelineStage::Quarantine,
        PipelineStage::Fim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Inicio => "inicio",
            PipelineStage::Busca => "busca",
            PipelineStage::Coleta => "coleta",
            PipelineStage::PdfDownload => "pdf_download",
            PipelineStage::PdfParse => "pdf_parse",
            PipelineStage::Extract => "extract",
            PipelineStage::Enrich => "enrich",
            PipelineStage::Validate => "validate",
            PipelineStage::Upsert => "upsert",
            PipelineStage::Quarantine => "quarantine",
            PipelineStage::Fim => "fim",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inicio" => Ok(PipelineStage::Inicio),
            "busca" => Ok(PipelineStage::Busca),
            "coleta" => Ok(PipelineStage::Coleta),
            "pdf_download" => Ok(PipelineStage::PdfDownload),
            "pdf_parse" => Ok(PipelineStage::PdfParse),
            "extract" => Ok(PipelineStage::Extract),
            "enrich" => Ok(PipelineStage::Enrich),
            "validate" => Ok(PipelineStage::Validate),
            "upsert" => Ok(PipelineStage::Upsert),
            "quarantine" => Ok(PipelineStage::Quarantine),
            "fim" => Ok(PipelineStage::Fim),
            _ => Err(format!("Invalid pipeline stage: '{}'", s)),
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One free-form audit log entry. Buffered by the run tracker and
/// batch-inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: String,
    pub etapa: PipelineStage,
    pub evento: String,
    pub nivel: EventLevel,
    pub mensagem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dados: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duracao_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contador: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(
        run_id: impl Into<String>,
        etapa: PipelineStage,
        evento: impl Into<String>,
        nivel: EventLevel,
        mensagem: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            etapa,
            evento: evento.into(),
            nivel,
            mensagem: mensagem.into(),
            dados: None,
            duracao_ms: None,
            contador: None,
            created_at: Utc::now(),
        }
    }

    pub fn info(
        run_id: impl Into<String>,
        etapa: PipelineStage,
        evento: impl Into<String>,
        mensagem: impl Into<String>,
    ) -> Self {
        Self::new(run_id, etapa, evento, EventLevel::Info, mensagem)
    }

    pub fn warning(
        run_id: impl Into<String>,
        etapa: PipelineStage,
        evento: impl Into<String>,
        mensagem: impl Into<String>,
    ) -> Self {
        Self::new(run_id, etapa, evento, EventLevel::Warning, mensagem)
    }

    pub fn error(
        run_id: impl Into<String>,
        etapa: PipelineStage,
        evento: impl Into<String>,
        mensagem: impl Into<String>,
    ) -> Self {
        Self::new(run_id, etapa, evento, EventLevel::Error, mensagem)
    }

    pub fn with_dados(mut self, dados: serde_json::Value) -> Self {
        self.dados = Some(dados);
        self
    }

    pub fn with_contador(mut self, contador: i64) -> Self {
        self.contador = Some(contador);
        self
    }

    pub fn with_duracao_ms(mut self, duracao_ms: i64) -> Self {
        self.duracao_ms = Some(duracao_ms);
        self
    }
}
