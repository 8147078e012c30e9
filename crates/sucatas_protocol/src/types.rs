//! Canonical record and status types for the ingestion pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// Identifies which connector produced a record.
/// This is the CANONICAL definition - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    /// Portal Nacional de Contratações Públicas (JSON API)
    Pncp,
    /// Specialist auctioneer site (sitemap-driven)
    Leiloeiro,
}

impl SourceName {
    pub const ALL: &'static [SourceName] = &[SourceName::Pncp, SourceName::Leiloeiro];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Pncp => "pncp",
            SourceName::Leiloeiro => "leiloeiro",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pncp" => Ok(SourceName::Pncp),
            "leiloeiro" => Ok(SourceName::Leiloeiro),
            _ => Err(format!("Invalid source name: '{}'. Expected: pncp, leiloeiro", s)),
        }
    }
}

/// Validation outcome for a record - decides where the record is routed.
/// This is the CANONICAL definition - use this everywhere.
///
/// Only `Valid` rows reach the primary table; everything else lives in
/// quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Record satisfies the canonical contract
    Valid,
    /// Required fields missing (other than data_leilao)
    Draft,
    /// Complete except for the auction date
    NotSellable,
    /// Malformed dates or URLs - hard contract violation
    Rejected,
}

impl RecordStatus {
    pub const ALL: &'static [RecordStatus] = &[
        RecordStatus::Valid,
        RecordStatus::Draft,
        RecordStatus::NotSellable,
        RecordStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Valid => "VALID",
            RecordStatus::Draft => "DRAFT",
            RecordStatus::NotSellable => "NOT_SELLABLE",
            RecordStatus::Rejected => "REJECTED",
        }
    }

    /// Routes to the quarantine store instead of the primary table.
    pub fn is_quarantine(&self) -> bool {
        !matches!(self, RecordStatus::Valid)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VALID" => Ok(RecordStatus::Valid),
            "DRAFT" => Ok(RecordStatus::Draft),
            "NOT_SELLABLE" => Ok(RecordStatus::NotSellable),
            "REJECTED" => Ok(RecordStatus::Rejected),
            _ => Err(format!("Invalid record status: '{}'", s)),
        }
    }
}

/// Auction modality. Null is preserved when the notice gives no explicit
/// keyword evidence - absence never defaults to electronic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoLeilao {
    Eletronico,
    Presencial,
    Hibrido,
}

impl TipoLeilao {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoLeilao::Eletronico => "ELETRONICO",
            TipoLeilao::Presencial => "PRESENCIAL",
            TipoLeilao::Hibrido => "HIBRIDO",
        }
    }
}

impl fmt::Display for TipoLeilao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TipoLeilao {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ELETRONICO" | "ELETRÔNICO" => Ok(TipoLeilao::Eletronico),
            "PRESENCIAL" => Ok(TipoLeilao::Presencial),
            "HIBRIDO" | "HÍBRIDO" | "1+2" => Ok(TipoLeilao::Hibrido),
            _ => Err(format!("Invalid tipo_leilao: '{}'", s)),
        }
    }
}

/// Processing mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// Skip candidates whose id_interno already exists in the primary table
    #[default]
    Incremental,
    /// Reprocess and re-upsert every candidate
    Full,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Incremental => "INCREMENTAL",
            RunMode::Full => "FULL",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INCREMENTAL" => Ok(RunMode::Incremental),
            "FULL" => Ok(RunMode::Full),
            _ => Err(format!("Invalid run mode: '{}'", s)),
        }
    }
}

/// Lifecycle of a pipeline execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RUNNING" => Ok(RunStatus::Running),
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid run status: '{}'", s)),
        }
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Structured validation error code.
/// This is the CANONICAL definition - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingRequiredField,
    InvalidDateFormat,
    InvalidUrl,
    RejectedCategory,
    ExtractionError,
    UrlNormalized,
    TagsNormalized,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidDateFormat => "INVALID_DATE_FORMAT",
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::RejectedCategory => "REJECTED_CATEGORY",
            ErrorCode::ExtractionError => "EXTRACTION_ERROR",
            ErrorCode::UrlNormalized => "URL_NORMALIZED",
            ErrorCode::TagsNormalized => "TAGS_NORMALIZED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Normalization notices do not demote a record from VALID.
    pub fn is_notice(&self) -> bool {
        matches!(self, ErrorCode::UrlNormalized | ErrorCode::TagsNormalized)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One structured entry in a validation result's error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("required field '{}' is missing or empty", field);
        Self::new(ErrorCode::MissingRequiredField, field, message)
    }
}

// ============================================================================
// Canonical Record
// ============================================================================

/// The canonical auction-notice record.
///
/// The cascade produces a partially-filled record; the validator decides
/// whether the filled subset satisfies the contract. Fields that the
/// contract requires are still `Option` here because a record only becomes
/// trustworthy after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuctionRecord {
    // Identity
    pub id_interno: String,
    pub source_name: Option<SourceName>,
    pub source_external_id: String,

    // Geography
    pub municipio: Option<String>,
    pub uf: Option<String>,
    pub ibge_code: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,

    // Temporal (DD-MM-YYYY strings)
    pub data_publicacao: Option<String>,
    pub data_atualizacao: Option<String>,
    pub data_leilao: Option<String>,

    // Content
    pub titulo: Option<String>,
    pub descricao: Option<String>,
    pub orgao: Option<String>,
    pub n_edital: Option<String>,
    pub objeto_resumido: Option<String>,
    pub tags: Vec<String>,

    // Commercial
    pub valor_estimado: Option<Decimal>,
    pub quantidade_itens: Option<i64>,
    pub tipo_leilao: Option<TipoLeilao>,
    pub modalidade: Option<String>,
    pub nome_leiloeiro: Option<String>,

    // Links
    pub pncp_url: Option<String>,
    pub leiloeiro_url: Option<String>,
    /// False when an extracted "URL" turned out to be a bare word.
    #[serde(default = "default_true")]
    pub leiloeiro_url_valid: bool,

    // Provenance
    pub storage_path: Option<String>,
    pub pdf_hash: Option<String>,
    pub versao_auditor: String,

    /// Extraction failures accumulated while building this record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraction_errors: Vec<ValidationError>,
}

fn default_true() -> bool {
    true
}

impl AuctionRecord {
    /// Start a record for a `(source, external id)` pair with a stable
    /// internal identity.
    pub fn seed(source_name: SourceName, source_external_id: &str, versao_auditor: &str) -> Self {
        Self {
            id_interno: crate::ids::stable_id_interno(source_name, source_external_id),
            source_name: Some(source_name),
            source_external_id: source_external_id.to_string(),
            versao_auditor: versao_auditor.to_string(),
            leiloeiro_url_valid: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// Quarantine
// ============================================================================

/// One quarantine row, keyed by `(run_id, id_interno)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub run_id: String,
    pub id_interno: String,
    pub status: RecordStatus,
    pub errors: Vec<ValidationError>,
    pub raw_record: serde_json::Value,
    pub normalized_record: serde_json::Value,
}

// ============================================================================
// Discovery & Fetch
// ============================================================================

/// One candidate notice produced by a discoverer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateNotice {
    pub source_name: SourceName,
    pub source_external_id: String,
    pub raw_url: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub score_hint: Option<f64>,
}

/// Real file type of a fetched attachment, decided by content-type header
/// first, then magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Xlsx,
    Xls,
    Csv,
    Docx,
    Zip,
    Json,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Xls => "xls",
            DocumentKind::Csv => "csv",
            DocumentKind::Docx => "docx",
            DocumentKind::Zip => "zip",
            DocumentKind::Json => "json",
            DocumentKind::Unknown => "unknown",
        }
    }

    /// Detect the real file type: content-type header first, magic bytes
    /// second. OOXML containers are disambiguated by their internal layout
    /// marker (`xl/` vs `word/`) near the start of the archive.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if let Some(ct) = content_type {
            let ct = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            match ct.as_str() {
                "application/pdf" => return DocumentKind::Pdf,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                    return DocumentKind::Xlsx;
                }
                "application/vnd.ms-excel" => return DocumentKind::Xls,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                    return DocumentKind::Docx;
                }
                "application/zip" | "application/x-zip-compressed" => {
                    return Self::detect_zip_flavor(bytes);
                }
                "application/json" => return DocumentKind::Json,
                "text/csv" => return DocumentKind::Csv,
                _ => {}
            }
        }

        if bytes.starts_with(b"%PDF") {
            return DocumentKind::Pdf;
        }
        if bytes.starts_with(b"PK\x03\x04") {
            return Self::detect_zip_flavor(bytes);
        }
        // Legacy OLE container (xls/doc)
        if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            return DocumentKind::Xls;
        }
        if bytes.first() == Some(&b'{') || bytes.first() == Some(&b'[') {
            return DocumentKind::Json;
        }
        DocumentKind::Unknown
    }

    fn detect_zip_flavor(bytes: &[u8]) -> Self {
        // The first local file header of an OOXML archive names an entry
        // under xl/ or word/; a plain head scan is enough to tell them apart.
        let head = &bytes[..bytes.len().min(4096)];
        if contains_subslice(head, b"xl/") {
            DocumentKind::Xlsx
        } else if contains_subslice(head, b"word/") {
            DocumentKind::Docx
        } else {
            DocumentKind::Zip
        }
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One downloaded attachment.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub kind: DocumentKind,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// SHA-256 of the raw bytes.
    pub hash: String,
    pub storage_path: Option<String>,
}

/// Everything the fetcher gathered for one candidate.
#[derive(Debug, Clone, Default)]
pub struct FetchedNotice {
    /// Source-dependent metadata payload (PNCP item, lot page data, ...).
    pub raw_metadata: serde_json::Value,
    pub documents: Vec<FetchedDocument>,
}

// ============================================================================
// Run Execution
// ============================================================================

/// Persisted history row for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExecution {
    pub run_id: String,
    pub execution_start: DateTime<Utc>,
    pub execution_end: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub mode: RunMode,
    pub versao_miner: String,

    // Cascade-level counters
    pub editais_encontrados: i64,
    pub editais_novos: i64,
    pub editais_skip_existe: i64,
    pub editais_duplicados: i64,
    pub downloads_ok: i64,
    pub downloads_fail: i64,

    pub quality_report: Option<serde_json::Value>,
    pub finops: Option<serde_json::Value>,
    pub config_snapshot: Option<serde_json::Value>,
}
