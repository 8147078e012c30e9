//! Canonical types shared across the Ache Sucatas pipeline.
//!
//! Every crate in the workspace speaks these types. The enums here are the
//! CANONICAL definitions - use them everywhere instead of redeclaring
//! stringly-typed variants in callers.

pub mod config;
pub mod defaults;
pub mod events;
pub mod ids;
pub mod report;
pub mod types;

pub use config::MinerConfig;
pub use events::{EventLevel, PipelineEvent, PipelineStage};
pub use ids::{new_run_id, pdf_hash_hex, stable_id_interno};
pub use report::{FinOpsReport, QualityReport, ReasonCount};
pub use types::{
    AuctionRecord, CandidateNotice, DocumentKind, ErrorCode, FetchedDocument, FetchedNotice,
    RecordStatus, RejectionRecord, RunExecution, RunMode, RunStatus, SourceName, TipoLeilao,
    ValidationError,
};
