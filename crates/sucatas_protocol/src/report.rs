//! Per-run quality report and FinOps accounting.

use crate::types::{ErrorCode, RecordStatus, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Infrastructure cost assumptions (USD). Coarse by design: the point is
/// trend tracking, not billing.
const COST_PER_PDF_EXTRACTION: f64 = 0.001;
const COST_PER_NEW_RECORD: f64 = 0.0005;

/// One entry of `top_reason_codes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub code: ErrorCode,
    pub count: u64,
}

/// Aggregated validation outcome of a single run.
///
/// Registered from multiple workers behind a mutex; all derived values are
/// recomputed on read so the struct stays a plain counter bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,

    pub total_processados: u64,
    pub total_validos: u64,
    pub draft_count: u64,
    pub not_sellable_count: u64,
    pub rejected_count: u64,

    reason_counts: HashMap<ErrorCode, u64>,
}

impl QualityReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: 0.0,
            total_processados: 0,
            total_validos: 0,
            draft_count: 0,
            not_sellable_count: 0,
            rejected_count: 0,
            reason_counts: HashMap::new(),
        }
    }

    /// Register one validation outcome. Normalization notices are not
    /// counted as rejection reasons.
    pub fn register(&mut self, status: RecordStatus, errors: &[ValidationError]) {
        self.total_processados += 1;
        match status {
            RecordStatus::Valid => self.total_validos += 1,
            RecordStatus::Draft => self.draft_count += 1,
            RecordStatus::NotSellable => self.not_sellable_count += 1,
            RecordStatus::Rejected => self.rejected_count += 1,
        }
        for err in errors {
            if !err.code.is_notice() {
                *self.reason_counts.entry(err.code).or_insert(0) += 1;
            }
        }
    }

    pub fn total_quarentena(&self) -> u64 {
        self.draft_count + self.not_sellable_count + self.rejected_count
    }

    /// Percentage of valid records; 0 when nothing was processed.
    pub fn taxa_validos_percent(&self) -> f64 {
        if self.total_processados == 0 {
            return 0.0;
        }
        (self.total_validos as f64 / self.total_processados as f64) * 100.0
    }

    /// Percentage of quarantined records; 0 when nothing was processed.
    pub fn taxa_quarentena_percent(&self) -> f64 {
        if self.total_processados == 0 {
            return 0.0;
        }
        (self.total_quarentena() as f64 / self.total_processados as f64) * 100.0
    }

    /// Up to ten reason codes, most frequent first. Ties break on the code
    /// name so the ordering is deterministic.
    pub fn top_reason_codes(&self) -> Vec<ReasonCount> {
        let mut entries: Vec<ReasonCount> = self
            .reason_counts
            .iter()
            .map(|(code, count)| ReasonCount {
                code: *code,
                count: *count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then(a.code.as_str().cmp(b.code.as_str())));
        entries.truncate(10);
        entries
    }

    /// Stamp the end of the run and freeze the duration.
    pub fn finalize(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.duration_seconds = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
    }

    /// Snapshot in the persisted report shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "duration_seconds": self.duration_seconds,
            "total_processados": self.total_processados,
            "total_validos": self.total_validos,
            "draft_count": self.draft_count,
            "not_sellable_count": self.not_sellable_count,
            "rejected_count": self.rejected_count,
            "total_quarentena": self.total_quarentena(),
            "taxa_validos_percent": self.taxa_validos_percent(),
            "taxa_quarentena_percent": self.taxa_quarentena_percent(),
            "top_reason_codes": self.top_reason_codes(),
        })
    }
}

/// Financial metrics of one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FinOpsReport {
    pub cost_total: f64,
    pub cost_openai: f64,
    pub num_pdfs: u64,
    pub custo_por_mil: f64,
}

impl FinOpsReport {
    /// Compute the run's cost picture from counters plus the enricher's
    /// accumulated LLM spend.
    pub fn compute(num_pdfs: u64, new_records: u64, cost_openai: f64) -> Self {
        let infra =
            num_pdfs as f64 * COST_PER_PDF_EXTRACTION + new_records as f64 * COST_PER_NEW_RECORD;
        let cost_total = infra + cost_openai;
        let custo_por_mil = if new_records == 0 {
            0.0
        } else {
            (cost_total / new_records as f64) * 1000.0
        };
        Self {
            cost_total,
            cost_openai,
            num_pdfs,
            custo_por_mil,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cost_total": self.cost_total,
            "cost_openai": self.cost_openai,
            "num_pdfs": self.num_pdfs,
            "custo_por_mil": self.custo_por_mil,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;

    fn err(code: ErrorCode) -> ValidationError {
        ValidationError::new(code, "f", "m")
    }

    #[test]
    fn rates_are_complementary() {
        let mut report = QualityReport::new("run-rates");
        for _ in 0..8 {
            report.register(RecordStatus::Valid, &[]);
        }
        for _ in 0..2 {
            report.register(RecordStatus::Draft, &[err(ErrorCode::MissingRequiredField)]);
        }
        assert_eq!(report.total_processados, 10);
        assert_eq!(report.total_validos, 8);
        assert_eq!(report.total_quarentena(), 2);
        assert!((report.taxa_validos_percent() - 80.0).abs() < f64::EPSILON);
        assert!((report.taxa_quarentena_percent() - 20.0).abs() < f64::EPSILON);
        let sum = report.taxa_validos_percent() + report.taxa_quarentena_percent();
        assert!((99.9..=100.1).contains(&sum));
    }

    #[test]
    fn rates_are_zero_on_empty_run() {
        let report = QualityReport::new("run-empty");
        assert_eq!(report.taxa_validos_percent(), 0.0);
        assert_eq!(report.taxa_quarentena_percent(), 0.0);
    }

    #[test]
    fn quarantine_counts_split_by_status() {
        let mut report = QualityReport::new("run-split");
        for _ in 0..15 {
            report.register(RecordStatus::Valid, &[]);
        }
        for _ in 0..3 {
            report.register(RecordStatus::Draft, &[err(ErrorCode::MissingRequiredField)]);
        }
        for _ in 0..2 {
            report.register(
                RecordStatus::NotSellable,
                &[ValidationError::missing("data_leilao")],
            );
        }
        assert_eq!(report.total_quarentena(), 5);
        assert_eq!(report.draft_count, 3);
        assert_eq!(report.not_sellable_count, 2);
        assert!((report.taxa_quarentena_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn top_reason_codes_ordered_by_frequency() {
        let mut report = QualityReport::new("run-top");
        for _ in 0..5 {
            report.register(RecordStatus::Draft, &[err(ErrorCode::MissingRequiredField)]);
        }
        for _ in 0..3 {
            report.register(RecordStatus::Rejected, &[err(ErrorCode::InvalidDateFormat)]);
        }
        report.register(RecordStatus::Rejected, &[err(ErrorCode::InvalidUrl)]);

        let top = report.top_reason_codes();
        assert_eq!(top[0].code, ErrorCode::MissingRequiredField);
        assert_eq!(top[0].count, 5);
        assert_eq!(top[1].code, ErrorCode::InvalidDateFormat);
        assert_eq!(top[2].code, ErrorCode::InvalidUrl);
    }

    #[test]
    fn notices_never_show_up_as_reasons() {
        let mut report = QualityReport::new("run-notices");
        report.register(RecordStatus::Valid, &[err(ErrorCode::UrlNormalized)]);
        assert!(report.top_reason_codes().is_empty());
    }

    #[test]
    fn finalize_freezes_duration() {
        let mut report = QualityReport::new("run-final");
        report.finalize();
        assert!(report.finished_at.is_some());
        assert!(report.duration_seconds >= 0.0);
        let json = report.to_json();
        for field in [
            "run_id",
            "started_at",
            "finished_at",
            "duration_seconds",
            "total_processados",
            "total_validos",
            "total_quarentena",
            "taxa_validos_percent",
            "taxa_quarentena_percent",
            "top_reason_codes",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }

    #[test]
    fn finops_cost_model() {
        // (10 * 0.001) + (100 * 0.0005) = 0.06 infra, no LLM spend
        let finops = FinOpsReport::compute(10, 100, 0.0);
        assert!((finops.cost_total - 0.06).abs() < 1e-9);
        assert!((finops.custo_por_mil - 0.6).abs() < 1e-9);

        let with_llm = FinOpsReport::compute(0, 0, 0.21);
        assert!((with_llm.cost_total - 0.21).abs() < 1e-9);
        assert_eq!(with_llm.custo_por_mil, 0.0);
    }
}
