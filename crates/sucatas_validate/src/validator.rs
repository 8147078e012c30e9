//! Record normalization and status classification.

use rust_decimal::Decimal;
use serde_json::json;
use sucatas_extract::text::{collapse_whitespace, truncate_with_ellipsis};
use sucatas_extract::urls;
use sucatas_protocol::defaults::{is_known_uf, TAG_SEM_CLASSIFICACAO};
use sucatas_protocol::{
    AuctionRecord, ErrorCode, RecordStatus, RejectionRecord, ValidationError,
};

/// Cap applied to `descricao` during normalization.
const DESCRICAO_MAX_CHARS: usize = 500;

/// Required fields of the canonical contract. `data_leilao` is handled
/// separately: its absence demotes to NOT_SELLABLE instead of DRAFT.
/// `n_edital` is NOT required.
pub const REQUIRED_FIELDS: &[&str] = &[
    "id_interno",
    "municipio",
    "uf",
    "pncp_url",
    "data_atualizacao",
    "titulo",
    "descricao",
    "orgao",
    "objeto_resumido",
    "tags",
    "valor_estimado",
    "tipo_leilao",
    "data_publicacao",
];

/// Outcome of validating one record.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: RecordStatus,
    pub normalized_record: AuctionRecord,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Build the quarantine row for a non-VALID outcome.
    pub fn to_rejection(&self, run_id: &str, raw_record: &AuctionRecord) -> RejectionRecord {
        RejectionRecord {
            run_id: run_id.to_string(),
            id_interno: self.normalized_record.id_interno.clone(),
            status: self.status,
            errors: self.errors.clone(),
            raw_record: serde_json::to_value(raw_record).unwrap_or_else(|_| json!({})),
            normalized_record: serde_json::to_value(&self.normalized_record)
                .unwrap_or_else(|_| json!({})),
        }
    }
}

/// Apply the canonical contract to a candidate record.
pub fn validate_record(record: &AuctionRecord) -> ValidationResult {
    let mut normalized = record.clone();
    let mut errors: Vec<ValidationError> = Vec::new();

    normalize_strings(&mut normalized);
    normalize_coordinates(&mut normalized);
    normalize_tags(&mut normalized, &mut errors);
    normalize_urls(&mut normalized, &mut errors);
    check_uf(&mut normalized, &mut errors);
    check_dates(&normalized, &mut errors);
    check_required(&normalized, &mut errors);

    // Extraction failures ride along for triage but never decide status
    errors.extend(normalized.extraction_errors.iter().cloned());

    let status = decide_status(&errors);
    ValidationResult {
        status,
        normalized_record: normalized,
        errors,
    }
}

fn decide_status(errors: &[ValidationError]) -> RecordStatus {
    let hard_reject = errors.iter().any(|e| {
        matches!(e.code, ErrorCode::InvalidDateFormat | ErrorCode::InvalidUrl)
    });
    if hard_reject {
        return RecordStatus::Rejected;
    }

    let missing: Vec<&str> = errors
        .iter()
        .filter(|e| e.code == ErrorCode::MissingRequiredField)
        .map(|e| e.field.as_str())
        .collect();
    if missing.is_empty() {
        return RecordStatus::Valid;
    }
    if missing.iter().all(|field| *field == "data_leilao") {
        return RecordStatus::NotSellable;
    }
    RecordStatus::Draft
}

fn normalize_strings(record: &mut AuctionRecord) {
    for field in [
        &mut record.municipio,
        &mut record.titulo,
        &mut record.orgao,
        &mut record.objeto_resumido,
        &mut record.n_edital,
        &mut record.modalidade,
        &mut record.nome_leiloeiro,
    ] {
        if let Some(value) = field {
            let cleaned = collapse_whitespace(value);
            if cleaned.is_empty() {
                *field = None;
            } else {
                *field = Some(cleaned);
            }
        }
    }
    if let Some(descricao) = &record.descricao {
        let lines: Vec<String> = descricao
            .lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect();
        let joined = lines.join("\n");
        if joined.is_empty() {
            record.descricao = None;
        } else {
            record.descricao = Some(truncate_with_ellipsis(&joined, DESCRICAO_MAX_CHARS));
        }
    }
}

/// Coordinates are optional but pair-valid: a lone latitude or longitude
/// carries no information and is dropped.
fn normalize_coordinates(record: &mut AuctionRecord) {
    let pair_ok = record.lat.is_some() == record.lon.is_some()
        && record.lat.map(|v| (-90.0..=90.0).contains(&v)).unwrap_or(true)
        && record.lon.map(|v| (-180.0..=180.0).contains(&v)).unwrap_or(true);
    if !pair_ok {
        record.lat = None;
        record.lon = None;
    }
}

fn normalize_tags(record: &mut AuctionRecord, errors: &mut Vec<ValidationError>) {
    let original = record.tags.clone();
    let mut tags: Vec<String> = record
        .tags
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty() && t != TAG_SEM_CLASSIFICACAO)
        .collect();
    tags.sort();
    tags.dedup();
    // Pure reordering is not a change worth a notice
    let mut original_sorted = original;
    original_sorted.sort();
    original_sorted.dedup();
    if tags != original_sorted {
        errors.push(ValidationError::new(
            ErrorCode::TagsNormalized,
            "tags",
            "tag set was normalized",
        ));
    }
    record.tags = tags;
}

fn normalize_urls(record: &mut AuctionRecord, errors: &mut Vec<ValidationError>) {
    for (field_name, slot) in [
        ("pncp_url", &mut record.pncp_url),
        ("leiloeiro_url", &mut record.leiloeiro_url),
    ] {
        let Some(raw) = slot.clone() else { continue };
        match urls::normalize_url(&raw) {
            Some(normalized) => {
                let host_ok = urls::host_of(&normalized)
                    .map(|h| urls::has_allowed_suffix(&h) && !urls::is_email_provider(&h))
                    .unwrap_or(false);
                if !host_ok {
                    errors.push(ValidationError::new(
                        ErrorCode::InvalidUrl,
                        field_name,
                        format!("host of '{}' is not an acceptable domain", normalized),
                    ));
                    continue;
                }
                if normalized != raw {
                    errors.push(ValidationError::new(
                        ErrorCode::UrlNormalized,
                        field_name,
                        format!("'{}' normalized to '{}'", raw, normalized),
                    ));
                }
                *slot = Some(normalized);
            }
            None => {
                errors.push(ValidationError::new(
                    ErrorCode::InvalidUrl,
                    field_name,
                    format!("'{}' is not a usable HTTP(S) URL", raw),
                ));
                *slot = None;
            }
        }
    }

    if !record.leiloeiro_url_valid {
        errors.push(ValidationError::new(
            ErrorCode::InvalidUrl,
            "leiloeiro_url",
            "extracted value is a bare word, not a URL",
        ));
    }
}

fn check_uf(record: &mut AuctionRecord, errors: &mut Vec<ValidationError>) {
    if let Some(uf) = &record.uf {
        let upper = uf.trim().to_uppercase();
        if upper.is_empty() {
            record.uf = None;
        } else if is_known_uf(&upper) {
            record.uf = Some(upper);
        } else {
            errors.push(ValidationError::new(
                ErrorCode::MissingRequiredField,
                "uf",
                format!("'{}' is not one of the 27 UF codes", upper),
            ));
            record.uf = None;
        }
    }
}

fn check_dates(record: &AuctionRecord, errors: &mut Vec<ValidationError>) {
    for (field, value) in [
        ("data_publicacao", &record.data_publicacao),
        ("data_atualizacao", &record.data_atualizacao),
        ("data_leilao", &record.data_leilao),
    ] {
        if let Some(value) = value {
            if !sucatas_extract::dates::is_canonical_date(value) {
                errors.push(ValidationError::new(
                    ErrorCode::InvalidDateFormat,
                    field,
                    format!("'{}' is not a DD-MM-YYYY date", value),
                ));
            }
        }
    }
}

fn check_required(record: &AuctionRecord, errors: &mut Vec<ValidationError>) {
    let mut push_missing = |field: &str| {
        errors.push(ValidationError::missing(field));
    };

    if record.id_interno.trim().is_empty() {
        push_missing("id_interno");
    }
    if is_blank(&record.municipio) {
        push_missing("municipio");
    }
    if is_blank(&record.uf) {
        push_missing("uf");
    }
    if is_blank(&record.pncp_url) {
        push_missing("pncp_url");
    }
    if is_blank(&record.data_atualizacao) {
        push_missing("data_atualizacao");
    }
    if is_blank(&record.titulo) {
        push_missing("titulo");
    }
    if is_blank(&record.descricao) {
        push_missing("descricao");
    }
    if is_blank(&record.orgao) {
        push_missing("orgao");
    }
    if is_blank(&record.objeto_resumido) {
        push_missing("objeto_resumido");
    }
    if record.tags.is_empty() {
        push_missing("tags");
    }
    if record.valor_estimado.filter(|v| *v > Decimal::ZERO).is_none() {
        push_missing("valor_estimado");
    }
    if record.tipo_leilao.is_none() {
        push_missing("tipo_leilao");
    }
    if is_blank(&record.data_publicacao) {
        push_missing("data_publicacao");
    }
    // Saleability: absence only demotes to NOT_SELLABLE
    if is_blank(&record.data_leilao) {
        push_missing("data_leilao");
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use sucatas_protocol::{SourceName, TipoLeilao};

    /// A record that satisfies every clause of the contract.
    fn complete_record() -> AuctionRecord {
        let mut record = AuctionRecord::seed(SourceName::Pncp, "00038-1-000123/2026", "test");
        record.municipio = Some("Campinas".to_string());
        record.uf = Some("SP".to_string());
        record.pncp_url = Some("https://pncp.gov.br/app/editais/00038-1-000123/2026".to_string());
        record.data_publicacao = Some("20-01-2026".to_string());
        record.data_atualizacao = Some("25-01-2026".to_string());
        record.data_leilao = Some("15-02-2026".to_string());
        record.titulo = Some("Leilão de veículos inservíveis".to_string());
        record.descricao = Some("Sucatas e veículos conservados".to_string());
        record.orgao = Some("Prefeitura Municipal de Campinas".to_string());
        record.objeto_resumido = Some("FIAT, VW".to_string());
        record.tags = vec!["VEICULO".to_string(), "SUCATA".to_string()];
        record.valor_estimado = Some(Decimal::from_str("50000.00").unwrap());
        record.tipo_leilao = Some(TipoLeilao::Eletronico);
        record
    }

    #[test]
    fn complete_record_is_valid() {
        let result = validate_record(&complete_record());
        assert_eq!(result.status, RecordStatus::Valid);
        // Tag sort is a normalization notice at most, never an error
        assert!(result.errors.iter().all(|e| e.code.is_notice()));
    }

    #[test]
    fn missing_data_leilao_alone_is_not_sellable() {
        // Scenario B
        let mut record = complete_record();
        record.data_leilao = None;
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::NotSellable);
        let real_errors: Vec<_> = result.errors.iter().filter(|e| !e.code.is_notice()).collect();
        assert_eq!(real_errors.len(), 1);
        assert_eq!(real_errors[0].code, ErrorCode::MissingRequiredField);
        assert_eq!(real_errors[0].field, "data_leilao");
    }

    #[test]
    fn www_url_is_normalized_with_a_notice() {
        // Scenario C
        let mut record = complete_record();
        record.pncp_url = Some("www.pncp.gov.br/x".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Valid);
        assert_eq!(
            result.normalized_record.pncp_url.as_deref(),
            Some("https://www.pncp.gov.br/x")
        );
        let notices: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ErrorCode::UrlNormalized)
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].field, "pncp_url");
    }

    #[test]
    fn malformed_date_rejects() {
        let mut record = complete_record();
        record.data_publicacao = Some("2026-01-20".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Rejected);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidDateFormat && e.field == "data_publicacao"));
    }

    #[test]
    fn unusable_url_rejects() {
        let mut record = complete_record();
        record.pncp_url = Some("COMEMORA".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Rejected);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidUrl && e.field == "pncp_url"));
    }

    #[test]
    fn word_flagged_leiloeiro_url_rejects() {
        let mut record = complete_record();
        record.leiloeiro_url = None;
        record.leiloeiro_url_valid = false;
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Rejected);
    }

    #[test]
    fn email_provider_leiloeiro_url_rejects() {
        let mut record = complete_record();
        record.leiloeiro_url = Some("https://gmail.com/leiloeiro".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Rejected);
    }

    #[test]
    fn several_missing_fields_draft() {
        let mut record = complete_record();
        record.orgao = None;
        record.valor_estimado = None;
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Draft);
        let missing: Vec<&str> = result
            .errors
            .iter()
            .filter(|e| e.code == ErrorCode::MissingRequiredField)
            .map(|e| e.field.as_str())
            .collect();
        assert!(missing.contains(&"orgao"));
        assert!(missing.contains(&"valor_estimado"));
    }

    #[test]
    fn n_edital_is_optional() {
        let mut record = complete_record();
        record.n_edital = None;
        assert_eq!(validate_record(&record).status, RecordStatus::Valid);
    }

    #[test]
    fn sentinel_tag_is_stripped_with_a_notice() {
        let mut record = complete_record();
        record.tags = vec![
            "veiculo".to_string(),
            "SEM CLASSIFICAÇÃO".to_string(),
            "VEICULO".to_string(),
        ];
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Valid);
        assert_eq!(result.normalized_record.tags, vec!["VEICULO".to_string()]);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::TagsNormalized));
    }

    #[test]
    fn only_sentinel_tags_leave_the_set_empty_and_draft() {
        let mut record = complete_record();
        record.tags = vec!["SEM CLASSIFICAÇÃO".to_string()];
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Draft);
        assert!(result.normalized_record.tags.is_empty());
    }

    #[test]
    fn unknown_uf_demotes_to_draft() {
        let mut record = complete_record();
        record.uf = Some("XX".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Draft);
    }

    #[test]
    fn lowercase_uf_is_normalized() {
        let mut record = complete_record();
        record.uf = Some("sp".to_string());
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Valid);
        assert_eq!(result.normalized_record.uf.as_deref(), Some("SP"));
    }

    #[test]
    fn descricao_is_capped_at_500_chars() {
        let mut record = complete_record();
        record.descricao = Some("x".repeat(900));
        let result = validate_record(&record);
        let descricao = result.normalized_record.descricao.unwrap();
        assert_eq!(descricao.chars().count(), 500);
        assert!(descricao.ends_with('…'));
    }

    #[test]
    fn lone_or_out_of_range_coordinates_are_dropped() {
        let mut record = complete_record();
        record.lat = Some(-22.9);
        record.lon = None;
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Valid);
        assert!(result.normalized_record.lat.is_none());

        let mut record = complete_record();
        record.lat = Some(-22.9);
        record.lon = Some(-47.06);
        let result = validate_record(&record);
        assert_eq!(result.normalized_record.lat, Some(-22.9));
        assert_eq!(result.normalized_record.lon, Some(-47.06));

        let mut record = complete_record();
        record.lat = Some(123.0);
        record.lon = Some(-47.06);
        let result = validate_record(&record);
        assert!(result.normalized_record.lat.is_none());
        assert!(result.normalized_record.lon.is_none());
    }

    #[test]
    fn zero_valor_estimado_counts_as_missing() {
        let mut record = complete_record();
        record.valor_estimado = Some(Decimal::ZERO);
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Draft);
    }

    #[test]
    fn extraction_errors_ride_along_without_demoting() {
        let mut record = complete_record();
        record.extraction_errors.push(ValidationError::new(
            ErrorCode::ExtractionError,
            "anexo.xlsx",
            "broken workbook",
        ));
        let result = validate_record(&record);
        assert_eq!(result.status, RecordStatus::Valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::ExtractionError));
    }

    #[test]
    fn rejection_row_carries_raw_and_normalized() {
        let mut record = complete_record();
        record.data_leilao = None;
        let result = validate_record(&record);
        let rejection = result.to_rejection("run-1", &record);
        assert_eq!(rejection.run_id, "run-1");
        assert_eq!(rejection.id_interno, record.id_interno);
        assert_eq!(rejection.status, RecordStatus::NotSellable);
        assert!(!rejection.errors.is_empty());
        assert!(rejection.raw_record.get("id_interno").is_some());
        assert!(rejection.normalized_record.get("id_interno").is_some());
    }
}
