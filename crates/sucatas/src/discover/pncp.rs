//! PNCP API discoverer: term × page sweep over a rolling window.

use super::Candidate;
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use sucatas_extract::dates::parse_iso_datetime;
use sucatas_extract::json::build_pncp_public_url;
use sucatas_http::HttpClient;
use sucatas_protocol::{CandidateNotice, MinerConfig, PipelineStage, SourceName};
use tracing::{debug, info};

/// Sweep the publication search endpoint for every configured term and
/// page inside `[now - dias_retroativos, now]`. Duplicates across terms
/// are kept: the pipeline counts and collapses them.
pub async fn discover(client: &HttpClient, config: &MinerConfig) -> Vec<Candidate> {
    let today = Utc::now().date_naive();
    let start = today - Duration::days(config.dias_retroativos as i64);
    let data_inicial = start.format("%Y-%m-%d").to_string();
    let data_final = today.format("%Y-%m-%d").to_string();

    let mut candidates = Vec::new();
    for termo in &config.search_terms {
        for pagina in 1..=config.paginas_por_termo {
            let query = [
                ("pagina", pagina.to_string()),
                ("tamanhoPagina", config.tamanho_pagina.to_string()),
                ("termo", termo.clone()),
                ("dataInicial", data_inicial.clone()),
                ("dataFinal", data_final.clone()),
            ];
            let outcome = client
                .get_json(PipelineStage::Busca, &config.search_endpoint, &query)
                .await;
            if !outcome.ok {
                debug!(%termo, pagina, "search page failed, moving on");
                continue;
            }
            let Some(body) = outcome.json() else { continue };
            let items = extract_items(&body);
            if items.is_empty() {
                // Pages are sequential; an empty one ends this term
                break;
            }
            for item in items {
                if let Some(candidate) = candidate_from_item(&item) {
                    candidates.push(candidate);
                }
            }
        }
    }

    info!(total = candidates.len(), "PNCP discovery finished");
    candidates
}

/// The search endpoint answers either `{"data": [...]}` or a bare array.
fn extract_items(body: &Value) -> Vec<Value> {
    let array = match body {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("data").and_then(|d| d.as_array()),
        _ => None,
    };
    array
        .map(|items| items.iter().filter(|i| i.is_object()).cloned().collect())
        .unwrap_or_default()
}

fn candidate_from_item(item: &Value) -> Option<Candidate> {
    let external_id = item
        .get("numeroControlePNCP")
        .or_else(|| item.get("numeroControlePncp"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| fallback_external_id(item))?;

    let lastmod = item
        .get("dataAtualizacao")
        .and_then(|v| v.as_str())
        .and_then(parse_iso_datetime)
        .map(|naive| Utc.from_utc_datetime(&naive));

    Some(Candidate {
        notice: CandidateNotice {
            source_name: SourceName::Pncp,
            source_external_id: external_id.clone(),
            raw_url: build_pncp_public_url(&external_id),
            lastmod,
            score_hint: None,
        },
        payload: Some(item.clone()),
    })
}

/// Items occasionally miss the control number; `cnpj-ano-seq` still
/// identifies the purchase.
fn fallback_external_id(item: &Value) -> Option<String> {
    let cnpj = item
        .get("orgaoEntidade")?
        .get("cnpj")?
        .as_str()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    let ano = item.get("anoCompra")?.as_i64()?;
    let seq = item.get("sequencialCompra")?.as_i64()?;
    if cnpj.is_empty() {
        return None;
    }
    Some(format!("{}-{}-{}", cnpj, ano, seq))
}
