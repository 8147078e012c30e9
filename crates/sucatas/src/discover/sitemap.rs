//! Sitemap-driven discoverer for auctioneer sites.

use super::Candidate;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use sucatas_http::HttpClient;
use sucatas_protocol::{CandidateNotice, PipelineStage, SourceName};
use tracing::info;

/// Lot pages look like `/lote/{leilao_id}/{lote_id}`.
static LOT_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"/lote/(\d+)/(\d+)").expect("lot regex"));

/// Category pages that hint at vehicle inventory.
static VEHICLE_CATEGORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/veiculos(/|$)|/diversos/sucatas(/|$)").expect("category regex")
});

/// How many parent auctions are reported as top seeds.
const TOP_SEED_COUNT: usize = 5;

/// Per-discovery accounting, persisted as a pipeline event payload.
#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    pub total_urls_found: usize,
    pub lot_urls_found: usize,
    pub category_urls: usize,
    /// `(leilao_id, lot_count)` of the largest parent auctions.
    pub top_seeds: Vec<(String, usize)>,
    pub errors: Vec<String>,
}

/// Fetch and walk `sitemap.xml`, returning lot candidates newest first by
/// `lastmod` plus the discovery report.
pub async fn discover(
    client: &HttpClient,
    sitemap_url: &str,
) -> (Vec<Candidate>, DiscoveryReport) {
    let mut report = DiscoveryReport::default();

    let outcome = client.get(PipelineStage::Busca, sitemap_url, &[]).await;
    if !outcome.ok {
        report.errors.push(format!(
            "sitemap fetch failed ({})",
            outcome
                .error_class
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| format!("HTTP {:?}", outcome.status))
        ));
        return (Vec::new(), report);
    }

    let entries = match parse_sitemap(&outcome.body) {
        Ok(entries) => entries,
        Err(err) => {
            report.errors.push(format!("sitemap parse failed: {err}"));
            return (Vec::new(), report);
        }
    };
    report.total_urls_found = entries.len();

    let mut lots_per_leilao: HashMap<String, usize> = HashMap::new();
    let mut candidates = Vec::new();

    for entry in &entries {
        if VEHICLE_CATEGORY.is_match(&entry.loc) {
            report.category_urls += 1;
            continue;
        }
        let Some(caps) = LOT_URL.captures(&entry.loc) else {
            continue;
        };
        report.lot_urls_found += 1;
        let leilao_id = caps[1].to_string();
        let lote_id = caps[2].to_string();
        *lots_per_leilao.entry(leilao_id.clone()).or_insert(0) += 1;

        candidates.push(Candidate {
            notice: CandidateNotice {
                source_name: SourceName::Leiloeiro,
                source_external_id: format!("{}-{}", leilao_id, lote_id),
                raw_url: entry.loc.clone(),
                lastmod: entry.lastmod,
                score_hint: None,
            },
            payload: None,
        });
    }

    // Parent auctions ranked by lot count; the count doubles as the
    // candidate's score hint.
    for candidate in &mut candidates {
        let leilao_id = candidate
            .notice
            .source_external_id
            .split('-')
            .next()
            .unwrap_or_default();
        candidate.notice.score_hint =
            lots_per_leilao.get(leilao_id).map(|count| *count as f64);
    }
    let mut seeds: Vec<(String, usize)> = lots_per_leilao.into_iter().collect();
    seeds.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    seeds.truncate(TOP_SEED_COUNT);
    report.top_seeds = seeds;

    info!(
        lots = report.lot_urls_found,
        total = report.total_urls_found,
        "sitemap discovery finished"
    );
    (candidates, report)
}

#[derive(Debug)]
struct SitemapEntry {
    loc: String,
    lastmod: Option<DateTime<Utc>>,
}

/// Pull `<url><loc>…</loc><lastmod>…</lastmod></url>` entries out of a
/// sitemap document.
fn parse_sitemap(xml: &[u8]) -> Result<Vec<SitemapEntry>, String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<(Option<String>, Option<String>)> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"url" => current = Some((None, None)),
                b"loc" => field = Some("loc"),
                b"lastmod" => field = Some("lastmod"),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(kind)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(|e| e.to_string())?.into_owned();
                    match kind {
                        "loc" => entry.0 = Some(text),
                        _ => entry.1 = Some(text),
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"loc" | b"lastmod" => field = None,
                b"url" => {
                    if let Some((Some(loc), lastmod)) = current.take() {
                        entries.push(SitemapEntry {
                            loc,
                            lastmod: lastmod.as_deref().and_then(parse_lastmod),
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err.to_string()),
        }
        buf.clear();
    }
    Ok(entries)
}

fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://www.leiloes.com.br/veiculos/carros</loc></url>
          <url>
            <loc>https://www.leiloes.com.br/lote/88/101</loc>
            <lastmod>2026-02-01</lastmod>
          </url>
          <url>
            <loc>https://www.leiloes.com.br/lote/88/102</loc>
            <lastmod>2026-02-02T08:00:00+00:00</lastmod>
          </url>
          <url><loc>https://www.leiloes.com.br/lote/90/1</loc></url>
          <url><loc>https://www.leiloes.com.br/institucional</loc></url>
        </urlset>"#;

    #[test]
    fn lot_urls_become_candidates() {
        let entries = parse_sitemap(SITEMAP.as_bytes()).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[1].loc, "https://www.leiloes.com.br/lote/88/101");
        assert!(entries[1].lastmod.is_some());
        assert!(entries[2].lastmod.is_some());
        assert!(entries[0].lastmod.is_none());
    }

    #[test]
    fn lot_pattern_and_categories_filter() {
        assert!(LOT_URL.is_match("https://x.com.br/lote/12/34"));
        assert!(!LOT_URL.is_match("https://x.com.br/leilao/12"));
        assert!(VEHICLE_CATEGORY.is_match("https://x.com.br/veiculos/carros"));
        assert!(VEHICLE_CATEGORY.is_match("https://x.com.br/diversos/sucatas"));
        assert!(!VEHICLE_CATEGORY.is_match("https://x.com.br/imoveis"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_sitemap(b"<urlset><url></loc></url>").is_err());
    }
}
