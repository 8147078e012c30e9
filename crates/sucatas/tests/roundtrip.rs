//! End-to-end record shaping: raw PNCP item → extraction bundle → cascade
//! → validator, without network or datastore.

use serde_json::json;
use std::collections::HashSet;
use sucatas_extract::{Cascade, ExtractionBundle, TagTaxonomy};
use sucatas_protocol::{AuctionRecord, RecordStatus, SourceName};
use sucatas_validate::validate_record;

fn pncp_item(data_abertura: Option<&str>) -> serde_json::Value {
    json!({
        "numeroControlePNCP": "00038000000120-1-000123/2026",
        "anoCompra": 2026,
        "sequencialCompra": 123,
        "numeroCompra": "12/2026",
        "processo": "PROC-443",
        "modalidadeNome": "Leilão - Eletrônico",
        "dataAberturaProposta": data_abertura,
        "dataPublicacaoPncp": "2026-01-20T08:30:00",
        "dataAtualizacao": "2026-01-25T12:00:00",
        "valorTotalEstimado": 50000.00,
        "objetoCompra": "Leilão de veículos inservíveis e sucatas",
        "itens": [{}, {}],
        "orgaoEntidade": {
            "cnpj": "00.038.000/0001-20",
            "razaoSocial": "Prefeitura Municipal de Campinas"
        },
        "unidadeOrgao": {
            "municipioNome": "Campinas",
            "ufSigla": "SP",
            "codigoIbge": 3509502
        }
    })
}

const PDF_TEXT: &str = "EDITAL DE LEILÃO ELETRÔNICO N 12/2026 DE VEÍCULOS E SUCATAS\n\
    A Prefeitura Municipal de Campinas torna público o leilão de veículos.\n\
    LOTE 1 - FIAT Uno 2008\n\
    LOTE 2 - VW Gol 2010\n\
    Leiloeiro Oficial: Marcos Antonio Silva\n";

fn resolve(item: &serde_json::Value) -> AuctionRecord {
    let external_id = item["numeroControlePNCP"].as_str().unwrap();
    let mut bundle = ExtractionBundle::from_metadata(item, None);
    bundle.pdf = Some(sucatas_extract::PdfText {
        text: PDF_TEXT.to_string(),
        page_offsets: vec![(1, 0)],
        page_count: 1,
        scanned_image: false,
    });
    let cascade = Cascade::new(TagTaxonomy::default(), HashSet::new());
    let mut record = AuctionRecord::seed(SourceName::Pncp, external_id, "rs-test");
    cascade.resolve(&mut record, &bundle);
    record
}

#[test]
fn complete_item_round_trips_to_valid() {
    // Scenario A
    let item = pncp_item(Some("2026-02-15T10:00:00"));
    let record = resolve(&item);

    // Identity survives the whole chain
    assert_eq!(record.source_external_id, item["numeroControlePNCP"].as_str().unwrap());

    let result = validate_record(&record);
    assert_eq!(result.status, RecordStatus::Valid, "errors: {:?}", result.errors);
    let normalized = &result.normalized_record;
    assert_eq!(normalized.data_leilao.as_deref(), Some("15-02-2026"));
    assert_eq!(normalized.data_publicacao.as_deref(), Some("20-01-2026"));
    assert_eq!(normalized.uf.as_deref(), Some("SP"));
    assert!(normalized
        .pncp_url
        .as_deref()
        .unwrap()
        .starts_with("https://pncp.gov.br/app/editais/"));
    assert!(!normalized.tags.is_empty());
    assert!(normalized.tags.iter().all(|t| t != "SEM CLASSIFICAÇÃO"));
    assert_eq!(normalized.quantidade_itens, Some(2));
    assert_eq!(normalized.nome_leiloeiro.as_deref(), Some("Marcos Antonio Silva"));
}

#[test]
fn missing_auction_date_routes_to_not_sellable() {
    // Scenario B: dataAberturaProposta null, value present; the PDF here
    // carries no usable date either.
    let item = pncp_item(None);
    let mut bundle = ExtractionBundle::from_metadata(&item, None);
    bundle.pdf = Some(sucatas_extract::PdfText {
        text: "EDITAL DE LEILÃO ELETRÔNICO DE VEÍCULOS E SUCATAS DO MUNICÍPIO\nsem datas no corpo".to_string(),
        page_offsets: vec![(1, 0)],
        page_count: 1,
        scanned_image: false,
    });
    let cascade = Cascade::new(TagTaxonomy::default(), HashSet::new());
    let mut record = AuctionRecord::seed(SourceName::Pncp, "00038000000120-1-000123/2026", "rs-test");
    cascade.resolve(&mut record, &bundle);

    let result = validate_record(&record);
    assert_eq!(result.status, RecordStatus::NotSellable, "errors: {:?}", result.errors);

    let hard_errors: Vec<_> = result
        .errors
        .iter()
        .filter(|e| !e.code.is_notice())
        .collect();
    assert_eq!(hard_errors.len(), 1);
    assert_eq!(hard_errors[0].field, "data_leilao");

    // Exactly one quarantine row would be produced for it
    let rejection = result.to_rejection("run-b", &record);
    assert_eq!(rejection.status, RecordStatus::NotSellable);
    assert!(!rejection.errors.is_empty());
}

#[test]
fn identical_items_share_one_identity() {
    // Duplicate listings collapse onto a single id_interno
    let a = resolve(&pncp_item(Some("2026-02-15T10:00:00")));
    let b = resolve(&pncp_item(Some("2026-02-15T10:00:00")));
    assert_eq!(a.id_interno, b.id_interno);
}
