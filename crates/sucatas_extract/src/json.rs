//! JSON metadata extractor for PNCP-style payloads.

use crate::money::parse_brl_amount;
use crate::text::{collapse_whitespace, repair_mojibake};
use crate::{dates, urls};
use rust_decimal::Decimal;
use serde_json::Value;
use sucatas_protocol::defaults::PNCP_PUBLIC_URL_PREFIX;

/// Keys that make a details call unnecessary when already populated in the
/// search payload.
const DETAIL_KEYS: &[&str] = &[
    "dataAberturaProposta",
    "valorTotalEstimado",
    "dataAtualizacao",
    "dataPublicacaoPncp",
    "numeroCompra",
];

/// Field candidates recovered from a source metadata payload. Everything
/// is optional; the cascade decides what survives.
#[derive(Debug, Clone, Default)]
pub struct JsonFields {
    pub numero_controle: Option<String>,
    pub cnpj: Option<String>,
    pub ano: Option<i64>,
    pub sequencial: Option<i64>,

    pub municipio: Option<String>,
    pub uf: Option<String>,
    pub ibge_code: Option<i64>,
    pub orgao: Option<String>,

    pub data_leilao: Option<String>,
    pub data_publicacao: Option<String>,
    pub data_atualizacao: Option<String>,

    pub titulo: Option<String>,
    pub descricao: Option<String>,
    pub n_edital: Option<String>,
    pub processo: Option<String>,
    pub modalidade: Option<String>,
    pub nome_leiloeiro: Option<String>,
    pub informacoes_complementares: Option<String>,

    pub valor_estimado: Option<Decimal>,
    pub quantidade_itens: Option<i64>,

    pub pncp_url: Option<String>,
}

/// True when the search payload is thin and the details endpoint must be
/// consulted before extraction.
pub fn needs_details(item: &Value) -> bool {
    DETAIL_KEYS.iter().any(|key| is_empty_value(item.get(*key)))
}

/// Merge a details payload under a search payload: only keys that are
/// empty in `base` are taken from `details`.
pub fn merge_details(base: &Value, details: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(obj), Some(detail_obj)) = (merged.as_object_mut(), details.as_object()) {
        for (key, value) in detail_obj {
            let current = obj.get(key);
            if is_empty_value(current) && !is_empty_value(Some(value)) {
                obj.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Extract all field candidates from one PNCP item.
pub fn extract_json(item: &Value) -> JsonFields {
    let numero_controle = get_str(item, "numeroControlePNCP")
        .or_else(|| get_str(item, "numeroControlePncp"));

    let orgao_entidade = item.get("orgaoEntidade");
    let unidade = item.get("unidadeOrgao");

    let cnpj = orgao_entidade
        .and_then(|o| get_str(o, "cnpj"))
        .map(|c| c.chars().filter(|ch| ch.is_ascii_digit()).collect::<String>())
        .filter(|c| !c.is_empty());

    let pncp_url = numero_controle
        .as_deref()
        .map(build_pncp_public_url)
        .or_else(|| {
            get_str(item, "linkSistemaOrigem")
                .or_else(|| get_str(item, "url"))
                .and_then(|link| urls::normalize_url(&link))
        });

    JsonFields {
        cnpj,
        ano: get_i64(item, "anoCompra"),
        sequencial: get_i64(item, "sequencialCompra"),
        municipio: unidade.and_then(|u| get_str(u, "municipioNome")),
        uf: unidade.and_then(|u| get_str(u, "ufSigla")).map(|s| s.to_uppercase()),
        ibge_code: unidade.and_then(|u| get_i64(u, "codigoIbge")),
        orgao: orgao_entidade.and_then(|o| get_str(o, "razaoSocial")),
        data_leilao: get_str(item, "dataAberturaProposta")
            .and_then(|s| dates::iso_to_dd_mm_yyyy(&s)),
        data_publicacao: get_str(item, "dataPublicacaoPncp")
            .and_then(|s| dates::iso_to_dd_mm_yyyy(&s)),
        data_atualizacao: get_str(item, "dataAtualizacao")
            .and_then(|s| dates::iso_to_dd_mm_yyyy(&s)),
        titulo: get_str(item, "objetoCompra").or_else(|| get_str(item, "titulo")),
        descricao: get_str(item, "informacoesComplementares").filter(|s| s.len() >= 20),
        n_edital: get_str(item, "numeroCompra")
            .or_else(|| numero_controle.clone())
            .or_else(|| get_str(item, "processo")),
        processo: get_str(item, "processo"),
        modalidade: get_str(item, "modalidadeNome"),
        nome_leiloeiro: get_str(item, "nomeResponsavel"),
        informacoes_complementares: get_str(item, "informacoesComplementares"),
        valor_estimado: parse_valor(item.get("valorTotalEstimado")),
        quantidade_itens: item
            .get("itens")
            .and_then(|v| v.as_array())
            .map(|a| a.len() as i64)
            .filter(|n| *n > 0),
        pncp_url,
        numero_controle,
    }
}

/// Public notice page for a PNCP control number.
pub fn build_pncp_public_url(numero_controle: &str) -> String {
    format!("{}{}", PNCP_PUBLIC_URL_PREFIX, numero_controle.trim())
}

fn parse_valor(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => {
            let parsed = Decimal::try_from(n.as_f64()?).ok()?;
            if parsed > Decimal::ZERO {
                Some(parsed.round_dp(2))
            } else {
                None
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            // Sources emit either `50000.00` or `50.000,00`
            if s.contains(',') {
                parse_brl_amount(s)
            } else {
                s.parse::<Decimal>().ok().filter(|d| *d > Decimal::ZERO)
            }
        }
        _ => None,
    }
}

fn get_str(value: &Value, key: &str) -> Option<String> {
    let raw = value.get(key)?.as_str()?;
    let cleaned = collapse_whitespace(&repair_mojibake(raw));
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn get_i64(value: &Value, key: &str) -> Option<i64> {
    let v = value.get(key)?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn pncp_item() -> Value {
        json!({
            "numeroControlePNCP": "00038000000120-1-000123/2026",
            "anoCompra": 2026,
            "sequencialCompra": 123,
            "numeroCompra": "12/2026",
            "processo": "PROC-443",
            "modalidadeNome": "Leilão - Eletrônico",
            "dataAberturaProposta": "2026-02-15T10:00:00",
            "dataPublicacaoPncp": "2026-01-20T08:30:00",
            "dataAtualizacao": "2026-01-25T12:00:00",
            "valorTotalEstimado": 50000.00,
            "objetoCompra": "Leilão de veículos inservíveis",
            "nomeResponsavel": "Carlos Pereira",
            "itens": [{}, {}, {}],
            "orgaoEntidade": {
                "cnpj": "00.038.000/0001-20",
                "razaoSocial": "Prefeitura Municipal de Campinas"
            },
            "unidadeOrgao": {
                "municipioNome": "Campinas",
                "ufSigla": "sp",
                "codigoIbge": 3509502
            }
        })
    }

    #[test]
    fn extracts_the_full_field_set() {
        let fields = extract_json(&pncp_item());
        assert_eq!(fields.numero_controle.as_deref(), Some("00038000000120-1-000123/2026"));
        assert_eq!(fields.cnpj.as_deref(), Some("00038000000120"));
        assert_eq!(fields.ano, Some(2026));
        assert_eq!(fields.sequencial, Some(123));
        assert_eq!(fields.municipio.as_deref(), Some("Campinas"));
        assert_eq!(fields.uf.as_deref(), Some("SP"));
        assert_eq!(fields.ibge_code, Some(3509502));
        assert_eq!(fields.data_leilao.as_deref(), Some("15-02-2026"));
        assert_eq!(fields.data_publicacao.as_deref(), Some("20-01-2026"));
        assert_eq!(fields.data_atualizacao.as_deref(), Some("25-01-2026"));
        assert_eq!(fields.quantidade_itens, Some(3));
        assert_eq!(fields.n_edital.as_deref(), Some("12/2026"));
        assert_eq!(fields.nome_leiloeiro.as_deref(), Some("Carlos Pereira"));
        assert_eq!(
            fields.valor_estimado,
            Some(Decimal::from_str("50000.00").unwrap())
        );
        assert_eq!(
            fields.pncp_url.as_deref(),
            Some("https://pncp.gov.br/app/editais/00038000000120-1-000123/2026")
        );
    }

    #[test]
    fn thin_payload_requires_details() {
        assert!(!needs_details(&pncp_item()));
        let mut thin = pncp_item();
        thin["dataAberturaProposta"] = Value::Null;
        assert!(needs_details(&thin));
        let mut zero = pncp_item();
        zero["valorTotalEstimado"] = json!(0);
        assert!(needs_details(&zero));
    }

    #[test]
    fn details_merge_fills_only_gaps() {
        let mut base = pncp_item();
        base["dataAberturaProposta"] = Value::Null;
        base["objetoCompra"] = json!("Objeto da busca");
        let details = json!({
            "dataAberturaProposta": "2026-03-01T09:00:00",
            "objetoCompra": "Objeto detalhado que NÃO deve vencer",
        });
        let merged = merge_details(&base, &details);
        assert_eq!(merged["dataAberturaProposta"], "2026-03-01T09:00:00");
        assert_eq!(merged["objetoCompra"], "Objeto da busca");
    }

    #[test]
    fn mojibake_strings_are_repaired() {
        let item = json!({
            "objetoCompra": "LeilÃ£o de veÃ­culos",
            "unidadeOrgao": {"municipioNome": "SÃ£o JosÃ©", "ufSigla": "SC"}
        });
        let fields = extract_json(&item);
        assert_eq!(fields.titulo.as_deref(), Some("Leilão de veículos"));
        assert_eq!(fields.municipio.as_deref(), Some("São José"));
    }

    #[test]
    fn string_valor_formats_both_parse() {
        let ptbr = extract_json(&json!({"valorTotalEstimado": "50.000,00"}));
        assert_eq!(ptbr.valor_estimado, Some(Decimal::from_str("50000.00").unwrap()));
        let plain = extract_json(&json!({"valorTotalEstimado": "1234.5"}));
        assert_eq!(plain.valor_estimado, Some(Decimal::from_str("1234.5").unwrap()));
        let none = extract_json(&json!({"valorTotalEstimado": null}));
        assert!(none.valor_estimado.is_none());
    }

    #[test]
    fn missing_itens_yield_no_count() {
        let fields = extract_json(&json!({"itens": []}));
        assert!(fields.quantidade_itens.is_none());
    }
}
