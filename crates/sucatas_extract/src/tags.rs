//! Keyword-based tag classification against the automotive taxonomy.

use crate::text::normalize_upper;
use regex::Regex;
use std::collections::BTreeMap;
use sucatas_protocol::defaults::TAG_SEM_CLASSIFICACAO;
use tracing::debug;

/// Vehicle manufacturer marks recognized for `objeto_resumido`.
const VEHICLE_BRANDS: &[&str] = &[
    "FIAT", "FORD", "CHEVROLET", "VOLKSWAGEN", "VW", "RENAULT", "HYUNDAI", "TOYOTA", "HONDA",
    "NISSAN", "YAMAHA", "SUZUKI", "IVECO", "MERCEDES", "SCANIA", "VOLVO", "AGRALE", "MARCOPOLO",
];

/// Tag → keyword table, loaded from the taxonomy table at startup with a
/// compiled-in automotive fallback. Keywords are matched on word
/// boundaries over accent-stripped uppercase text.
pub struct TagTaxonomy {
    matchers: Vec<(String, Regex)>,
}

impl TagTaxonomy {
    /// Build from `(tag, keyword)` rows. Empty input falls back to the
    /// built-in automotive taxonomy.
    pub fn from_rows(rows: &[(String, String)]) -> Self {
        if rows.is_empty() {
            debug!("taxonomy table empty, using built-in automotive taxonomy");
            return Self::default();
        }
        // Compare in accent-stripped space; the sentinel arrives both ways
        let sentinel = normalize_upper(TAG_SEM_CLASSIFICACAO);
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (tag, keyword) in rows {
            let tag = normalize_upper(tag);
            let keyword = normalize_upper(keyword);
            if tag.is_empty() || keyword.is_empty() || tag == sentinel {
                continue;
            }
            grouped.entry(tag).or_default().push(keyword);
        }
        Self::from_grouped(grouped)
    }

    fn from_grouped(grouped: BTreeMap<String, Vec<String>>) -> Self {
        let matchers = grouped
            .into_iter()
            .filter_map(|(tag, keywords)| {
                let alternation = keywords
                    .iter()
                    .map(|k| regex::escape(k))
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = format!(r"\b(?:{})\b", alternation);
                match Regex::new(&pattern) {
                    Ok(re) => Some((tag, re)),
                    Err(err) => {
                        debug!(%tag, %err, "skipping unbuildable taxonomy entry");
                        None
                    }
                }
            })
            .collect();
        Self { matchers }
    }

    /// Tags whose keyword table matches the text. Result is sorted,
    /// deduplicated and never contains the classification sentinel.
    pub fn classify(&self, text: &str) -> Vec<String> {
        let haystack = normalize_upper(text);
        let mut tags: Vec<String> = self
            .matchers
            .iter()
            .filter(|(_, re)| re.is_match(&haystack))
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }
}

impl Default for TagTaxonomy {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            ("VEICULO", &["VEICULO", "VEICULOS", "AUTOMOVEL", "AUTOMOVEIS", "CARRO", "CAMINHONETE", "PICAPE"]),
            ("SUCATA", &["SUCATA", "SUCATAS", "INSERVIVEL", "INSERVIVEIS"]),
            ("MOTO", &["MOTO", "MOTOS", "MOTOCICLETA", "MOTONETA", "CICLOMOTOR"]),
            ("CAMINHAO", &["CAMINHAO", "CAMINHOES"]),
            ("ONIBUS", &["ONIBUS", "MICROONIBUS", "MICRO-ONIBUS"]),
            ("CARRETA", &["CARRETA", "CARRETAS", "REBOQUE", "SEMIRREBOQUE", "SEMI-REBOQUE"]),
            ("MAQUINARIO", &["MAQUINARIO", "TRATOR", "TRATORES", "RETROESCAVADEIRA", "MOTONIVELADORA", "PA CARREGADEIRA"]),
            ("DOCUMENTADO", &["DOCUMENTADO", "DOCUMENTADA", "COM DOCUMENTACAO"]),
            ("APREENDIDO", &["APREENDIDO", "APREENDIDA", "APREENSAO", "PATIO"]),
        ];
        let grouped = table
            .iter()
            .map(|(tag, keywords)| {
                (
                    tag.to_string(),
                    keywords.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect();
        Self::from_grouped(grouped)
    }
}

/// Manufacturer marks found in the text, deduplicated and sorted, joined
/// by `", "`. Fallback source for `objeto_resumido`.
pub fn extract_vehicle_brands(text: &str) -> Option<String> {
    let haystack = normalize_upper(text);
    let mut found: Vec<&str> = VEHICLE_BRANDS
        .iter()
        .filter(|brand| {
            Regex::new(&format!(r"\b{}\b", regex::escape(brand)))
                .map(|re| re.is_match(&haystack))
                .unwrap_or(false)
        })
        .copied()
        .collect();
    found.sort_unstable();
    found.dedup();
    if found.is_empty() {
        None
    } else {
        Some(found.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_taxonomy_matches_accented_text() {
        let taxonomy = TagTaxonomy::default();
        let tags = taxonomy.classify("Leilão de veículos e sucatas, incluindo caminhão apreendido");
        assert_eq!(tags, vec!["APREENDIDO", "CAMINHAO", "SUCATA", "VEICULO"]);
    }

    #[test]
    fn keywords_match_on_word_boundaries() {
        let taxonomy = TagTaxonomy::default();
        // "motorista" must not trigger MOTO
        assert!(taxonomy.classify("contratação de motorista").is_empty());
        assert_eq!(taxonomy.classify("uma moto Honda"), vec!["MOTO"]);
    }

    #[test]
    fn db_rows_override_the_builtin_table() {
        let rows = vec![
            ("VEICULO".to_string(), "viatura".to_string()),
            ("SEM CLASSIFICAÇÃO".to_string(), "qualquer".to_string()),
        ];
        let taxonomy = TagTaxonomy::from_rows(&rows);
        assert_eq!(taxonomy.classify("Viatura baixada"), vec!["VEICULO"]);
        // The sentinel tag is never loadable
        assert!(taxonomy.classify("qualquer coisa").is_empty());
    }

    #[test]
    fn empty_rows_fall_back_to_builtin() {
        let taxonomy = TagTaxonomy::from_rows(&[]);
        assert_eq!(taxonomy.classify("sucata de ônibus"), vec!["ONIBUS", "SUCATA"]);
    }

    #[test]
    fn brand_extraction_dedupes_and_sorts() {
        let text = "01 FIAT UNO, 02 VW GOL, 03 Fiat Palio, 04 caminhão VOLVO";
        assert_eq!(
            extract_vehicle_brands(text).as_deref(),
            Some("FIAT, VOLVO, VW")
        );
        assert!(extract_vehicle_brands("mobiliário escolar").is_none());
    }
}
