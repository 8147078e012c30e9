//! Per-field cascade resolution.
//!
//! Candidates arrive from the JSON metadata, the main PDF, spreadsheets and
//! DOCX attachments; for every target field the first non-empty candidate in
//! the documented priority order wins. The regex table is built once at
//! startup and shared.

use crate::json::{extract_json, JsonFields};
use crate::pdf::PdfText;
use crate::sheet::SheetCell;
use crate::tags::{extract_vehicle_brands, TagTaxonomy};
use crate::text::{collapse_whitespace, first_non_empty_lines, normalize_upper, truncate_with_ellipsis};
use crate::{archive, dates, docx, money, pdf, sheet, urls};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use sucatas_protocol::defaults::is_known_uf;
use sucatas_protocol::{AuctionRecord, DocumentKind, TipoLeilao, ValidationError};
use tracing::debug;

/// Window searched after a date-context keyword.
const CONTEXT_WINDOW: usize = 80;

/// Cap applied to `objeto_resumido` built from the title.
const OBJETO_RESUMIDO_MAX: usize = 120;

/// Named patterns driving the heuristic extractors. Compiled once at
/// startup; the field cascade consults them instead of inlining regexes.
pub struct RegexTable {
    pub date_context: Regex,
    pub lote_line: Regex,
    pub item_line: Regex,
    pub leiloeiro_nome: Regex,
    pub tipo_eletronico: Regex,
    pub tipo_presencial: Regex,
    pub titulo_boilerplate: Regex,
    pub municipio_uf: Regex,
}

impl Default for RegexTable {
    fn default() -> Self {
        Self {
            date_context: Regex::new(
                r"(?i)data\s+de\s+abertura|abertura\s+da\s+sess[ãa]o|sess[ãa]o\s+p[úu]blica|realiza[çc][ãa]o",
            )
            .expect("date context regex"),
            lote_line: Regex::new(r"(?im)^\s*LOTE\s*\d+").expect("lote regex"),
            item_line: Regex::new(r"(?im)^\s*ITEM\s*\d+").expect("item regex"),
            leiloeiro_nome: Regex::new(
                r"(?i)leiloeir[oa](?:\s+oficial|\s+p[úu]blic[oa])?\s*[:\s]\s*([A-ZÀ-Ú][\wà-ÿ]+(?:\s+(?:d[aeo]s?\s+)?[A-ZÀ-Ú][\wà-ÿ]+){1,4})",
            )
            .expect("leiloeiro regex"),
            tipo_eletronico: Regex::new(r"\b(ELETRONICO|ONLINE|VIRTUAL)\b").expect("tipo regex"),
            tipo_presencial: Regex::new(r"\bPRESENCIAL\b").expect("tipo regex"),
            titulo_boilerplate: Regex::new(
                r"(?i)^(estado\s+d|prefeitura|munic[íi]pio\s+d|secretaria|p[áa]gina\s+\d|diário\s+oficial|cnpj)",
            )
            .expect("boilerplate regex"),
            municipio_uf: Regex::new(
                r"(?m)([A-ZÀ-Ú][A-Za-zÀ-ÿ]+(?:\s+(?:d[aeo]s?\s+)?[A-ZÀ-Ú][A-Za-zÀ-ÿ]+)*)\s*[/–-]\s*([A-Z]{2})\b",
            )
            .expect("municipio/uf regex"),
        }
    }
}

/// All extraction candidates gathered for one candidate notice.
#[derive(Default)]
pub struct ExtractionBundle {
    pub json: JsonFields,
    pub raw_url: Option<String>,
    pub pdf: Option<PdfText>,
    pub cells: Vec<SheetCell>,
    pub docx_text: Option<String>,
    pub errors: Vec<ValidationError>,
}

impl ExtractionBundle {
    /// Seed the bundle from the source metadata payload.
    pub fn from_metadata(metadata: &Value, raw_url: Option<String>) -> Self {
        Self {
            json: extract_json(metadata),
            raw_url,
            ..Default::default()
        }
    }

    /// Run the format extractor for one document, accumulating candidates.
    /// Failures become structured entries; they never abort the candidate.
    /// ZIPs are expanded exactly one level; nested archives are ignored.
    pub fn ingest_document(&mut self, kind: DocumentKind, name: &str, bytes: &[u8]) {
        match kind {
            DocumentKind::Pdf => match pdf::extract_pdf(bytes) {
                Ok(parsed) => {
                    if self.pdf.is_none() {
                        self.pdf = Some(parsed);
                    }
                }
                Err(err) => self.errors.push(err.to_validation_error(name)),
            },
            DocumentKind::Xlsx | DocumentKind::Xls => match sheet::extract_sheet(bytes) {
                Ok(cells) => self.cells.extend(cells),
                Err(err) => self.errors.push(err.to_validation_error(name)),
            },
            DocumentKind::Csv => match sheet::extract_csv(bytes) {
                Ok(cells) => self.cells.extend(cells),
                Err(err) => self.errors.push(err.to_validation_error(name)),
            },
            DocumentKind::Docx => match docx::extract_docx(bytes) {
                Ok(text) => {
                    let merged = match self.docx_text.take() {
                        Some(existing) => format!("{}\n{}", existing, text),
                        None => text,
                    };
                    self.docx_text = Some(merged);
                }
                Err(err) => self.errors.push(err.to_validation_error(name)),
            },
            DocumentKind::Zip => match archive::expand_zip(bytes) {
                Ok(entries) => {
                    for (entry_name, entry_bytes) in entries {
                        let entry_kind = DocumentKind::detect(None, &entry_bytes);
                        if entry_kind == DocumentKind::Zip {
                            debug!(%entry_name, "nested archive ignored");
                            continue;
                        }
                        self.ingest_document(entry_kind, &entry_name, &entry_bytes);
                    }
                }
                Err(err) => self.errors.push(err.to_validation_error(name)),
            },
            DocumentKind::Json | DocumentKind::Unknown => {}
        }
    }

    /// PDF text if any, otherwise DOCX text.
    fn primary_text(&self) -> Option<&str> {
        self.pdf
            .as_ref()
            .map(|p| p.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .or(self.docx_text.as_deref())
    }

    /// Concatenation used for keyword scans.
    fn keyword_pool(&self) -> String {
        let mut pool = String::new();
        if let Some(titulo) = &self.json.titulo {
            pool.push_str(titulo);
            pool.push('\n');
        }
        if let Some(descricao) = &self.json.descricao {
            pool.push_str(descricao);
            pool.push('\n');
        }
        if let Some(pdf) = &self.pdf {
            pool.push_str(&pdf.text);
            pool.push('\n');
        }
        if let Some(docx_text) = &self.docx_text {
            pool.push_str(docx_text);
        }
        pool
    }
}

/// The deterministic field resolver.
pub struct Cascade {
    rules: RegexTable,
    taxonomy: TagTaxonomy,
    /// Auctioneer hostnames accepted regardless of TLD heuristics.
    whitelist: HashSet<String>,
}

impl Cascade {
    pub fn new(taxonomy: TagTaxonomy, whitelist: HashSet<String>) -> Self {
        Self {
            rules: RegexTable::default(),
            taxonomy,
            whitelist,
        }
    }

    /// Fill a seeded record from the bundle, field by field, first
    /// non-empty candidate wins.
    pub fn resolve(&self, record: &mut AuctionRecord, bundle: &ExtractionBundle) {
        let json = &bundle.json;
        let text = bundle.primary_text().unwrap_or("");
        let upper_pool = normalize_upper(&bundle.keyword_pool());

        self.resolve_geography(record, bundle, text);

        // data_leilao: JSON → sheet data columns → contextual PDF date →
        // any PDF date in the current year or later → long-form date
        record.data_leilao = json
            .data_leilao
            .clone()
            .or_else(|| self.date_from_cells(&bundle.cells))
            .or_else(|| dates::find_contextual_date(text, &self.rules.date_context, CONTEXT_WINDOW))
            .or_else(|| dates::find_numeric_date(text, dates::current_year()))
            .or_else(|| dates::find_long_form_date(text));

        // Publication/update timestamps come from the source metadata only;
        // guessing them from documents produces audit gaps.
        record.data_publicacao = json.data_publicacao.clone();
        record.data_atualizacao = json.data_atualizacao.clone();

        record.valor_estimado = json
            .valor_estimado
            .or_else(|| money::find_estimated_value(text));

        record.quantidade_itens = json.quantidade_itens.or_else(|| {
            let lotes = self.rules.lote_line.find_iter(text).count() as i64;
            if lotes > 0 {
                return Some(lotes);
            }
            let items = self.rules.item_line.find_iter(text).count() as i64;
            (items > 0).then_some(items)
        });

        record.titulo = json
            .titulo
            .clone()
            .or_else(|| self.first_significant_line(text));

        record.descricao = json
            .descricao
            .clone()
            .or_else(|| first_non_empty_lines(text, 3));

        record.tipo_leilao = self.infer_tipo_leilao(&upper_pool);

        record.nome_leiloeiro = json.nome_leiloeiro.clone().or_else(|| {
            self.rules
                .leiloeiro_nome
                .captures(text)
                .map(|caps| collapse_whitespace(&caps[1]))
        });

        self.resolve_leiloeiro_url(record, bundle, text);

        record.tags = self.taxonomy.classify(&bundle.keyword_pool());

        record.objeto_resumido = json
            .objeto_resumido_hint()
            .or_else(|| extract_vehicle_brands(&bundle.keyword_pool()))
            .or_else(|| {
                record
                    .titulo
                    .as_deref()
                    .map(|t| truncate_with_ellipsis(t, OBJETO_RESUMIDO_MAX))
            });

        record.orgao = json.orgao.clone();
        record.n_edital = json.n_edital.clone();
        record.modalidade = json.modalidade.clone();
        record.pncp_url = json.pncp_url.clone();
        record.ibge_code = json.ibge_code;

        record.extraction_errors.extend(bundle.errors.iter().cloned());
        if bundle.pdf.as_ref().map(|p| p.scanned_image).unwrap_or(false) {
            debug!(id = %record.id_interno, "main PDF has no text layer");
        }
    }

    fn resolve_geography(&self, record: &mut AuctionRecord, bundle: &ExtractionBundle, text: &str) {
        let (mut municipio, mut uf) = (bundle.json.municipio.clone(), bundle.json.uf.clone());

        if municipio.is_none() || uf.is_none() {
            if let Some((path_municipio, path_uf)) = bundle
                .raw_url
                .as_deref()
                .and_then(municipio_uf_from_url_path)
            {
                municipio.get_or_insert(path_municipio);
                uf.get_or_insert(path_uf);
            }
        }

        if municipio.is_none() || uf.is_none() {
            if let Some(caps) = self.rules.municipio_uf.captures(text) {
                let candidate_uf = caps[2].to_string();
                if is_known_uf(&candidate_uf) {
                    municipio.get_or_insert_with(|| collapse_whitespace(&caps[1]));
                    uf.get_or_insert(candidate_uf);
                }
            }
        }

        if municipio.is_none() || uf.is_none() {
            for cell in &bundle.cells {
                if let Some(caps) = self.rules.municipio_uf.captures(&cell.value) {
                    let candidate_uf = caps[2].to_string();
                    if is_known_uf(&candidate_uf) {
                        municipio.get_or_insert_with(|| collapse_whitespace(&caps[1]));
                        uf.get_or_insert(candidate_uf);
                        break;
                    }
                }
            }
        }

        record.municipio = municipio;
        record.uf = uf;
    }

    fn date_from_cells(&self, cells: &[SheetCell]) -> Option<String> {
        cells
            .iter()
            .filter(|cell| cell.header.starts_with("DATA") || cell.header.contains("ABERTURA"))
            .find_map(|cell| {
                dates::find_numeric_date(&cell.value, 1900)
                    .or_else(|| dates::iso_to_dd_mm_yyyy(&cell.value))
            })
    }

    fn first_significant_line(&self, text: &str) -> Option<String> {
        text.lines()
            .map(collapse_whitespace)
            .filter(|line| line.chars().count() >= 15)
            .find(|line| !self.rules.titulo_boilerplate.is_match(line))
    }

    fn infer_tipo_leilao(&self, upper_pool: &str) -> Option<TipoLeilao> {
        let eletronico = self.rules.tipo_eletronico.is_match(upper_pool);
        let presencial = self.rules.tipo_presencial.is_match(upper_pool);
        match (eletronico, presencial) {
            (true, true) => Some(TipoLeilao::Hibrido),
            (true, false) => Some(TipoLeilao::Eletronico),
            (false, true) => Some(TipoLeilao::Presencial),
            // No keyword evidence: null is preserved, never defaulted
            (false, false) => None,
        }
    }

    fn resolve_leiloeiro_url(
        &self,
        record: &mut AuctionRecord,
        bundle: &ExtractionBundle,
        text: &str,
    ) {
        record.leiloeiro_url_valid = true;

        if let Some(url) = urls::find_first_url(text) {
            record.leiloeiro_url = Some(url);
            return;
        }

        // Whitelisted hosts are trusted even when the TLD heuristics would
        // not pick them up.
        let lower_text = text.to_lowercase();
        for host in &self.whitelist {
            if lower_text.contains(host.as_str()) {
                record.leiloeiro_url = Some(format!("https://{}", host));
                return;
            }
        }

        if let Some(info) = &bundle.json.informacoes_complementares {
            let scan = urls::scan_complementary_info(info);
            if let Some(url) = scan.url {
                record.leiloeiro_url = Some(url);
            } else if scan.word_not_url {
                record.leiloeiro_url = None;
                record.leiloeiro_url_valid = false;
            }
        }
    }
}

impl JsonFields {
    /// A short object summary straight from the metadata, when the source
    /// already provides one small enough.
    fn objeto_resumido_hint(&self) -> Option<String> {
        self.titulo
            .as_deref()
            .filter(|t| t.chars().count() <= OBJETO_RESUMIDO_MAX)
            .map(|t| t.to_string())
    }
}

/// `/leilao-campo-grande-ms/...` style paths carry the geography for
/// sitemap sources.
fn municipio_uf_from_url_path(raw_url: &str) -> Option<(String, String)> {
    let path = raw_url.split("://").nth(1)?.split_once('/')?.1;
    for segment in path.split('/') {
        let tokens: Vec<&str> = segment.split('-').filter(|t| !t.is_empty()).collect();
        if tokens.len() < 2 {
            continue;
        }
        let last = tokens.last()?.to_uppercase();
        if !is_known_uf(&last) {
            continue;
        }
        let city_tokens: Vec<String> = tokens[..tokens.len() - 1]
            .iter()
            .filter(|t| t.chars().all(char::is_alphabetic))
            .filter(|t| !matches!(t.to_lowercase().as_str(), "leilao" | "leiloes" | "lote" | "edital"))
            .map(|t| title_case(t))
            .collect();
        if city_tokens.is_empty() {
            continue;
        }
        return Some((city_tokens.join(" "), last));
    }
    None
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use sucatas_protocol::SourceName;

    fn seeded() -> AuctionRecord {
        AuctionRecord::seed(SourceName::Pncp, "ctrl-1", "test")
    }

    fn bundle_with_text(metadata: Value, text: &str) -> ExtractionBundle {
        let mut bundle = ExtractionBundle::from_metadata(&metadata, None);
        bundle.pdf = Some(PdfText {
            text: text.to_string(),
            page_offsets: vec![(1, 0)],
            page_count: 1,
            scanned_image: false,
        });
        bundle
    }

    fn cascade() -> Cascade {
        Cascade::new(TagTaxonomy::default(), HashSet::new())
    }

    #[test]
    fn json_beats_pdf_for_data_leilao() {
        let bundle = bundle_with_text(
            json!({"dataAberturaProposta": "2026-02-15T10:00:00"}),
            "DATA DE ABERTURA: 01/03/2030",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.data_leilao.as_deref(), Some("15-02-2026"));
    }

    #[test]
    fn contextual_pdf_date_beats_any_date() {
        let text = "Publicado no dia 02/01/2026.\nABERTURA DA SESSÃO PÚBLICA: 20/08/2026 às 10h";
        let bundle = bundle_with_text(json!({}), text);
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.data_leilao.as_deref(), Some("20-08-2026"));
    }

    #[test]
    fn sheet_dates_beat_pdf_dates() {
        let mut bundle = bundle_with_text(json!({}), "REALIZAÇÃO: 01/12/2026");
        bundle.cells.push(SheetCell {
            header: "DATA DO LEILAO".to_string(),
            value: "10/11/2026".to_string(),
        });
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.data_leilao.as_deref(), Some("10-11-2026"));
    }

    #[test]
    fn publicacao_never_comes_from_pdf() {
        let bundle = bundle_with_text(json!({}), "Publicado em 05/01/2026");
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert!(record.data_publicacao.is_none());
        assert!(record.data_atualizacao.is_none());
    }

    #[test]
    fn valor_falls_back_to_pdf_money() {
        let bundle = bundle_with_text(
            json!({}),
            "VALOR TOTAL ESTIMADO: R$ 123.456,78 conforme anexo",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(
            record.valor_estimado,
            Some(Decimal::from_str("123456.78").unwrap())
        );
    }

    #[test]
    fn lote_count_beats_item_count() {
        let text = "LOTE 1 - carro\nLOTE 2 - moto\nITEM 1\nITEM 2\nITEM 3";
        let bundle = bundle_with_text(json!({}), text);
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.quantidade_itens, Some(2));
    }

    #[test]
    fn titulo_skips_header_boilerplate() {
        let text = "ESTADO DO RIO GRANDE DO SUL\nPREFEITURA MUNICIPAL DE PELOTAS\nEDITAL DE LEILÃO PÚBLICO N 04/2026 DE VEÍCULOS INSERVÍVEIS\nmais texto";
        let bundle = bundle_with_text(json!({}), text);
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(
            record.titulo.as_deref(),
            Some("EDITAL DE LEILÃO PÚBLICO N 04/2026 DE VEÍCULOS INSERVÍVEIS")
        );
    }

    #[test]
    fn tipo_leilao_requires_keyword_evidence() {
        let both = bundle_with_text(json!({}), "leilão ELETRÔNICO e PRESENCIAL");
        let mut record = seeded();
        cascade().resolve(&mut record, &both);
        assert_eq!(record.tipo_leilao, Some(TipoLeilao::Hibrido));

        let online = bundle_with_text(json!({}), "sessão exclusivamente ONLINE");
        let mut record = seeded();
        cascade().resolve(&mut record, &online);
        assert_eq!(record.tipo_leilao, Some(TipoLeilao::Eletronico));

        let silent = bundle_with_text(json!({}), "leilão de sucatas do município");
        let mut record = seeded();
        cascade().resolve(&mut record, &silent);
        assert_eq!(record.tipo_leilao, None);
    }

    #[test]
    fn leiloeiro_nome_from_pdf_regex() {
        let bundle = bundle_with_text(
            json!({}),
            "Leiloeiro Oficial: João Carlos da Silva, matrícula 123",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.nome_leiloeiro.as_deref(), Some("João Carlos da Silva"));
    }

    #[test]
    fn comemora_word_yields_no_url_and_record_survives() {
        // Scenario D: PDF has ED.COMEMORA and no other URL
        let bundle = bundle_with_text(json!({}), "conforme ED.COMEMORA e demais anexos");
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert!(record.leiloeiro_url.is_none());
        assert!(record.leiloeiro_url_valid);
    }

    #[test]
    fn complementary_word_url_flags_invalid() {
        let bundle = bundle_with_text(
            json!({"informacoesComplementares": "COMEMORA"}),
            "sem urls aqui",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert!(record.leiloeiro_url.is_none());
        assert!(!record.leiloeiro_url_valid);
    }

    #[test]
    fn whitelist_host_is_accepted_from_text() {
        let mut whitelist = HashSet::new();
        whitelist.insert("leiloesespeciais.xyz".to_string());
        let cascade = Cascade::new(TagTaxonomy::default(), whitelist);
        let bundle = bundle_with_text(
            json!({}),
            "lances exclusivamente em leiloesespeciais.xyz a partir de 10h",
        );
        let mut record = seeded();
        cascade.resolve(&mut record, &bundle);
        assert_eq!(
            record.leiloeiro_url.as_deref(),
            Some("https://leiloesespeciais.xyz")
        );
    }

    #[test]
    fn geography_cascades_from_url_path() {
        let mut bundle = ExtractionBundle::from_metadata(&json!({}), Some(
            "https://www.leiloesjudiciais.com.br/leilao-campo-grande-ms/lote/88/1".to_string(),
        ));
        bundle.pdf = None;
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.municipio.as_deref(), Some("Campo Grande"));
        assert_eq!(record.uf.as_deref(), Some("MS"));
    }

    #[test]
    fn geography_falls_back_to_pdf_pattern() {
        let bundle = bundle_with_text(json!({}), "Leilão público em Pelotas/RS, edital 4");
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.municipio.as_deref(), Some("Pelotas"));
        assert_eq!(record.uf.as_deref(), Some("RS"));
    }

    #[test]
    fn tags_come_from_the_keyword_pool() {
        let bundle = bundle_with_text(
            json!({"objetoCompra": "Leilão de veículos"}),
            "LOTE 1 sucata de caminhão",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.tags, vec!["CAMINHAO", "SUCATA", "VEICULO"]);
    }

    #[test]
    fn objeto_resumido_prefers_brands_over_title_cut() {
        let bundle = bundle_with_text(
            json!({"objetoCompra": format!("Leilão {}", "x".repeat(150))}),
            "LOTE 1 FIAT Uno; LOTE 2 VW Gol",
        );
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.objeto_resumido.as_deref(), Some("FIAT, VW"));
    }

    #[test]
    fn zip_ingestion_feeds_nested_extractors() {
        let csv_body = b"data do leilao;valor\n15/02/2026;1.000,00\n";
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            use std::io::Write;
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("lotes.csv", options).unwrap();
            writer.write_all(csv_body).unwrap();
            writer.finish().unwrap();
        }
        let mut bundle = ExtractionBundle::from_metadata(&json!({}), None);
        bundle.ingest_document(DocumentKind::Zip, "anexos.zip", &cursor.into_inner());
        assert!(bundle
            .cells
            .iter()
            .any(|c| c.header == "DATA DO LEILAO" && c.value == "15/02/2026"));
    }

    #[test]
    fn extraction_failures_are_carried_not_fatal() {
        let mut bundle = ExtractionBundle::from_metadata(&json!({}), None);
        bundle.ingest_document(DocumentKind::Pdf, "broken.pdf", b"not a pdf");
        assert_eq!(bundle.errors.len(), 1);
        let mut record = seeded();
        cascade().resolve(&mut record, &bundle);
        assert_eq!(record.extraction_errors.len(), 1);
    }
}
