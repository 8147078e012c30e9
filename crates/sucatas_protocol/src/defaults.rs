//! Canonical default values shared across the pipeline.

/// PNCP consultation search endpoint.
pub const PNCP_SEARCH_ENDPOINT: &str =
    "https://pncp.gov.br/api/consulta/v1/contratacoes/publicacao";
/// PNCP details endpoint template (`{cnpj}`, `{ano}`, `{seq}`).
pub const PNCP_DETAILS_TEMPLATE: &str =
    "https://pncp.gov.br/pncp-api/v1/orgaos/{cnpj}/compras/{ano}/{seq}";
/// PNCP attachment listing template (details prefix + `/arquivos`).
pub const PNCP_FILES_TEMPLATE: &str =
    "https://pncp.gov.br/pncp-api/v1/orgaos/{cnpj}/compras/{ano}/{seq}/arquivos";
/// Public notice page for a PNCP control number.
pub const PNCP_PUBLIC_URL_PREFIX: &str = "https://pncp.gov.br/app/editais/";

pub const DEFAULT_USER_AGENT: &str = "AcheSucatasMiner/1.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RATE_LIMIT_SECS: f64 = 0.6;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 0.5;
pub const DEFAULT_BACKOFF_CAP_SECS: f64 = 15.0;
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 8;
pub const DEFAULT_BREAKER_RESET_SECS: u64 = 60;

pub const DEFAULT_DIAS_RETROATIVOS: u32 = 1;
pub const DEFAULT_PAGINAS_POR_TERMO: u32 = 3;
pub const DEFAULT_TAMANHO_PAGINA: u32 = 20;
pub const DEFAULT_SEARCH_TERMS: &[&str] = &["leilão", "sucata", "veículo"];

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_PDF_PARSE_LIMIT_SECS: u64 = 60;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 50;

pub const DEFAULT_MAX_PRIMARY_ROWS: i64 = 10_000;
pub const DEFAULT_STORAGE_BUCKET: &str = "editais-pdfs";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Pipeline version tag stamped on every produced record and run row.
pub const VERSAO_MINER: &str = "rs-1.0.0";

/// The 27 Brazilian state codes.
pub const UF_CODES: &[&str] = &[
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Hostname suffixes accepted for auctioneer links, besides generic TLDs.
pub const ALLOWED_HOST_SUFFIXES: &[&str] = &[
    ".gov.br", ".org.br", ".com.br", ".net.br", ".net", ".leilao.br", ".com", ".org",
];

/// E-mail provider hosts that must never be stored as an auctioneer site.
pub const EMAIL_PROVIDER_HOSTS: &[&str] = &[
    "gmail.com", "hotmail.com", "outlook.com", "yahoo.com", "yahoo.com.br", "bol.com.br",
    "uol.com.br", "terra.com.br", "live.com", "icloud.com",
];

/// Tag sentinel stripped during normalization; never stored.
pub const TAG_SEM_CLASSIFICACAO: &str = "SEM CLASSIFICAÇÃO";

/// Automotive tag vocabulary. The taxonomy table can extend the keyword
/// lists, never the tag set itself.
pub const AUTOMOTIVE_TAGS: &[&str] = &[
    "VEICULO", "SUCATA", "MOTO", "CAMINHAO", "ONIBUS", "CARRETA", "MAQUINARIO", "DOCUMENTADO",
    "APREENDIDO",
];

pub fn is_known_uf(code: &str) -> bool {
    UF_CODES.contains(&code)
}
