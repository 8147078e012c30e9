//! URL normalization and auctioneer-link extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use sucatas_protocol::defaults::{ALLOWED_HOST_SUFFIXES, EMAIL_PROVIDER_HOSTS};
use url::Url;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', '>', '"', '\''];

static URL_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(https?://[^\s)>\]"']+|www\.[^\s)>\]"']+)"#).expect("url candidate regex")
});

static BARE_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}(/|$)").expect("bare hostname regex")
});

static LONE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-zÀ-ÿ.]+$").expect("lone word regex"));

/// Outcome of the looser `informacoes_complementares` URL scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlScan {
    pub url: Option<String>,
    /// The best candidate was a bare word masquerading as a URL.
    pub word_not_url: bool,
}

/// A token that reads as a word rather than a link: letters and dots only,
/// no scheme, no real TLD behind the final dot.
pub fn looks_like_word_not_url(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.contains("://") || trimmed.to_lowercase().starts_with("www.") {
        return false;
    }
    if !LONE_WORD.is_match(trimmed) {
        return false;
    }
    let host = trimmed.to_lowercase();
    !ALLOWED_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

/// Apply the canonical URL normalization rules. Returns `None` when the
/// input cannot be read as an absolute HTTP(S) URL with a dotted host.
pub fn normalize_url(value: &str) -> Option<String> {
    let joined: String = value.trim().split_whitespace().collect();
    let mut raw = joined.trim_end_matches(TRAILING_PUNCTUATION).to_string();
    if raw.is_empty() || looks_like_word_not_url(&raw) {
        return None;
    }
    if raw.to_lowercase().starts_with("www.") || BARE_HOSTNAME.is_match(&raw) {
        if !raw.to_lowercase().starts_with("http://") && !raw.to_lowercase().starts_with("https://")
        {
            raw = format!("https://{}", raw);
        }
    }
    if !raw.to_lowercase().starts_with("http://") && !raw.to_lowercase().starts_with("https://") {
        return None;
    }
    let parsed = Url::parse(&raw).ok()?;
    let host = parsed.host_str()?;
    if !host.contains('.') {
        return None;
    }
    Some(raw)
}

/// Hostname of an absolute URL, lowercase.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

pub fn has_allowed_suffix(host: &str) -> bool {
    let host = host.to_lowercase();
    ALLOWED_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

pub fn is_email_provider(host: &str) -> bool {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    EMAIL_PROVIDER_HOSTS.contains(&host)
}

/// First URL in free text whose host carries an allowed suffix and is not
/// an e-mail provider. Strict by design: this feeds `leiloeiro_url`.
pub fn find_first_url(text: &str) -> Option<String> {
    for candidate in URL_CANDIDATE.find_iter(text) {
        let Some(url) = normalize_url(candidate.as_str()) else {
            continue;
        };
        let Some(host) = host_of(&url) else { continue };
        if is_email_provider(&host) || !has_allowed_suffix(&host) {
            continue;
        }
        return Some(url);
    }
    None
}

/// Looser scan for the JSON `informacoes_complementares` field. A lone
/// uppercase word that merely contains a TLD-looking substring (`COMEMORA`)
/// is flagged instead of silently dropped, so the record can be routed to
/// quarantine with evidence.
pub fn scan_complementary_info(text: &str) -> UrlScan {
    if let Some(url) = find_first_url(text) {
        return UrlScan {
            url: Some(url),
            word_not_url: false,
        };
    }
    // The whole field being one uppercase word (`COMEMORA`) is the classic
    // failure shape seen in production data.
    let whole = text.trim().trim_matches(TRAILING_PUNCTUATION);
    if whole.len() >= 6
        && !whole.contains(char::is_whitespace)
        && whole.chars().all(|c| c.is_ascii_uppercase() || c == '.')
        && ["COM", "NET", "ORG"].iter().any(|tld| whole.contains(tld))
        && looks_like_word_not_url(whole)
    {
        return UrlScan {
            url: None,
            word_not_url: true,
        };
    }
    for token in text.split_whitespace() {
        let token = token.trim_matches(TRAILING_PUNCTUATION);
        // Only URL-shaped tokens qualify: a dotted, all-uppercase word.
        if token.len() < 6
            || !token.contains('.')
            || !token.chars().all(|c| c.is_ascii_uppercase() || c == '.')
        {
            continue;
        }
        if ["COM", "NET", "ORG"].iter().any(|tld| token.contains(tld))
            && looks_like_word_not_url(token)
        {
            return UrlScan {
                url: None,
                word_not_url: true,
            };
        }
    }
    UrlScan::default()
}
