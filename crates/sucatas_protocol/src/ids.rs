//! Run and record identity helpers.

use crate::types::SourceName;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a run identifier: `YYYYMMDDTHHMMSSZ_<short-uuid>`.
pub fn new_run_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", stamp, &suffix[..8])
}

/// Derive the immutable internal identifier for a record:
/// `ID_` + first 12 hex chars of SHA-256 over `source|external_id`.
pub fn stable_id_interno(source: SourceName, source_external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(source_external_id.trim().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("ID_{}", &hex[..12].to_uppercase())
}

/// SHA-256 of a document body, lowercase hex.
pub fn pdf_hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_has_expected_shape() {
        let id = new_run_id();
        let (stamp, suffix) = id.split_once('_').expect("separator");
        assert_eq!(stamp.len(), 16);
        assert!(stamp.ends_with('Z'));
        assert!(stamp.contains('T'));
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn id_interno_is_stable_and_source_scoped() {
        let a = stable_id_interno(SourceName::Pncp, "123-1-000456/2026");
        let b = stable_id_interno(SourceName::Pncp, " 123-1-000456/2026 ");
        let c = stable_id_interno(SourceName::Leiloeiro, "123-1-000456/2026");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), "ID_".len() + 12);
    }

    #[test]
    fn pdf_hash_is_sha256_hex() {
        let h = pdf_hash_hex(b"%PDF-1.4");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
