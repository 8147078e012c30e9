//! One-level ZIP expansion.

use crate::{ExtractError, Result};
use std::io::{Cursor, Read};
use tracing::debug;

/// Per-entry size ceiling; anything bigger is skipped, not failed.
const MAX_ENTRY_BYTES: u64 = 30 * 1024 * 1024;

/// Expand a ZIP attachment into `(name, bytes)` pairs. Nested archives are
/// returned as-is and must not be expanded again - one level only.
pub fn expand_zip(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ExtractError::Zip(err.to_string()))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(err) => {
                debug!(index, %err, "unreadable zip entry skipped");
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        if file.size() > MAX_ENTRY_BYTES {
            debug!(name = file.name(), size = file.size(), "oversized zip entry skipped");
            continue;
        }
        let name = file.name().to_string();
        let mut content = Vec::with_capacity(file.size() as usize);
        if let Err(err) = file.read_to_end(&mut content) {
            debug!(%name, %err, "zip entry read failed, skipped");
            continue;
        }
        entries.push((name, content));
    }
    Ok(entries)
}
