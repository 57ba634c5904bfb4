//! Content hashing for plans and produced artifacts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(sha256_hex(&contents))
}

/// Correlation id for one submission: plan content hash plus submission time.
///
/// The hash prefix groups runs of the same document; the timestamp makes a
/// re-submitted plan start a fresh run.
pub fn correlation_id(plan_hash: &str, submitted_at: DateTime<Utc>) -> String {
    let prefix = plan_hash.get(..16).unwrap_or(plan_hash);
    format!("{prefix}-{}", submitted_at.format("%Y%m%dT%H%M%S%3fZ"))
}

/// Hash every artifact that exists on disk, keyed by its label.
///
/// Missing files are skipped; unreadable ones are logged and skipped.
pub fn hash_existing<'a, I>(artifacts: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, &'a Path)>,
{
    let mut hashes = BTreeMap::new();
    for (label, path) in artifacts {
        if !path.is_file() {
            continue;
        }
        match file_sha256(path) {
            Ok(hash) => {
                hashes.insert(label, hash);
            }
            Err(err) => warn!(path = %path.display(), err = %err, "artifact hash failed"),
        }
    }
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn correlation_id_combines_hash_and_time() {
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 45)
            .single()
            .expect("timestamp");
        let id = correlation_id(&sha256_hex(b"plan"), at);
        assert!(id.starts_with(&sha256_hex(b"plan")[..16]));
        assert!(id.ends_with("-20240501T123045000Z"));
    }

    #[test]
    fn hash_existing_skips_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let present = temp.path().join("a.txt");
        fs::write(&present, "abc").expect("write");
        let missing = temp.path().join("b.txt");

        let hashes = hash_existing(vec![
            ("a.txt".to_string(), present.as_path()),
            ("b.txt".to_string(), missing.as_path()),
        ]);
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes["a.txt"], sha256_hex(b"abc"));
    }
}
