//! Hashing helpers shared by fingerprinting and freshness checks.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// 64-bit hash of `data` chained onto `seed`: the first eight bytes of
/// SHA-256 over `seed ‖ data`.
pub fn hash64(seed: u64, data: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// SHA-256 hash of a byte slice, returned as a hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)
        .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
    Ok(hash_bytes(&data))
}

/// A file's mtime as nanoseconds since the Unix epoch.
pub fn file_mtime(path: &Path) -> Option<u64> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    let duration = mtime.duration_since(SystemTime::UNIX_EPOCH).ok()?;
    u64::try_from(duration.as_nanos()).ok()
}

/// Hash of a file's modification time and length. `None` if the file is
/// missing.
pub fn metadata_hash(path: &Path) -> Option<u64> {
    let meta = fs::metadata(path).ok()?;
    let mtime = file_mtime(path)?;
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&mtime.to_le_bytes());
    bytes[8..].copy_from_slice(&meta.len().to_le_bytes());
    Some(hash64(0, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash64_depends_on_seed_and_data() {
        assert_eq!(hash64(1, b"debug"), hash64(1, b"debug"));
        assert_ne!(hash64(1, b"debug"), hash64(2, b"debug"));
        assert_ne!(hash64(1, b"debug"), hash64(1, b"release"));
    }

    #[test]
    fn hash_bytes_is_hex_sha256() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn metadata_hash_tracks_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.c");
        assert_eq!(metadata_hash(&path), None);
        fs::write(&path, "int a;").unwrap();
        let first = metadata_hash(&path).unwrap();
        fs::write(&path, "int a; int b;").unwrap();
        assert_ne!(metadata_hash(&path).unwrap(), first);
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"int a; int b;"));
    }
}
