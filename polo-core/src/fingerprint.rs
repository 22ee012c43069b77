//! Content fingerprints: SHA-256 over a file's full byte content.
//!
//! The configuration watcher compares fingerprints to decide whether a file
//! needs re-parsing; the file probe uses the same digest to detect changed
//! sources.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, ConfigError};

/// Files are read in chunks of this size, so memory use does not depend on
/// the file size.
pub const CHUNK_SIZE: usize = 1024;

/// Hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Digest of an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Digest of the file at `path`, together with the number of bytes hashed.
pub fn fingerprint_file_with_len(path: &Path) -> Result<(Fingerprint, u64), ConfigError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_err(path, err)),
        };
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    Ok((Fingerprint(hex::encode(hasher.finalize())), total))
}

/// Digest of the file at `path`.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, ConfigError> {
    fingerprint_file_with_len(path).map(|(fingerprint, _)| fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_digest_matches_buffer_digest_across_chunk_boundaries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        // Not a multiple of CHUNK_SIZE on purpose.
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let (digest, len) = fingerprint_file_with_len(&path).unwrap();
        assert_eq!(digest, fingerprint_bytes(&content));
        assert_eq!(len, content.len() as u64);
    }

    #[test]
    fn known_digest_of_empty_input() {
        assert_eq!(
            fingerprint_bytes(b"").0,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn missing_file_is_io_error_with_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.yaml");
        let err = fingerprint_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn short_form_is_prefix() {
        let fp = fingerprint_bytes(b"polo");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.0.starts_with(fp.short()));
    }
}
