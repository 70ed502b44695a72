//! Content hashing for on-disk files.
//!
//! A [`Hash`] is the full-width content hash of a file's bytes, independent
//! of any filesystem metadata. [`Hash::truncate`] yields the half-width form
//! stored in the journal (see `modvault-journal`) to keep its lines short.

use std::fmt;
use std::fs::Metadata;
use std::io::Read;
use std::path::Path;

use fs_err as fs;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Width, in bytes, of a full [`Hash`].
pub const HASH_LEN: usize = 32;

/// Width, in bytes, of a [`TruncatedHash`].
pub const TRUNCATED_HASH_LEN: usize = HASH_LEN / 2;

/// A fast, deterministic content hash over a file's bytes.
///
/// Hashing never depends on `mtime`, permissions, or path — only on the
/// byte contents read from the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Build a [`Hash`] from raw bytes already known to be a content digest.
    #[must_use]
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash of the empty file. Distinguished per the zero-retriever rule.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_bytes(*blake3::hash(b"").as_bytes())
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// First half of the digest, used in the journal to keep lines short.
    #[must_use]
    pub fn truncate(&self) -> TruncatedHash {
        let mut out = [0u8; TRUNCATED_HASH_LEN];
        out.copy_from_slice(&self.0[..TRUNCATED_HASH_LEN]);
        TruncatedHash(out)
    }

    /// Lowercase hex encoding of the full digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex digest back into a [`Hash`].
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s).map_err(|_| HashError::MalformedHex(s.to_string()))?;
        let arr: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| HashError::MalformedHex(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// The first half of a [`Hash`], as stored in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TruncatedHash([u8; TRUNCATED_HASH_LEN]);

impl TruncatedHash {
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s).map_err(|_| HashError::MalformedHex(s.to_string()))?;
        let arr: [u8; TRUNCATED_HASH_LEN] = bytes
            .try_into()
            .map_err(|_| HashError::MalformedHex(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for TruncatedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TruncatedHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TruncatedHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a regular file (directory or symlink)")]
    NotAFile(std::path::PathBuf),
    #[error("malformed hex digest: {0}")]
    MalformedHex(String),
}

/// Hash the contents of a regular file at `path`.
///
/// Symlinks are never followed: a symlink at `path` is reported as
/// [`HashError::NotAFile`], never silently hashed through to its target.
pub fn hash_file(path: &Path) -> Result<Hash, HashError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    require_regular_file(path, &metadata)?;

    let mut file = fs::File::open(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    tracing::trace!(path = %path.display(), "hashed file");
    Ok(Hash::from_bytes(*hasher.finalize().as_bytes()))
}

fn require_regular_file(path: &Path, metadata: &Metadata) -> Result<(), HashError> {
    if metadata.is_file() {
        Ok(())
    } else {
        Err(HashError::NotAFile(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hashes_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

        let a = hash_file(&path).unwrap();
        let b = hash_file(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_contents_hash_differently() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.txt");
        let b_path = dir.path().join("b.txt");
        fs::File::create(&a_path).unwrap().write_all(b"hello").unwrap();
        fs::File::create(&b_path).unwrap().write_all(b"world").unwrap();

        assert_ne!(hash_file(&a_path).unwrap(), hash_file(&b_path).unwrap());
    }

    #[test]
    fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(dir.path()).unwrap_err();
        assert!(matches!(err, HashError::NotAFile(_)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_never_followed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        fs::File::create(&target).unwrap().write_all(b"hi").unwrap();
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = hash_file(&link).unwrap_err();
        assert!(matches!(err, HashError::NotAFile(_)));
    }

    #[test]
    fn truncate_is_stable_prefix() {
        let h = Hash::from_bytes([7u8; HASH_LEN]);
        let t = h.truncate();
        assert_eq!(t.to_hex(), h.to_hex()[..TRUNCATED_HASH_LEN * 2]);
    }

    #[test]
    fn hex_round_trips() {
        let h = Hash::zero();
        let parsed = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }
}
