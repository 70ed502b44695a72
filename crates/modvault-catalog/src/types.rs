use modvault_hash::Hash;
use serde::{Deserialize, Serialize};

/// A file located inside an archive, identified by its content hash and its
/// position in the (possibly nested) archive tree.
///
/// `intra_path` segments are already normalized (forward slashes,
/// case-folded); its length equals the nesting depth — 1 for a file at the
/// archive root, 2 for a file inside a nested archive, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInArchive {
    pub hash: Hash,
    pub size: u64,
    pub intra_path: Vec<String>,
}

impl FileInArchive {
    #[must_use]
    pub fn intra_path_joined(&self) -> String {
        self.intra_path.join("/")
    }
}

/// An archive and the files recovered from recursively extracting it.
///
/// `files` is always sorted by the lexicographic join of `intra_path` and
/// deduplicated by `intra_path` (first occurrence wins) — this ordering is
/// contractual: the journal codec depends on it to reproduce byte-identical
/// output for an unchanged catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub archive_hash: Hash,
    pub archive_size: u64,
    files: Vec<FileInArchive>,
}

impl Archive {
    /// Build an `Archive`, sorting `files` by intra-path and dropping any
    /// duplicate intra-paths (keeping the first occurrence).
    #[must_use]
    pub fn new(archive_hash: Hash, archive_size: u64, mut files: Vec<FileInArchive>) -> Self {
        files.sort_by(|a, b| a.intra_path_joined().cmp(&b.intra_path_joined()));
        files.dedup_by(|a, b| a.intra_path_joined() == b.intra_path_joined());
        Self {
            archive_hash,
            archive_size,
            files,
        }
    }

    #[must_use]
    pub fn files(&self) -> &[FileInArchive] {
        &self.files
    }
}

/// Where a file originally came from — attached to an archive hash, not to
/// any file-in-archive hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOrigin {
    /// Opaque description of the source, e.g. a download URL.
    pub source: String,
    /// The hash the origin claims the archive should have, if known ahead
    /// of actually hashing it.
    pub expected_hash: Option<Hash>,
    pub expected_size: Option<u64>,
}

/// One layer of "open archive X, locate intra-path P" in an
/// [`Retriever::Archive`] chain.
///
/// Consecutive steps in a chain satisfy
/// `steps[i].file_hash == steps[i + 1].archive_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStep {
    pub file_hash: Hash,
    pub file_size: u64,
    pub archive_hash: Hash,
    pub archive_size: u64,
    pub file_in_archive: FileInArchive,
}

/// A recipe for materializing a file by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Retriever {
    /// The distinguished hash of the empty file.
    Zero,
    /// The file lives as-is under a tracked version-controlled folder.
    Github {
        hash: Hash,
        size: u64,
        author: String,
        project: String,
        intra_path: Vec<String>,
    },
    /// Extract the outermost archive, then apply nested steps in order.
    Archive { hash: Hash, size: u64, steps: Vec<ArchiveStep> },
}

impl Retriever {
    /// Build an [`Retriever::Archive`], rejecting an empty step list — a
    /// non-empty `steps` is an invariant of the archive retriever.
    pub fn archive(hash: Hash, size: u64, steps: Vec<ArchiveStep>) -> Option<Self> {
        if steps.is_empty() {
            None
        } else {
            Some(Self::Archive { hash, size, steps })
        }
    }
}
