use std::path::PathBuf;

use modvault_hash::Hash;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cache_data::CacheData;
use crate::memo::{self, CacheOverwrites, MemoError};
use crate::timestamp::Timestamp;

/// A folder tree to enumerate, with path-substring excludes applied to the
/// normalized, root-relative path of each candidate file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderToCache {
    pub root: PathBuf,
    pub excludes: Vec<String>,
}

impl FolderToCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excludes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }
}

/// A file observed on disk at hash time: its path, the `(mtime, size)` pair
/// observed when it was hashed, and its content hash.
///
/// Identity is `file_path` — two files with the same hash but different
/// paths are both kept, since the map is keyed by path, not by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOnDisk {
    pub file_path: String,
    pub mtime: Timestamp,
    pub size: u64,
    pub hash: Hash,
}

pub type FileMap = FxHashMap<String, FileOnDisk>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Memo(#[from] MemoError),
    #[error("failed to walk {0}: {1}")]
    Walk(PathBuf, std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FolderCacheParams {
    folders: Vec<FolderToCache>,
}

/// A persistent, mtime-keyed cache of file content hashes over a set of
/// folder trees.
///
/// [`FolderCache::scan`] rehashes only the files whose `(mtime, size)`
/// differs from the prior run's recorded values; everything else inherits
/// its previously computed hash. The "ready" event described in the
/// availability engine's design is simply this call returning: every file
/// under every root has a settled hash by the time it does.
pub struct FolderCache {
    prefix: String,
    folders: Vec<FolderToCache>,
}

impl FolderCache {
    #[must_use]
    pub fn new(prefix: impl Into<String>, folders: Vec<FolderToCache>) -> Self {
        Self {
            prefix: prefix.into(),
            folders,
        }
    }

    /// Run the scan: load the prior map (if the cache's configuration is
    /// unchanged), rehash whatever changed, and persist the new map.
    ///
    /// Blocking — callers in the availability coordinator run this inside a
    /// pure scheduler task on a worker thread, never on the coordinator
    /// thread.
    pub fn scan(
        &self,
        cachedir: &std::path::Path,
        cache_data: &CacheData,
    ) -> Result<(FileMap, CacheOverwrites), CacheError> {
        let params = FolderCacheParams {
            folders: self.folders.clone(),
        };

        let (prior, _baseline_overwrites) = memo::memo::<FileMap, _, _>(
            cachedir,
            cache_data,
            &self.prefix,
            &[],
            |_params| Ok(FileMap::new()),
            &params,
        )?;

        let mut candidates = Vec::new();
        for folder in &self.folders {
            let files = modvault_fs::walk_regular_files(&folder.root, &folder.excludes)
                .map_err(|err| CacheError::Walk(folder.root.clone(), err))?;
            candidates.extend(files);
        }

        let entries: Vec<Option<FileOnDisk>> = candidates
            .par_iter()
            .map(|path| rehash_one(path, &prior))
            .collect();

        let new_map: FileMap = entries
            .into_iter()
            .flatten()
            .map(|entry| (entry.file_path.clone(), entry))
            .collect();

        let overwrites = memo::store(cachedir, &self.prefix, &new_map, &params)?;
        Ok((new_map, overwrites))
    }
}

/// Hash (or inherit the hash of) a single candidate file.
///
/// Returns `None` if the file disappeared between enumeration and hashing —
/// per the design's edge cases, that is dropped silently, not a failure.
fn rehash_one(path: &std::path::Path, prior: &FileMap) -> Option<FileOnDisk> {
    let metadata = match fs_err::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return None,
    };
    let size = metadata.len();
    let mtime = Timestamp::from_metadata(&metadata);
    let normalized = modvault_fs::normalize_path_string(&path.to_string_lossy());

    if let Some(existing) = prior.get(&normalized) {
        if existing.mtime == mtime && existing.size == size {
            return Some(existing.clone());
        }
    }

    let hash = modvault_hash::hash_file(path).ok()?;
    Some(FileOnDisk {
        file_path: normalized,
        mtime,
        size,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write(path: &std::path::Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(path).unwrap().write_all(contents).unwrap();
    }

    #[test]
    fn second_scan_reuses_unchanged_hashes() {
        let downloads = tempfile::tempdir().unwrap();
        let cachedir = tempfile::tempdir().unwrap();
        write(&downloads.path().join("a.zip"), b"hello");

        let cache = FolderCache::new("downloads", vec![FolderToCache::new(downloads.path())]);
        let mut cache_data = CacheData::new();

        let (first, overwrites) = cache.scan(cachedir.path(), &cache_data).unwrap();
        cache_data.merge(overwrites);
        let first_hash = first.values().next().unwrap().hash;

        let (second, _) = cache.scan(cachedir.path(), &cache_data).unwrap();
        let second_hash = second.values().next().unwrap().hash;

        assert_eq!(first_hash, second_hash);
    }

    #[test]
    fn changed_contents_are_rehashed() {
        let downloads = tempfile::tempdir().unwrap();
        let cachedir = tempfile::tempdir().unwrap();
        let file = downloads.path().join("a.zip");
        write(&file, b"v1");

        let cache = FolderCache::new("downloads", vec![FolderToCache::new(downloads.path())]);
        let mut cache_data = CacheData::new();
        let (first, overwrites) = cache.scan(cachedir.path(), &cache_data).unwrap();
        cache_data.merge(overwrites);
        let first_hash = first.values().next().unwrap().hash;

        std::thread::sleep(std::time::Duration::from_millis(10));
        write(&file, b"v2-longer-content");

        let (second, _) = cache.scan(cachedir.path(), &cache_data).unwrap();
        let second_hash = second.values().next().unwrap().hash;

        assert_ne!(first_hash, second_hash);
    }

    #[test]
    fn two_files_with_same_content_are_both_kept() {
        let downloads = tempfile::tempdir().unwrap();
        let cachedir = tempfile::tempdir().unwrap();
        write(&downloads.path().join("a.zip"), b"same");
        write(&downloads.path().join("b.zip"), b"same");

        let cache = FolderCache::new("downloads", vec![FolderToCache::new(downloads.path())]);
        let cache_data = CacheData::new();
        let (map, _) = cache.scan(cachedir.path(), &cache_data).unwrap();

        assert_eq!(map.len(), 2);
        let hashes: Vec<_> = map.values().map(|f| f.hash).collect();
        assert_eq!(hashes[0], hashes[1]);
    }

    #[test]
    fn empty_folder_yields_empty_map() {
        let downloads = tempfile::tempdir().unwrap();
        let cachedir = tempfile::tempdir().unwrap();
        let cache = FolderCache::new("downloads", vec![FolderToCache::new(downloads.path())]);
        let cache_data = CacheData::new();
        let (map, _) = cache.scan(cachedir.path(), &cache_data).unwrap();
        assert!(map.is_empty());
    }
}
