//! The recursive archive hasher (§4.E): extract an archive, hash every
//! member, and recurse into members that are themselves archives.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use modvault_catalog::{Archive, FileInArchive};
use modvault_hash::Hash;
use modvault_plugins::HandlerRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("no registered handler for {0}")]
    NoHandler(PathBuf),
    #[error("archive {0} is corrupt: {1}")]
    Corrupt(PathBuf, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allocates unique scratch-directory names for concurrent hash tasks.
///
/// One counter is shared by a coordinator across every concurrently running
/// hash task so that no two tasks ever collide on the same scratch
/// subdirectory.
#[derive(Debug, Default)]
pub struct ScratchAllocator(AtomicU64);

impl ScratchAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_dir(&self, root: &Path) -> PathBuf {
        let id = self.0.fetch_add(1, Ordering::Relaxed);
        root.join(format!("scratch-{id:016x}"))
    }
}

/// Extract `archive_path` (already known to hash to `archive_hash` with
/// size `archive_size`) and recursively hash every member, descending into
/// any member that is itself a registered archive type.
///
/// On any extraction failure the whole call fails with
/// [`ArchiveError::Corrupt`] and no partial `Archive` is returned — the
/// caller (the availability coordinator) treats one corrupt archive as
/// "omit from the catalog, continue the batch", never as fatal.
pub fn hash_archive(
    archive_path: &Path,
    archive_hash: Hash,
    archive_size: u64,
    registry: &HandlerRegistry,
    scratch_root: &Path,
    scratch: &ScratchAllocator,
) -> Result<Archive, ArchiveError> {
    let handler = registry
        .handler_for(archive_path)
        .ok_or_else(|| ArchiveError::NoHandler(archive_path.to_path_buf()))?;

    let extraction_dir = scratch.fresh_dir(scratch_root);
    fs_err::create_dir_all(&extraction_dir)?;

    let outcome = (|| -> Result<Vec<FileInArchive>, ArchiveError> {
        handler
            .extract_all(archive_path, &extraction_dir)
            .map_err(|err| ArchiveError::Corrupt(archive_path.to_path_buf(), err.to_string()))?;

        let mut files = Vec::new();
        collect(&extraction_dir, &[], registry, scratch_root, scratch, &mut files)?;
        Ok(files)
    })();

    // Always reclaim the scratch tree, on both the success and failure paths.
    let _ = fs_err::remove_dir_all(&extraction_dir);

    let files = outcome?;
    Ok(Archive::new(archive_hash, archive_size, files))
}

/// Walk one extraction root, recording a [`FileInArchive`] per regular file
/// and recursing into any member with a registered handler.
///
/// `prefix` is the sequence of intra-path segments contributed by the
/// enclosing archive layers; each file found here appends exactly one more
/// segment — its path relative to `root` — regardless of how many
/// subdirectories that relative path crosses.
fn collect(
    root: &Path,
    prefix: &[String],
    registry: &HandlerRegistry,
    scratch_root: &Path,
    scratch: &ScratchAllocator,
    out: &mut Vec<FileInArchive>,
) -> Result<(), ArchiveError> {
    let candidates = modvault_fs::walk_regular_files(root, &[])?;

    for path in candidates {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let segment = modvault_fs::normalize_path_string(&relative.to_string_lossy());

        let metadata = fs_err::metadata(&path)?;
        let size = metadata.len();
        let hash = match modvault_hash::hash_file(&path) {
            Ok(hash) => hash,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable archive member");
                continue;
            }
        };

        let mut intra_path = prefix.to_vec();
        intra_path.push(segment);

        out.push(FileInArchive {
            hash,
            size,
            intra_path: intra_path.clone(),
        });

        if let Some(handler) = registry.handler_for(&path) {
            let nested_dir = scratch.fresh_dir(scratch_root);
            fs_err::create_dir_all(&nested_dir)?;
            let nested_result = handler
                .extract_all(&path, &nested_dir)
                .map_err(|err| ArchiveError::Corrupt(path.clone(), err.to_string()))
                .and_then(|()| collect(&nested_dir, &intra_path, registry, scratch_root, scratch, out));
            let _ = fs_err::remove_dir_all(&nested_dir);
            nested_result?;
        } else if let Some(ext) = modvault_fs::lowercase_extension(&path) {
            tracing::trace!(extension = %ext, path = %path.display(), "no handler for nested member, treating as opaque leaf");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modvault_plugins_zip::ZipHandler;
    use std::io::Write as _;
    use std::sync::Arc;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new(vec![Arc::new(ZipHandler::new())]).unwrap()
    }

    fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    fn hash_of(contents: &[u8]) -> Hash {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmp");
        std::fs::write(&path, contents).unwrap();
        modvault_hash::hash_file(&path).unwrap()
    }

    #[test]
    fn hashes_a_flat_archive() {
        let downloads = tempfile::tempdir().unwrap();
        let scratch_root = tempfile::tempdir().unwrap();
        let archive_path = downloads.path().join("b.zip");
        make_zip(&archive_path, &[("x.txt", b"0123456789"), ("y.txt", b"0123456789012345678901")]);

        let archive_hash = modvault_hash::hash_file(&archive_path).unwrap();
        let archive_size = std::fs::metadata(&archive_path).unwrap().len();

        let archive = hash_archive(
            &archive_path,
            archive_hash,
            archive_size,
            &registry(),
            scratch_root.path(),
            &ScratchAllocator::new(),
        )
        .unwrap();

        assert_eq!(archive.archive_hash, archive_hash);
        assert_eq!(archive.files().len(), 2);
        assert_eq!(archive.files()[0].intra_path, vec!["x.txt".to_string()]);
        assert_eq!(archive.files()[0].hash, hash_of(b"0123456789"));
    }

    #[test]
    fn recurses_into_nested_archive() {
        let downloads = tempfile::tempdir().unwrap();
        let scratch_root = tempfile::tempdir().unwrap();

        let inner_dir = tempfile::tempdir().unwrap();
        let inner_path = inner_dir.path().join("inner.zip");
        make_zip(&inner_path, &[("deep.bin", b"deep-contents")]);
        let inner_bytes = std::fs::read(&inner_path).unwrap();

        let outer_path = downloads.path().join("outer.zip");
        make_zip(&outer_path, &[("inner.zip", &inner_bytes)]);

        let archive_hash = modvault_hash::hash_file(&outer_path).unwrap();
        let archive_size = std::fs::metadata(&outer_path).unwrap().len();

        let archive = hash_archive(
            &outer_path,
            archive_hash,
            archive_size,
            &registry(),
            scratch_root.path(),
            &ScratchAllocator::new(),
        )
        .unwrap();

        assert_eq!(archive.files().len(), 1);
        let deep = &archive.files()[0];
        assert_eq!(deep.intra_path, vec!["inner.zip".to_string(), "deep.bin".to_string()]);
        assert_eq!(deep.hash, hash_of(b"deep-contents"));
    }

    #[test]
    fn corrupt_archive_is_reported_and_scratch_is_cleaned_up() {
        let downloads = tempfile::tempdir().unwrap();
        let scratch_root = tempfile::tempdir().unwrap();
        let archive_path = downloads.path().join("bad.zip");
        std::fs::write(&archive_path, b"not a zip").unwrap();

        let err = hash_archive(
            &archive_path,
            modvault_hash::Hash::zero(),
            0,
            &registry(),
            scratch_root.path(),
            &ScratchAllocator::new(),
        )
        .unwrap_err();

        assert!(matches!(err, ArchiveError::Corrupt(_, _)));
        assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
    }

    #[test]
    fn archive_with_no_members_is_accepted() {
        let downloads = tempfile::tempdir().unwrap();
        let scratch_root = tempfile::tempdir().unwrap();
        let archive_path = downloads.path().join("empty.zip");
        make_zip(&archive_path, &[]);

        let archive_hash = modvault_hash::hash_file(&archive_path).unwrap();
        let archive_size = std::fs::metadata(&archive_path).unwrap().len();

        let archive = hash_archive(
            &archive_path,
            archive_hash,
            archive_size,
            &registry(),
            scratch_root.path(),
            &ScratchAllocator::new(),
        )
        .unwrap();

        assert!(archive.files().is_empty());
    }
}
