use std::path::Path;

use modvault_cache::FileMap;
use modvault_catalog::FileOrigin;
use modvault_hash::Hash;

use crate::coordinator::META_EXTENSION;

/// Where origin records come from — pluggable so a caller with access to a
/// mod-hosting API can supply richer provenance than the sidecar convention
/// below without the coordinator depending on any particular API client.
pub trait OriginSource: Send + Sync {
    fn origins(&self, downloads: &FileMap) -> Vec<(Hash, FileOrigin)>;
}

/// The default [`OriginSource`]: recovers origin records from
/// `<archive>.meta` sidecars sitting next to the archive in `downloads`.
/// A sidecar's trimmed text body becomes the origin's `source`.
#[derive(Debug, Default)]
pub struct MetaSidecarOriginSource;

impl OriginSource for MetaSidecarOriginSource {
    fn origins(&self, downloads: &FileMap) -> Vec<(Hash, FileOrigin)> {
        let mut origins = Vec::new();
        for (path, file) in downloads {
            if path.ends_with(META_EXTENSION) {
                continue;
            }
            let meta_path = format!("{path}{META_EXTENSION}");
            if downloads.get(&meta_path).is_none() {
                continue;
            }
            let source = match fs_err::read_to_string(Path::new(&meta_path)) {
                Ok(text) => text.trim().to_string(),
                Err(err) => {
                    tracing::warn!(path = %meta_path, error = %err, "failed to read origin sidecar");
                    continue;
                }
            };
            if source.is_empty() {
                continue;
            }
            origins.push((file.hash, FileOrigin { source, expected_hash: None, expected_size: None }));
        }
        origins
    }
}

#[cfg(test)]
mod tests {
    use modvault_cache::{FileOnDisk, Timestamp};

    use super::*;

    fn file(path: &str) -> FileOnDisk {
        FileOnDisk {
            file_path: path.to_string(),
            mtime: Timestamp::from_system_time(std::time::SystemTime::UNIX_EPOCH),
            size: 0,
            hash: Hash::zero(),
        }
    }

    #[test]
    fn sidecar_text_becomes_the_origin_source() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("mod.zip");
        let meta = dir.path().join("mod.zip.meta");
        fs_err::write(&archive, b"data").unwrap();
        fs_err::write(&meta, b"https://example.test/mod.zip\n").unwrap();

        let archive_key = archive.display().to_string();
        let meta_key = meta.display().to_string();
        let mut downloads = FileMap::default();
        downloads.insert(archive_key.clone(), file(&archive_key));
        downloads.insert(meta_key.clone(), file(&meta_key));

        let origins = MetaSidecarOriginSource.origins(&downloads);
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].1.source, "https://example.test/mod.zip");
    }

    #[test]
    fn archive_without_a_sidecar_has_no_origin() {
        let mut downloads = FileMap::default();
        downloads.insert("a.zip".to_string(), file("a.zip"));
        assert!(MetaSidecarOriginSource.origins(&downloads).is_empty());
    }
}
