use modvault_hash::Hash;
use rustc_hash::FxHashMap;

use crate::types::{Archive, FileInArchive, FileOrigin};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("archive {0} already present in catalog")]
    DuplicateArchive(Hash),
}

/// What a catalog lookup by hash can resolve to.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveLookup<'a> {
    /// The archive has been hashed and its contents are known.
    Hashed(&'a Archive),
    /// Only an origin is known for this hash — it hasn't been hashed yet.
    OriginOnly(&'a FileOrigin),
}

/// The in-memory index of every known archive and the files recovered from
/// it.
///
/// The two maps (`archives_by_hash`, `archived_files_by_hash`) are kept
/// consistent by construction: `archived_files_by_hash` is never populated
/// directly, only derived from [`Catalog::insert_archive`].
#[derive(Debug, Default)]
pub struct Catalog {
    archives_by_hash: FxHashMap<Hash, Archive>,
    /// file_hash -> [(archive_hash, index into that archive's files)]
    archived_files_by_hash: FxHashMap<Hash, Vec<(Hash, usize)>>,
    origins: FxHashMap<Hash, FileOrigin>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a freshly hashed archive into the catalog.
    ///
    /// Fails with [`CatalogError::DuplicateArchive`] if `archive_hash` is
    /// already present — the journal's archive-hash uniqueness invariant.
    pub fn insert_archive(&mut self, archive: Archive) -> Result<(), CatalogError> {
        if self.archives_by_hash.contains_key(&archive.archive_hash) {
            return Err(CatalogError::DuplicateArchive(archive.archive_hash));
        }

        let archive_hash = archive.archive_hash;
        for (index, file) in archive.files().iter().enumerate() {
            self.archived_files_by_hash
                .entry(file.hash)
                .or_default()
                .push((archive_hash, index));
        }
        self.archives_by_hash.insert(archive_hash, archive);
        Ok(())
    }

    /// Look up an archive by its hash.
    ///
    /// When `partial_ok` is set, a hash known only through an origin record
    /// (not yet hashed) is also returned, as [`ArchiveLookup::OriginOnly`].
    #[must_use]
    pub fn archive_by_hash(&self, hash: &Hash, partial_ok: bool) -> Option<ArchiveLookup<'_>> {
        if let Some(archive) = self.archives_by_hash.get(hash) {
            return Some(ArchiveLookup::Hashed(archive));
        }
        if partial_ok {
            if let Some(origin) = self.origins.get(hash) {
                return Some(ArchiveLookup::OriginOnly(origin));
            }
        }
        None
    }

    /// Every `(archive, file)` pair whose file content hash is `hash`.
    #[must_use]
    pub fn files_by_hash(&self, hash: &Hash) -> Vec<(&Archive, &FileInArchive)> {
        let Some(refs) = self.archived_files_by_hash.get(hash) else {
            return Vec::new();
        };
        refs.iter()
            .filter_map(|(archive_hash, index)| {
                let archive = self.archives_by_hash.get(archive_hash)?;
                archive.files().get(*index).map(|file| (archive, file))
            })
            .collect()
    }

    /// Attach a [`FileOrigin`] to an archive hash. Valid whether or not the
    /// archive has been hashed yet.
    pub fn add_origin(&mut self, archive_hash: Hash, origin: FileOrigin) {
        self.origins.insert(archive_hash, origin);
    }

    #[must_use]
    pub fn archives(&self) -> impl Iterator<Item = &Archive> {
        self.archives_by_hash.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archives_by_hash.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archives_by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileInArchive;

    fn hash(byte: u8) -> Hash {
        Hash::from_bytes([byte; modvault_hash::HASH_LEN])
    }

    fn archive_with_one_file(archive_byte: u8, file_byte: u8) -> Archive {
        Archive::new(
            hash(archive_byte),
            100,
            vec![FileInArchive {
                hash: hash(file_byte),
                size: 10,
                intra_path: vec!["x.txt".into()],
            }],
        )
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut catalog = Catalog::new();
        let archive = archive_with_one_file(1, 2);
        catalog.insert_archive(archive).unwrap();

        let found = catalog.files_by_hash(&hash(2));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.archive_hash, hash(1));
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut catalog = Catalog::new();
        catalog.insert_archive(archive_with_one_file(1, 2)).unwrap();
        let err = catalog.insert_archive(archive_with_one_file(1, 3)).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateArchive(h) if h == hash(1)));
    }

    #[test]
    fn origin_only_requires_partial_ok() {
        let mut catalog = Catalog::new();
        catalog.add_origin(
            hash(5),
            FileOrigin {
                source: "https://example.test/mod.zip".into(),
                expected_hash: None,
                expected_size: None,
            },
        );

        assert!(catalog.archive_by_hash(&hash(5), false).is_none());
        assert!(matches!(
            catalog.archive_by_hash(&hash(5), true),
            Some(ArchiveLookup::OriginOnly(_))
        ));
    }

    #[test]
    fn invariant_every_archived_file_points_at_a_present_archive() {
        let mut catalog = Catalog::new();
        catalog.insert_archive(archive_with_one_file(1, 2)).unwrap();
        catalog.insert_archive(archive_with_one_file(3, 4)).unwrap();

        for (archive, file) in catalog.files_by_hash(&hash(2)) {
            assert!(matches!(
                catalog.archive_by_hash(&archive.archive_hash, false),
                Some(ArchiveLookup::Hashed(_))
            ));
            assert!(archive.files().contains(file));
        }
    }
}
