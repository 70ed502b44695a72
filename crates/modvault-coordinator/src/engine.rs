use modvault_catalog::{ArchiveStep, Retriever};
use modvault_hash::Hash;

use crate::error::CoordinatorError;
use crate::state::EngineState;

/// Recursion is cryptographically acyclic (§9: an archive cannot contain a
/// file hashing to its own archive hash) but capped defensively.
const MAX_RETRIEVER_DEPTH: u32 = 16;

/// The result of a completed [`crate::AvailabilityCoordinator::run`]: a
/// read-only, fully-ingested catalog plus the GitHub provenance index,
/// ready to answer [`AvailabilityEngine::retrievers_by_hash`].
pub struct AvailabilityEngine {
    pub(crate) state: EngineState,
}

impl AvailabilityEngine {
    /// `true` once every hashing, origin-ingestion, and GitHub-indexing task
    /// has completed — flipped by the coordinator task that replaces the
    /// `ready` placeholder.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }

    #[must_use]
    pub fn catalog(&self) -> &modvault_catalog::Catalog {
        &self.state.catalog
    }

    /// Every way to materialize the file content identified by `h`.
    ///
    /// The zero-file hash short-circuits to `[Retriever::Zero]` regardless
    /// of catalog contents. Otherwise archive-backed retrievers are
    /// returned before GitHub-backed ones (§8 S4); an empty result is legal.
    pub fn retrievers_by_hash(&self, h: Hash) -> Result<Vec<Retriever>, CoordinatorError> {
        if h == Hash::zero() {
            return Ok(vec![Retriever::Zero]);
        }

        let mut retrievers = self.archived_retrievers(h, 0)?;
        retrievers.extend(self.github_retrievers(h));
        Ok(retrievers)
    }

    /// Retrievers that extract `h` from one or more nested archives.
    ///
    /// For every `(archive, file)` pair whose content hash is `h`, emits a
    /// single-step retriever, then recurses on the archive's own hash
    /// (which may itself be a file nested in a further archive) and chains
    /// each retriever found there with one more step to reach `h`.
    fn archived_retrievers(&self, h: Hash, depth: u32) -> Result<Vec<Retriever>, CoordinatorError> {
        if depth > MAX_RETRIEVER_DEPTH {
            return Err(CoordinatorError::RetrieverDepthExceeded(depth));
        }

        let mut out = Vec::new();
        for (archive, file) in self.state.catalog.files_by_hash(&h) {
            let step = ArchiveStep {
                file_hash: h,
                file_size: file.size,
                archive_hash: archive.archive_hash,
                archive_size: archive.archive_size,
                file_in_archive: file.clone(),
            };

            if let Some(retriever) = Retriever::archive(h, file.size, vec![step.clone()]) {
                out.push(retriever);
            }

            for nested in self.archived_retrievers(archive.archive_hash, depth + 1)? {
                if let Retriever::Archive { mut steps, .. } = nested {
                    steps.push(step.clone());
                    if let Some(retriever) = Retriever::archive(h, file.size, steps) {
                        out.push(retriever);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Retrievers for `h` as a file tracked as-is under a GitHub folder.
    fn github_retrievers(&self, h: Hash) -> Vec<Retriever> {
        self.state
            .github_by_hash
            .get(&h)
            .into_iter()
            .flatten()
            .map(|location| Retriever::Github {
                hash: h,
                size: location.size,
                author: location.author.clone(),
                project: location.project.clone(),
                intra_path: location.intra_path.clone(),
            })
            .collect()
    }
}
