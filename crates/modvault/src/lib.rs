//! The modvault availability engine, assembled from its component crates.
//!
//! This crate has no CLI and parses no configuration (§6 Non-goals): the
//! engine is built from explicit parameters — `by` (the archive handler
//! registry), `cachedir`, `tmpdir`, `rootgitdir`, `downloads`,
//! `github_folders`, and a prior run's [`CacheData`] — by whatever embeds
//! it.

use std::path::PathBuf;

pub use modvault_cache::CacheData;
pub use modvault_catalog::{Archive, ArchiveLookup, ArchiveStep, Catalog, FileInArchive, FileOrigin, Retriever};
pub use modvault_coordinator::{AvailabilityCoordinator, AvailabilityEngine, CoordinatorError};
pub use modvault_hash::Hash;
pub use modvault_plugins::{ArchiveHandler, HandlerError, HandlerRegistry, RegistryError};

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `info`). Idempotent: safe to call more than once (e.g.
/// once per test), later calls are silently ignored.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build and run an [`AvailabilityCoordinator`] to completion in one call —
/// the engine's whole public surface for an embedder that doesn't need to
/// tune the worker pool size.
pub async fn run(
    by: HandlerRegistry,
    cachedir: impl Into<PathBuf>,
    tmpdir: impl Into<PathBuf>,
    rootgitdir: impl Into<PathBuf>,
    downloads: impl Into<PathBuf>,
    github_folders: impl Into<PathBuf>,
    cache_data: CacheData,
) -> Result<AvailabilityEngine, CoordinatorError> {
    AvailabilityCoordinator::new(by, cachedir, tmpdir, rootgitdir, downloads, github_folders, cache_data)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_trees_produce_a_ready_empty_engine() {
        let downloads = tempfile::tempdir().unwrap();
        let github_folders = tempfile::tempdir().unwrap();
        let cachedir = tempfile::tempdir().unwrap();
        let tmpdir = tempfile::tempdir().unwrap();
        let rootgitdir = tempfile::tempdir().unwrap();

        let registry = HandlerRegistry::new(vec![std::sync::Arc::new(modvault_plugins_zip::ZipHandler::new())]).unwrap();

        let engine = run(
            registry,
            cachedir.path(),
            tmpdir.path(),
            rootgitdir.path(),
            downloads.path(),
            github_folders.path(),
            CacheData::new(),
        )
        .await
        .unwrap();

        assert!(engine.is_ready());
        assert!(engine.catalog().is_empty());
    }
}
