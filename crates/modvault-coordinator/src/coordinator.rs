use std::path::{Path, PathBuf};
use std::sync::Arc;

use modvault_archive::ScratchAllocator;
use modvault_cache::{CacheData, CacheOverwrites, FileMap, FolderCache, FolderToCache};
use modvault_catalog::{Archive, FileOrigin};
use modvault_hash::Hash;
use modvault_plugins::HandlerRegistry;
use modvault_scheduler::{downcast, Registrar, Scheduler, TaskDataDependencies, TaskOutput};
use rustc_hash::FxHashMap;

use crate::engine::AvailabilityEngine;
use crate::error::CoordinatorError;
use crate::origin_source::{MetaSidecarOriginSource, OriginSource};
use crate::state::{EngineState, GithubLocation, GithubRoot};

pub(crate) const META_EXTENSION: &str = ".meta";
const SEVEN_ZIP_EXTENSION: &str = ".7z";
const JOURNAL_FILE_NAME: &str = "known-archives.json";

/// Owns the two persistent folder caches, the archive-handler registry, and
/// the scheduler wiring that turns a `downloads`/`github_folders` pair of
/// trees plus a prior journal into a queryable [`AvailabilityEngine`]
/// (§4.I).
pub struct AvailabilityCoordinator {
    handlers: Arc<HandlerRegistry>,
    downloads_cache: FolderCache,
    github_cache: FolderCache,
    github_roots: Arc<Vec<GithubRoot>>,
    cachedir: PathBuf,
    tmpdir: PathBuf,
    journal_path: PathBuf,
    cache_data: CacheData,
    worker_limit: usize,
    origin_source: Arc<dyn OriginSource>,
}

impl AvailabilityCoordinator {
    /// Construct a coordinator from the engine's explicit parameters (§6):
    /// `by` (the archive handler registry), `cachedir`, `tmpdir`,
    /// `rootgitdir` (holding `known-archives.json`), `downloads`,
    /// `github_folders`, and a prior run's `cache_data`.
    ///
    /// `github_folders`'s immediate subdirectories are scanned eagerly for a
    /// `.git/config` pointing at GitHub; a subdirectory without one is
    /// logged and excluded from the GitHub cache entirely.
    pub fn new(
        by: HandlerRegistry,
        cachedir: impl Into<PathBuf>,
        tmpdir: impl Into<PathBuf>,
        rootgitdir: impl Into<PathBuf>,
        downloads: impl Into<PathBuf>,
        github_folders: impl Into<PathBuf>,
        cache_data: CacheData,
    ) -> Self {
        let downloads = downloads.into();
        let github_folders = github_folders.into();
        let rootgitdir = rootgitdir.into();

        let downloads_cache = FolderCache::new("downloads", vec![FolderToCache::new(downloads)]);

        let mut github_roots = Vec::new();
        let mut github_folder_roots = Vec::new();
        for dir in modvault_fs::directories(&github_folders) {
            let config_path = dir.join(".git").join("config");
            let Ok(config_text) = fs_err::read_to_string(&config_path) else {
                tracing::warn!(dir = %dir.display(), "github folder has no readable .git/config, skipping");
                continue;
            };
            let Some((author, project)) = modvault_catalog::parse_github_remote(&config_text) else {
                tracing::warn!(dir = %dir.display(), "could not parse a github remote from .git/config, skipping");
                continue;
            };
            let mut normalized_root = modvault_fs::normalize_path_string(&dir.to_string_lossy());
            normalized_root.push('/');
            github_folder_roots.push(FolderToCache::new(dir));
            github_roots.push(GithubRoot { normalized_root, author, project });
        }
        let github_cache = FolderCache::new("github", github_folder_roots);

        Self {
            handlers: Arc::new(by),
            downloads_cache,
            github_cache,
            github_roots: Arc::new(github_roots),
            cachedir: cachedir.into(),
            tmpdir: tmpdir.into(),
            journal_path: rootgitdir.join(JOURNAL_FILE_NAME),
            cache_data,
            worker_limit: std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4),
            origin_source: Arc::new(MetaSidecarOriginSource),
        }
    }

    /// Override the bounded worker pool size; defaults to the host's
    /// available parallelism.
    #[must_use]
    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = worker_limit;
        self
    }

    /// Override where origin records come from; defaults to
    /// [`MetaSidecarOriginSource`].
    #[must_use]
    pub fn with_origin_source(mut self, origin_source: Arc<dyn OriginSource>) -> Self {
        self.origin_source = origin_source;
        self
    }

    /// Run the task graph of §4.I to completion, producing a queryable
    /// [`AvailabilityEngine`].
    ///
    /// # Errors
    /// Fails if any task fails — per §7, a worker I/O error, a malformed
    /// journal, a duplicate archive hash, or a scheduler data-dependency
    /// conflict are all fatal to the whole run.
    pub async fn run(self) -> Result<AvailabilityEngine, CoordinatorError> {
        let handlers = Arc::clone(&self.handlers);
        let github_roots = Arc::clone(&self.github_roots);
        let cachedir = Arc::new(self.cachedir);
        let tmpdir = Arc::new(self.tmpdir);
        let journal_path = Arc::new(self.journal_path);
        let scratch = Arc::new(ScratchAllocator::new());
        let origin_source = Arc::clone(&self.origin_source);
        let initial_cache_data = Arc::new(self.cache_data.clone());

        let mut scheduler: Scheduler<EngineState> = Scheduler::new(self.worker_limit.max(1));

        scheduler.register_placeholder("done_hashing")?;
        scheduler.register_placeholder("ready")?;

        {
            let cachedir = Arc::clone(&cachedir);
            let cache_data = Arc::clone(&initial_cache_data);
            let journal_path = Arc::clone(&journal_path);
            scheduler.register_pure("catalog.loaded", vec![], move |_inputs| {
                load_catalog(&cachedir, &cache_data, &journal_path)
                    .map(|result| Arc::new(result) as TaskOutput)
            })?;
        }

        {
            let cachedir = Arc::clone(&cachedir);
            let cache_data = Arc::clone(&initial_cache_data);
            let downloads_cache = self.downloads_cache;
            scheduler.register_pure("downloads_cache.ready", vec![], move |_inputs| {
                let result = downloads_cache.scan(&cachedir, &cache_data)?;
                Ok(Arc::new(result) as TaskOutput)
            })?;
        }

        {
            let cachedir = Arc::clone(&cachedir);
            let cache_data = Arc::clone(&initial_cache_data);
            let github_cache = self.github_cache;
            scheduler.register_pure("github_cache.ready", vec![], move |_inputs| {
                let result = github_cache.scan(&cachedir, &cache_data)?;
                Ok(Arc::new(result) as TaskOutput)
            })?;
        }

        // Registered before "start_hashing" so that in a tie (both become
        // ready off the same "downloads_cache.ready" completion) this one
        // always runs first and "origins_ingest" exists by the time
        // "start_hashing" replaces the "ready" placeholder with a dependency
        // list naming it.
        scheduler.register_coordinator(
            "start_origins",
            vec!["downloads_cache.ready".to_string()],
            None,
            move |_state, inputs, registrar| {
                let (downloads, _overwrites) =
                    downcast::<(FileMap, CacheOverwrites)>(&inputs[0]).map_err(|e| anyhow::anyhow!(e))?.clone();

                registrar.register_pure("origins_compute", vec!["start_origins".to_string()], move |_inputs| {
                    Ok(Arc::new(origin_source.origins(&downloads)) as TaskOutput)
                });

                registrar.register_coordinator(
                    "origins_ingest",
                    vec!["github_cache.ready".to_string(), "origins_compute".to_string()],
                    Some(TaskDataDependencies::new().writes(["catalog"])),
                    move |state, inputs, registrar| {
                        // inputs sorted: [github_cache.ready, origins_compute]
                        let (_github, github_overwrites) =
                            downcast::<(FileMap, CacheOverwrites)>(&inputs[0]).map_err(|e| anyhow::anyhow!(e))?.clone();
                        let origins = downcast::<Vec<(Hash, FileOrigin)>>(&inputs[1]).map_err(|e| anyhow::anyhow!(e))?.clone();

                        state.cache_data.merge(github_overwrites);
                        for (hash, origin) in origins {
                            state.catalog.add_origin(hash, origin);
                        }

                        let snapshot: Vec<Archive> = state.catalog.archives().cloned().collect();
                        registrar.register_pure("save_journal", vec!["origins_ingest".to_string()], move |_inputs| {
                            let text = modvault_journal::encode(snapshot.iter());
                            if let Some(parent) = journal_path.parent() {
                                fs_err::create_dir_all(parent)?;
                            }
                            fs_err::write(journal_path.as_path(), text)?;
                            Ok(Arc::new(()) as TaskOutput)
                        });

                        Ok(Arc::new(()) as TaskOutput)
                    },
                );

                Ok(Arc::new(()) as TaskOutput)
            },
        )?;

        scheduler.register_coordinator(
            "start_hashing",
            vec!["catalog.loaded".to_string(), "downloads_cache.ready".to_string()],
            Some(TaskDataDependencies::new().writes(["catalog"])),
            move |state, inputs, registrar| {
                // inputs sorted: [catalog.loaded, downloads_cache.ready]
                let (loaded_archives, catalog_overwrites) =
                    downcast::<(Vec<Archive>, CacheOverwrites)>(&inputs[0]).map_err(|e| anyhow::anyhow!(e))?.clone();
                let (downloads, downloads_overwrites) =
                    downcast::<(FileMap, CacheOverwrites)>(&inputs[1]).map_err(|e| anyhow::anyhow!(e))?.clone();

                state.cache_data.merge(catalog_overwrites);
                state.cache_data.merge(downloads_overwrites);
                for archive in loaded_archives {
                    state.catalog.insert_archive(archive)?;
                }

                let mut to_hash: FxHashMap<Hash, PathBuf> = FxHashMap::default();
                for file in downloads.values() {
                    if state.catalog.archive_by_hash(&file.hash, false).is_some() {
                        continue; // cache hit: already a known archive, nothing to do
                    }
                    let path = Path::new(&file.file_path);
                    let Some(ext) = modvault_fs::lowercase_extension(path) else {
                        tracing::warn!(path = %file.file_path, "file has no extension, skipping");
                        continue;
                    };
                    if ext == META_EXTENSION {
                        continue; // origin sidecar, handled by origins_compute
                    }
                    if ext == SEVEN_ZIP_EXTENSION {
                        tracing::warn!(path = %file.file_path, "skipping .7z archive: BCJ2 filter unsupported");
                        continue;
                    }
                    if !handlers.is_registered(&ext) {
                        tracing::warn!(path = %file.file_path, extension = %ext, "unknown extension, skipping");
                        continue;
                    }
                    to_hash.entry(file.hash).or_insert_with(|| path.to_path_buf());
                }

                for (hash, path) in to_hash {
                    let size = downloads
                        .values()
                        .find(|f| f.hash == hash)
                        .map(|f| f.size)
                        .unwrap_or_default();
                    let handlers = Arc::clone(&handlers);
                    let tmpdir = Arc::clone(&tmpdir);
                    let scratch = Arc::clone(&scratch);
                    registrar.register_pure(format!("hash-{}", hash.to_hex()), vec![], move |_inputs| {
                        let archive = modvault_archive::hash_archive(&path, hash, size, &handlers, &tmpdir, &scratch)?;
                        Ok(Arc::new(archive) as TaskOutput)
                    });
                }

                registrar.replace_placeholder_with_coordinator(
                    "done_hashing",
                    vec!["hash-*".to_string()],
                    Some(TaskDataDependencies::new().writes(["catalog"])),
                    |state, inputs, _registrar| {
                        for output in inputs {
                            let archive = downcast::<Archive>(output).map_err(|e| anyhow::anyhow!(e))?.clone();
                            state.catalog.insert_archive(archive)?;
                        }
                        Ok(Arc::new(()) as TaskOutput)
                    },
                );

                let github_roots = Arc::clone(&github_roots);
                registrar.replace_placeholder_with_coordinator(
                    "ready",
                    vec![
                        "done_hashing".to_string(),
                        "github_cache.ready".to_string(),
                        "origins_ingest".to_string(),
                    ],
                    None,
                    move |state, inputs, _registrar| {
                        // inputs sorted: [done_hashing, github_cache.ready, origins_ingest]
                        let (github, _overwrites) = downcast::<(FileMap, CacheOverwrites)>(&inputs[1]).map_err(|e| anyhow::anyhow!(e))?.clone();

                        let mut github_by_hash: FxHashMap<Hash, Vec<GithubLocation>> = FxHashMap::default();
                        for file in github.values() {
                            let Some(root) = github_roots.iter().find(|r| file.file_path.starts_with(&r.normalized_root)) else {
                                continue;
                            };
                            let relative = file
                                .file_path
                                .strip_prefix(&root.normalized_root)
                                .unwrap_or(&file.file_path);
                            github_by_hash.entry(file.hash).or_default().push(GithubLocation {
                                size: file.size,
                                author: root.author.clone(),
                                project: root.project.clone(),
                                intra_path: modvault_fs::path_segments(relative),
                            });
                        }

                        state.github_by_hash = github_by_hash;
                        state.is_ready = true;
                        Ok(Arc::new(()) as TaskOutput)
                    },
                );

                Ok(Arc::new(()) as TaskOutput)
            },
        )?;

        let mut state = EngineState::new((*initial_cache_data).clone());
        scheduler.run(&mut state).await?;

        Ok(AvailabilityEngine { state })
    }
}

type LoadedCatalog = (Vec<Archive>, CacheOverwrites);

/// Load the archives journal via the memo (§4.G): parameters are the
/// journal path itself, so editing the journal on disk invalidates the
/// pickle regardless of the coordinator's own cache-bookkeeping.
fn load_catalog(cachedir: &Path, cache_data: &CacheData, journal_path: &Path) -> Result<LoadedCatalog, CoordinatorError> {
    if !journal_path.exists() {
        return Ok((Vec::new(), CacheOverwrites::new()));
    }

    let journal_path_buf = journal_path.to_path_buf();
    let params = journal_path.display().to_string();
    let (archives, overwrites) = modvault_cache::memo(
        cachedir,
        cache_data,
        "catalog",
        std::slice::from_ref(&journal_path_buf),
        |_params| {
            let text = fs_err::read_to_string(&journal_path_buf)?;
            modvault_journal::parse(&text).map_err(|err| anyhow::anyhow!(err))
        },
        &params,
    )?;
    Ok((archives, overwrites))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::sync::Arc;

    use modvault_catalog::Retriever;
    use modvault_plugins_zip::ZipHandler;

    use super::*;

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

    struct Dirs {
        downloads: tempfile::TempDir,
        github_folders: tempfile::TempDir,
        cachedir: tempfile::TempDir,
        tmpdir: tempfile::TempDir,
        rootgitdir: tempfile::TempDir,
    }

    impl Dirs {
        fn new() -> Self {
            Self {
                downloads: tempfile::tempdir().unwrap(),
                github_folders: tempfile::tempdir().unwrap(),
                cachedir: tempfile::tempdir().unwrap(),
                tmpdir: tempfile::tempdir().unwrap(),
                rootgitdir: tempfile::tempdir().unwrap(),
            }
        }

        fn coordinator(&self) -> AvailabilityCoordinator {
            AvailabilityCoordinator::new(
                registry(),
                self.cachedir.path(),
                self.tmpdir.path(),
                self.rootgitdir.path(),
                self.downloads.path(),
                self.github_folders.path(),
                CacheData::new(),
            )
        }
    }

    #[tokio::test]
    async fn first_run_hashes_and_writes_journal() {
        let dirs = Dirs::new();
        make_zip(&dirs.downloads.path().join("mod.zip"), &[("readme.txt", b"hello world")]);

        let engine = dirs.coordinator().run().await.unwrap();
        assert!(engine.is_ready());
        assert_eq!(engine.catalog().len(), 1);

        let journal_path = dirs.rootgitdir.path().join(JOURNAL_FILE_NAME);
        let journal_text = fs_err::read_to_string(&journal_path).unwrap();
        assert!(journal_text.starts_with("# modvault known-archives journal v1"));
        assert!(journal_text.contains("readme.txt"));
    }

    #[tokio::test]
    async fn second_run_is_a_cache_hit_and_does_not_rehash() {
        let dirs = Dirs::new();
        make_zip(&dirs.downloads.path().join("mod.zip"), &[("readme.txt", b"hello world")]);

        let first = dirs.coordinator().run().await.unwrap();
        assert_eq!(first.catalog().len(), 1);

        // Starting a second coordinator from scratch state but against the
        // same on-disk journal and cache directory reproduces the same
        // catalog without needing the archive re-extracted.
        let second = dirs.coordinator().run().await.unwrap();
        assert_eq!(second.catalog().len(), 1);
    }

    #[tokio::test]
    async fn empty_downloads_yields_a_ready_empty_catalog() {
        let dirs = Dirs::new();
        let engine = dirs.coordinator().run().await.unwrap();
        assert!(engine.is_ready());
        assert!(engine.catalog().is_empty());
    }

    #[tokio::test]
    async fn unknown_extension_is_skipped_without_failing_the_run() {
        let dirs = Dirs::new();
        fs_err::write(dirs.downloads.path().join("notes.rtf"), b"not an archive").unwrap();
        make_zip(&dirs.downloads.path().join("mod.zip"), &[("a.txt", b"data")]);

        let engine = dirs.coordinator().run().await.unwrap();
        assert_eq!(engine.catalog().len(), 1);
    }

    #[tokio::test]
    async fn meta_sidecar_becomes_a_file_origin() {
        let dirs = Dirs::new();
        let archive_path = dirs.downloads.path().join("mod.zip");
        make_zip(&archive_path, &[("a.txt", b"data")]);
        fs_err::write(format!("{}.meta", archive_path.display()), b"https://example.test/mod.zip\n").unwrap();

        let engine = dirs.coordinator().run().await.unwrap();
        let archive_hash = modvault_hash::hash_file(&archive_path).unwrap();
        match engine.catalog().archive_by_hash(&archive_hash, true) {
            Some(modvault_catalog::ArchiveLookup::Hashed(_)) => {}
            other => panic!("expected a hashed archive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nested_archive_produces_a_chained_retriever() {
        let dirs = Dirs::new();

        let inner_dir = tempfile::tempdir().unwrap();
        let inner_path = inner_dir.path().join("inner.zip");
        make_zip(&inner_path, &[("deep.bin", b"deep-contents")]);
        let inner_bytes = fs_err::read(&inner_path).unwrap();

        let outer_path = dirs.downloads.path().join("outer.zip");
        make_zip(&outer_path, &[("inner.zip", &inner_bytes)]);

        let engine = dirs.coordinator().run().await.unwrap();
        let deep_hash = modvault_hash::hash_file(&{
            let tmp = tempfile::NamedTempFile::new().unwrap();
            fs_err::write(tmp.path(), b"deep-contents").unwrap();
            tmp.path().to_path_buf()
        })
        .unwrap();

        let retrievers = engine.retrievers_by_hash(deep_hash).unwrap();
        assert_eq!(retrievers.len(), 1);
        match &retrievers[0] {
            Retriever::Archive { steps, .. } => assert_eq!(steps.len(), 2),
            other => panic!("expected a chained archive retriever, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn archived_retrievers_are_listed_before_github_retrievers() {
        let dirs = Dirs::new();
        let archive_path = dirs.downloads.path().join("mod.zip");
        make_zip(&archive_path, &[("a.txt", b"shared-content")]);

        let github_dir = dirs.github_folders.path().join("ModRepo");
        std::fs::create_dir_all(github_dir.join(".git")).unwrap();
        fs_err::write(
            github_dir.join(".git").join("config"),
            b"[remote \"origin\"]\n\turl = https://github.com/someone/ModRepo.git\n",
        )
        .unwrap();
        fs_err::write(github_dir.join("a.txt"), b"shared-content").unwrap();

        let engine = dirs.coordinator().run().await.unwrap();

        let content_hash = {
            let tmp = tempfile::NamedTempFile::new().unwrap();
            fs_err::write(tmp.path(), b"shared-content").unwrap();
            modvault_hash::hash_file(tmp.path()).unwrap()
        };

        let retrievers = engine.retrievers_by_hash(content_hash).unwrap();
        assert!(retrievers.len() >= 2);
        assert!(matches!(retrievers[0], Retriever::Archive { .. }));
        assert!(retrievers.iter().any(|r| matches!(r, Retriever::Github { .. })));
    }
}
