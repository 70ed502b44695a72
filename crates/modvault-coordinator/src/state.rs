use modvault_cache::CacheData;
use modvault_catalog::Catalog;
use modvault_hash::Hash;
use rustc_hash::FxHashMap;

/// A tracked GitHub-backed folder discovered under `github_folders` at
/// coordinator construction time.
#[derive(Debug, Clone)]
pub(crate) struct GithubRoot {
    pub(crate) normalized_root: String,
    pub(crate) author: String,
    pub(crate) project: String,
}

/// Where a single hash lives inside a tracked GitHub folder.
#[derive(Debug, Clone)]
pub(crate) struct GithubLocation {
    pub(crate) size: u64,
    pub(crate) author: String,
    pub(crate) project: String,
    pub(crate) intra_path: Vec<String>,
}

/// The coordinator's mutable, single-writer state — mutated only from
/// coordinator tasks running serialized on the scheduler's coordinator
/// thread (§5: "race-free without locking").
pub(crate) struct EngineState {
    pub(crate) catalog: Catalog,
    pub(crate) cache_data: CacheData,
    pub(crate) github_by_hash: FxHashMap<Hash, Vec<GithubLocation>>,
    pub(crate) is_ready: bool,
}

impl EngineState {
    pub(crate) fn new(cache_data: CacheData) -> Self {
        Self {
            catalog: Catalog::new(),
            cache_data,
            github_by_hash: FxHashMap::default(),
            is_ready: false,
        }
    }
}
