use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache_data::CacheData;
use crate::timestamp::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum MemoError {
    #[error("failed to serialize memo result: {0}")]
    Encode(#[source] rmp_serde::encode::Error),
    #[error("failed to stat input file {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write memo file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dependency {0} mutated mid-compute")]
    Race(PathBuf),
    #[error(transparent)]
    Compute(#[from] anyhow::Error),
}

/// Overwrites a caller should merge into its [`CacheData`] after a memo
/// call, per the `memo()` contract in the availability engine's design:
/// `{"<prefix>.files": snapshot, "<prefix>.params": params}`.
pub type CacheOverwrites = BTreeMap<String, Value>;

fn snapshot(input_files: &[PathBuf]) -> Result<Vec<(String, Timestamp)>, MemoError> {
    let mut out = Vec::with_capacity(input_files.len());
    for path in input_files {
        let mtime = Timestamp::from_path(path).map_err(|source| MemoError::Stat {
            path: path.clone(),
            source,
        })?;
        out.push((path.to_string_lossy().into_owned(), mtime));
    }
    out.sort();
    Ok(out)
}

fn stored_snapshot(cache_data: &CacheData, prefix: &str) -> Option<Vec<(String, Timestamp)>> {
    let value = cache_data.get(&CacheData::files_key(prefix))?;
    serde_json::from_value(value.clone()).ok()
}

fn pickle_path(cachedir: &Path, prefix: &str) -> PathBuf {
    cachedir.join(format!("{prefix}.pickle"))
}

/// Try to load a previously stored memo result, iff the stored `params` and
/// input-file `(path, mtime)` snapshot both match the current state.
///
/// Corruption in the pickle file is treated as a miss, never an error.
fn try_load<T: DeserializeOwned>(
    cachedir: &Path,
    cache_data: &CacheData,
    prefix: &str,
    input_files: &[PathBuf],
    canonical_params: &Value,
) -> Result<Option<T>, MemoError> {
    let Some(stored_params) = cache_data.get(&CacheData::params_key(prefix)) else {
        return Ok(None);
    };
    if stored_params != canonical_params {
        return Ok(None);
    }

    let Some(stored_files) = stored_snapshot(cache_data, prefix) else {
        return Ok(None);
    };
    let current_files = snapshot(input_files)?;
    if stored_files != current_files {
        return Ok(None);
    }

    let path = pickle_path(cachedir, prefix);
    let Ok(bytes) = fs::read(&path) else {
        return Ok(None);
    };
    match rmp_serde::from_slice::<T>(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "memo file corrupt, treating as miss");
            Ok(None)
        }
    }
}

fn write_pickle<T: Serialize>(cachedir: &Path, prefix: &str, value: &T) -> Result<(), MemoError> {
    let bytes = rmp_serde::to_vec(value).map_err(MemoError::Encode)?;
    let path = pickle_path(cachedir, prefix);
    fs::create_dir_all(cachedir).map_err(|source| MemoError::Write {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, bytes).map_err(|source| MemoError::Write { path, source })
}

/// `memo(cachedir, cachedata, prefix, input_files, compute, params)`.
///
/// Reusable iff `params` canonicalizes equal to the stored params and the
/// `(path, mtime)` set over `input_files` equals the stored set. On a miss,
/// runs `compute`, re-snapshots `input_files`, and fails with
/// [`MemoError::Race`] if any input mutated mid-compute.
pub fn memo<T, P, F>(
    cachedir: &Path,
    cache_data: &CacheData,
    prefix: &str,
    input_files: &[PathBuf],
    compute: F,
    params: P,
) -> Result<(T, CacheOverwrites), MemoError>
where
    T: Serialize + DeserializeOwned,
    P: Serialize,
    F: FnOnce(&Value) -> Result<T, anyhow::Error>,
{
    let canonical_params = serde_json::to_value(&params).unwrap_or(Value::Null);

    if let Some(result) = try_load::<T>(cachedir, cache_data, prefix, input_files, &canonical_params)? {
        return Ok((result, CacheOverwrites::new()));
    }

    let before = snapshot(input_files)?;
    let result = compute(&canonical_params)?;
    let after = snapshot(input_files)?;
    if before != after {
        let changed = before
            .iter()
            .zip(after.iter())
            .find(|(b, a)| b != a)
            .map(|(b, _)| PathBuf::from(&b.0))
            .unwrap_or_else(|| input_files.first().cloned().unwrap_or_default());
        return Err(MemoError::Race(changed));
    }

    write_pickle(cachedir, prefix, &result)?;

    let mut overwrites = CacheOverwrites::new();
    overwrites.insert(
        CacheData::files_key(prefix),
        serde_json::to_value(&after).unwrap_or(Value::Null),
    );
    overwrites.insert(CacheData::params_key(prefix), canonical_params);

    Ok((result, overwrites))
}

/// Unconditionally recompute and persist a memo, bypassing the validity
/// check.
///
/// [`FolderCache`](crate::FolderCache) calls this after it has already
/// walked the filesystem and knows the result is current: the filesystem
/// tree itself is the real dependency, and it has no finite `input_files`
/// list, so its freshness is established by the walk, not by `memo`'s
/// mtime check.
pub fn store<T: Serialize, P: Serialize>(
    cachedir: &Path,
    prefix: &str,
    result: &T,
    params: &P,
) -> Result<CacheOverwrites, MemoError> {
    write_pickle(cachedir, prefix, result)?;
    let mut overwrites = CacheOverwrites::new();
    overwrites.insert(
        CacheData::files_key(prefix),
        serde_json::to_value(Vec::<(String, Timestamp)>::new()).unwrap_or(Value::Null),
    );
    overwrites.insert(
        CacheData::params_key(prefix),
        serde_json::to_value(params).unwrap_or(Value::Null),
    );
    Ok(overwrites)
}
