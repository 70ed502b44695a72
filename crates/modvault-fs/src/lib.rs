//! Small filesystem helpers shared by the cache, archive, and catalog crates.
//!
//! Every path that crosses a component boundary (cache keys, intra-paths,
//! journal rows) is normalized here first: forward slashes, case-folded on
//! case-insensitive filesystems. Components must never mix normalized and
//! raw paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns `true` on platforms whose default filesystem is case-insensitive.
///
/// This is a platform guess, not a per-filesystem probe: both Windows and
/// macOS default to case-insensitive (but case-preserving) filesystems.
#[must_use]
pub const fn platform_is_case_insensitive() -> bool {
    cfg!(any(target_os = "windows", target_os = "macos"))
}

/// Normalize a path string to the engine's canonical form: forward slashes,
/// case-folded when the platform default filesystem is case-insensitive.
///
/// This is purely a string transform; it does not touch the filesystem and
/// does not resolve `.`/`..` segments.
#[must_use]
pub fn normalize_path_string(raw: &str) -> String {
    let forward = raw.replace('\\', "/");
    if platform_is_case_insensitive() {
        forward.to_lowercase()
    } else {
        forward
    }
}

/// Split a normalized relative path into its segments, dropping empty
/// segments produced by leading/trailing/doubled slashes.
#[must_use]
pub fn path_segments(normalized: &str) -> Vec<String> {
    normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Join path segments with `/`, the canonical separator used in intra-paths
/// and journal rows.
#[must_use]
pub fn join_segments(segments: &[String]) -> String {
    segments.join("/")
}

/// Iterate over the immediate subdirectories of `root`.
///
/// Returns an empty iterator (rather than erroring) if `root` does not
/// exist, matching callers that probe optional cache-bucket subtrees.
pub fn directories(root: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    fs::read_dir(root.as_ref())
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
        .map(|entry| entry.path())
}

/// Enumerate all regular files under `root`, skipping any path whose
/// normalized, root-relative form matches one of `excludes` as a substring.
///
/// Symlinks are never followed; a symlinked file or directory is skipped
/// entirely, matching the hasher's refusal to follow symlinks.
pub fn walk_regular_files(root: &Path, excludes: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }

    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let normalized = normalize_path_string(&relative.to_string_lossy());
        if excludes.iter().any(|pat| normalized.contains(pat.as_str())) {
            continue;
        }
        out.push(path.to_path_buf());
    }
    Ok(out)
}

/// Return the lowercase extension of `path`, including the leading dot, or
/// `None` if the path has no extension.
#[must_use]
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes() {
        assert_eq!(normalize_path_string("a\\b\\c"), "a/b/c");
    }

    #[test]
    fn segments_drop_empties() {
        assert_eq!(
            path_segments("/a//b/"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn walk_skips_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.zip"), b"1").unwrap();
        fs::create_dir(dir.path().join("trash")).unwrap();
        fs::write(dir.path().join("trash/skip.zip"), b"2").unwrap();

        let files = walk_regular_files(dir.path(), &["trash".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.zip"));
    }

    #[test]
    fn lowercase_extension_includes_dot() {
        let p = Path::new("Archive.ZIP");
        assert_eq!(lowercase_extension(p), Some(".zip".to_string()));
    }
}
