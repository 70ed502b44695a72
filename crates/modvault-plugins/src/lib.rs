//! The archive handler plugin contract and the process-wide registry that
//! maps a file extension to the handler responsible for it.
//!
//! Handlers are not discovered by filesystem introspection at runtime (the
//! original system's dynamic-loading approach); they are registered once,
//! at construction, by whoever assembles the availability coordinator —
//! the "explicit registry... constructed once at process init" redesign.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("archive is corrupt or unreadable: {0}")]
    ArchiveCorrupt(String),
    #[error("archive member is of an unsupported kind: {0}")]
    UnsupportedMember(String),
    #[error("this handler does not support per-member extraction")]
    PerMemberExtractionUnsupported,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("extension {extension} is claimed by more than one handler ({first} and {second})")]
    DuplicateExtension {
        extension: String,
        first: &'static str,
        second: &'static str,
    },
}

/// A plugin capable of extracting one or more archive extensions.
///
/// Implementations must never follow symlinks inside archives and must
/// leave `target_dir` empty if extraction fails partway — callers are
/// responsible for removing and recreating the scratch directory between
/// attempts.
pub trait ArchiveHandler: Send + Sync {
    /// A human-readable name, used only for registry-conflict diagnostics.
    fn name(&self) -> &'static str;

    /// Lowercase extensions (including the leading dot) this handler claims.
    fn extensions(&self) -> &[&'static str];

    /// Extract every member of `archive_path` into `target_dir`.
    ///
    /// `target_dir` exists and is empty on entry.
    fn extract_all(&self, archive_path: &Path, target_dir: &Path) -> Result<(), HandlerError>;

    /// Extract only the named members, in order, returning the path each was
    /// extracted to, or `None` for a member that does not exist in the
    /// archive.
    ///
    /// The default implementation reports that this handler does not
    /// support per-member extraction; `extract_all` is always required.
    fn extract(
        &self,
        _archive_path: &Path,
        _members: &[String],
        _target_dir: &Path,
    ) -> Result<Vec<Option<PathBuf>>, HandlerError> {
        Err(HandlerError::PerMemberExtractionUnsupported)
    }
}

/// A process-wide, immutable map from lowercase extension to handler.
///
/// Constructed once, at coordinator construction, from the explicit list of
/// handlers the caller wants. At most one handler may claim a given
/// extension; a conflict is a configuration error, reported at startup, not
/// silently resolved.
pub struct HandlerRegistry {
    by_extension: FxHashMap<String, Arc<dyn ArchiveHandler>>,
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn ArchiveHandler>>) -> Result<Self, RegistryError> {
        let mut by_extension: FxHashMap<String, Arc<dyn ArchiveHandler>> = FxHashMap::default();
        for handler in handlers {
            for &ext in handler.extensions() {
                let ext = ext.to_lowercase();
                if let Some(existing) = by_extension.get(&ext) {
                    return Err(RegistryError::DuplicateExtension {
                        extension: ext,
                        first: existing.name(),
                        second: handler.name(),
                    });
                }
                by_extension.insert(ext, Arc::clone(&handler));
            }
        }
        Ok(Self { by_extension })
    }

    /// An empty registry: useful for coordinators that handle no archive
    /// formats (e.g. unit tests of unrelated components).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_extension: FxHashMap::default(),
        }
    }

    /// Look up the handler for `path` by its lowercase extension.
    #[must_use]
    pub fn handler_for(&self, path: &Path) -> Option<Arc<dyn ArchiveHandler>> {
        let ext = modvault_fs::lowercase_extension(path)?;
        self.by_extension.get(&ext).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, extension: &str) -> bool {
        self.by_extension.contains_key(&extension.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str, &'static [&'static str]);
    impl ArchiveHandler for Stub {
        fn name(&self) -> &'static str {
            self.0
        }
        fn extensions(&self) -> &[&'static str] {
            self.1
        }
        fn extract_all(&self, _archive_path: &Path, _target_dir: &Path) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_extensions_are_rejected() {
        let a: Arc<dyn ArchiveHandler> = Arc::new(Stub("a", &[".zip"]));
        let b: Arc<dyn ArchiveHandler> = Arc::new(Stub("b", &[".zip"]));
        let err = HandlerRegistry::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateExtension { .. }));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let handler: Arc<dyn ArchiveHandler> = Arc::new(Stub("zip", &[".zip"]));
        let registry = HandlerRegistry::new(vec![handler]).unwrap();
        assert!(registry.handler_for(Path::new("Archive.ZIP")).is_some());
        assert!(registry.handler_for(Path::new("notes.txt")).is_none());
    }
}
