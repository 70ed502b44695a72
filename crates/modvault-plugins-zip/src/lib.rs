//! A `.zip` [`ArchiveHandler`], standing in for the format-specific plugins
//! (BSA, 7z, …) that are out of scope for the availability engine itself.

use std::fs;
use std::path::{Path, PathBuf};

use modvault_plugins::{ArchiveHandler, HandlerError};

/// Extracts `.zip` archives via the `zip` crate.
#[derive(Debug, Default)]
pub struct ZipHandler;

impl ZipHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open(archive_path: &Path) -> Result<zip::ZipArchive<fs::File>, HandlerError> {
        let file = fs::File::open(archive_path)?;
        zip::ZipArchive::new(file)
            .map_err(|err| HandlerError::ArchiveCorrupt(format!("{}: {err}", archive_path.display())))
    }
}

impl ArchiveHandler for ZipHandler {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".zip"]
    }

    fn extract_all(&self, archive_path: &Path, target_dir: &Path) -> Result<(), HandlerError> {
        let mut archive = Self::open(archive_path)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|err| HandlerError::ArchiveCorrupt(err.to_string()))?;

            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                tracing::warn!(entry = entry.name(), "skipping zip entry with unsafe path");
                continue;
            };
            let out_path = target_dir.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out_file = fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out_file)?;
        }

        Ok(())
    }

    fn extract(
        &self,
        archive_path: &Path,
        members: &[String],
        target_dir: &Path,
    ) -> Result<Vec<Option<PathBuf>>, HandlerError> {
        let mut archive = Self::open(archive_path)?;
        let mut out = Vec::with_capacity(members.len());

        for member in members {
            match archive.by_name(member) {
                Ok(mut entry) => {
                    let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                        out.push(None);
                        continue;
                    };
                    let out_path = target_dir.join(&relative);
                    if let Some(parent) = out_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut out_file = fs::File::create(&out_path)?;
                    std::io::copy(&mut entry, &mut out_file)?;
                    out.push(Some(out_path));
                }
                Err(zip::result::ZipError::FileNotFound) => out.push(None),
                Err(err) => return Err(HandlerError::ArchiveCorrupt(err.to_string())),
            }
        }

        Ok(out)
    }
}
