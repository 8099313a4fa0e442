use crate::domain::ReleaseTag;
use crate::error::{MirrorError, Result};
use crate::git::Repository;
use flate2::read::GzDecoder;
use log::debug;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Stages one tag's files into the package repository's working tree
///
/// Owns the scratch build area: the archive extracted from the source
/// repository lands there first, then selected directories and the static
/// template files are projected into the package working tree. The scratch
/// area is transient; [Packager::reset_scratch] wipes it before every build.
pub struct Packager {
    scratch_root: PathBuf,
    templates_dir: PathBuf,
    package_workdir: PathBuf,
    source_subtree: String,
}

impl Packager {
    pub fn new(
        scratch_root: impl Into<PathBuf>,
        templates_dir: impl Into<PathBuf>,
        package_workdir: impl Into<PathBuf>,
        source_subtree: impl Into<String>,
    ) -> Self {
        Packager {
            scratch_root: scratch_root.into(),
            templates_dir: templates_dir.into(),
            package_workdir: package_workdir.into(),
            source_subtree: source_subtree.into(),
        }
    }

    /// Wipe and recreate the scratch area
    ///
    /// Exactly one scratch area exists at a time; it is fully cleared
    /// before each tag's pipeline begins.
    pub fn reset_scratch(&self) -> Result<()> {
        if self.scratch_root.exists() {
            fs::remove_dir_all(&self.scratch_root).map_err(|e| {
                MirrorError::filesystem(format!(
                    "cannot clear scratch area {}: {}",
                    self.scratch_root.display(),
                    e
                ))
            })?;
        }
        fs::create_dir_all(&self.scratch_root).map_err(|e| {
            MirrorError::filesystem(format!(
                "cannot create scratch area {}: {}",
                self.scratch_root.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Extract the packaged subtree at the tag's commit and mirror it into
    /// the package working tree
    ///
    /// The archive is unpacked under the scratch area, then every depth-0
    /// directory except `tests` is mirrored to the same relative path in
    /// the package repository. If extraction fails nothing is staged, so a
    /// failed tag never leaves a partial mirror behind.
    pub fn extract_and_stage(&self, tag: &ReleaseTag, source: &dyn Repository) -> Result<()> {
        let archive_path = self.scratch_root.join("source.tar.gz");
        source.archive_subtree(tag.commit, &self.source_subtree, &archive_path)?;

        let extracted = self.scratch_root.join("source");
        fs::create_dir_all(&extracted).map_err(|e| {
            MirrorError::filesystem(format!("cannot create {}: {}", extracted.display(), e))
        })?;

        let file = File::open(&archive_path).map_err(|e| {
            MirrorError::filesystem(format!("cannot open {}: {}", archive_path.display(), e))
        })?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.unpack(&extracted).map_err(|e| {
            MirrorError::filesystem(format!(
                "cannot unpack {} into {}: {}",
                archive_path.display(),
                extracted.display(),
                e
            ))
        })?;

        for entry in fs::read_dir(&extracted).map_err(|e| {
            MirrorError::filesystem(format!("cannot read {}: {}", extracted.display(), e))
        })? {
            let entry = entry.map_err(|e| {
                MirrorError::filesystem(format!("cannot read {}: {}", extracted.display(), e))
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            if name == "tests" {
                continue;
            }

            debug!("Mirroring directory {}", name.to_string_lossy());
            mirror(&entry.path(), &self.package_workdir.join(&name))?;
        }

        Ok(())
    }

    /// Copy every template file into the package working tree
    ///
    /// Templates are static, version-independent scaffolding supplied by
    /// the operator; existing files are overwritten.
    pub fn copy_templates(&self) -> Result<()> {
        for entry in WalkDir::new(&self.templates_dir) {
            let entry = entry.map_err(|e| {
                MirrorError::filesystem(format!(
                    "cannot walk templates {}: {}",
                    self.templates_dir.display(),
                    e
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.templates_dir).map_err(|e| {
                MirrorError::filesystem(format!(
                    "template path {} escapes {}: {}",
                    entry.path().display(),
                    self.templates_dir.display(),
                    e
                ))
            })?;

            debug!("Copying file {}", relative.display());

            let destination = self.package_workdir.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    MirrorError::filesystem(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
            fs::copy(entry.path(), &destination).map_err(|e| {
                MirrorError::filesystem(format!(
                    "cannot copy {} to {}: {}",
                    entry.path().display(),
                    destination.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

/// Recursively copy `src` into `dst`, overwriting existing files but never
/// removing destination files absent from the source
fn mirror(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .map_err(|e| MirrorError::filesystem(format!("cannot create {}: {}", dst.display(), e)))?;

    for entry in fs::read_dir(src)
        .map_err(|e| MirrorError::filesystem(format!("cannot read {}: {}", src.display(), e)))?
    {
        let entry = entry
            .map_err(|e| MirrorError::filesystem(format!("cannot read {}: {}", src.display(), e)))?;
        let target = dst.join(entry.file_name());

        if entry.path().is_dir() {
            mirror(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                MirrorError::filesystem(format!(
                    "cannot copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}
