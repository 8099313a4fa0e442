use crate::error::{MirrorError, Result};
use crate::git::Repository;
use flate2::write::GzEncoder;
use flate2::Compression;
use git2::Oid;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// A merge recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub target: String,
    pub source: String,
    pub no_fast_forward: bool,
}

#[derive(Default)]
struct MockState {
    tags: BTreeMap<String, Oid>,
    branches: BTreeSet<String>,
    subtree_files: BTreeMap<String, String>,
    pending_changes: bool,
    staged: bool,
    commits: Vec<String>,
    merges: Vec<MergeRecord>,
    checkouts: Vec<String>,
    operations: Vec<String>,
}

/// Mock repository for testing without actual git operations
///
/// Holds tag/branch state in memory and records every operation in call
/// order, so tests can assert both outcomes and the exact step sequence the
/// pipeline drove. `archive_subtree` writes a real tar.gz from the
/// configured in-memory subtree so the packager can be exercised end to end.
pub struct MockRepository {
    workdir: PathBuf,
    state: Mutex<MockState>,
}

impl MockRepository {
    /// Create a mock whose working tree lives at `workdir`
    ///
    /// Starts with no tags or branches and with pending changes reported
    /// after staging, which is the common case for a build.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        MockRepository {
            workdir: workdir.into(),
            state: Mutex::new(MockState {
                pending_changes: true,
                ..MockState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an existing tag
    pub fn add_tag(&self, name: impl Into<String>, oid: Oid) {
        self.lock().tags.insert(name.into(), oid);
    }

    /// Add an existing branch
    pub fn add_branch(&self, name: impl Into<String>) {
        self.lock().branches.insert(name.into());
    }

    /// Add a file to the subtree served by `archive_subtree`
    pub fn add_subtree_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.lock().subtree_files.insert(path.into(), content.into());
    }

    /// Script whether staging produces pending changes
    pub fn set_pending_changes(&self, pending: bool) {
        self.lock().pending_changes = pending;
    }

    /// Tag names currently in the mock
    pub fn tags(&self) -> Vec<String> {
        self.lock().tags.keys().cloned().collect()
    }

    /// Branch names currently in the mock
    pub fn branches(&self) -> Vec<String> {
        self.lock().branches.iter().cloned().collect()
    }

    /// Commit messages in creation order
    pub fn commits(&self) -> Vec<String> {
        self.lock().commits.clone()
    }

    /// Merges in creation order
    pub fn merges(&self) -> Vec<MergeRecord> {
        self.lock().merges.clone()
    }

    /// Checkout targets in call order
    pub fn checkouts(&self) -> Vec<String> {
        self.lock().checkouts.clone()
    }

    /// Every operation in call order, for step-sequence assertions
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }
}

impl Repository for MockRepository {
    fn workdir(&self) -> Result<PathBuf> {
        Ok(self.workdir.clone())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.tags())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self.branches())
    }

    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>> {
        Ok(self.lock().tags.get(tag_name).copied())
    }

    fn checkout(&self, refname: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.branches.contains(refname) && !state.tags.contains_key(refname) {
            return Err(MirrorError::repository(
                format!("git checkout {}", refname),
                format!("'{}' does not exist", refname),
            ));
        }
        state.checkouts.push(refname.to_string());
        state.operations.push(format!("checkout {}", refname));
        Ok(())
    }

    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()> {
        let mut state = self.lock();
        if state.branches.contains(name) {
            return Err(MirrorError::repository(
                format!("git branch {} {}", name, from_ref),
                format!("branch '{}' already exists", name),
            ));
        }
        state.branches.insert(name.to_string());
        state
            .operations
            .push(format!("branch {} from {}", name, from_ref));
        Ok(())
    }

    fn archive_subtree(&self, commit: Oid, subpath: &str, destination: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.subtree_files.is_empty() {
            return Err(MirrorError::repository(
                format!("git archive {}:{}", commit, subpath),
                format!("path '{}' does not exist at {}", subpath, commit),
            ));
        }

        let file = File::create(destination).map_err(|e| {
            MirrorError::filesystem(format!(
                "cannot create archive {}: {}",
                destination.display(),
                e
            ))
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, content) in &state.subtree_files {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(content.len() as u64);
            header.set_mtime(0);
            builder.append_data(&mut header, path, content.as_bytes())?;
        }

        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(MirrorError::Io)?;

        state
            .operations
            .push(format!("archive {}:{}", commit, subpath));
        Ok(())
    }

    fn remove_tracked_files(&self) -> Result<()> {
        self.lock().operations.push("clean".to_string());
        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        let mut state = self.lock();
        state.staged = true;
        state.operations.push("stage".to_string());
        Ok(())
    }

    fn has_pending_changes(&self) -> Result<bool> {
        Ok(self.lock().pending_changes)
    }

    fn commit(&self, message: &str) -> Result<()> {
        let mut state = self.lock();
        // Mirrors the real backend: committing with nothing staged fails.
        if !state.staged || !state.pending_changes {
            return Err(MirrorError::repository(
                format!("git commit -m \"{}\"", message),
                "nothing to commit",
            ));
        }
        state.commits.push(message.to_string());
        state.operations.push(format!("commit {}", message));
        Ok(())
    }

    fn create_tag(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.tags.contains_key(name) {
            return Err(MirrorError::repository(
                format!("git tag {}", name),
                format!("tag '{}' already exists", name),
            ));
        }
        state.tags.insert(name.to_string(), Oid::zero());
        state.operations.push(format!("tag {}", name));
        Ok(())
    }

    fn merge_into(&self, target: &str, source: &str, no_fast_forward: bool) -> Result<()> {
        let mut state = self.lock();
        if !state.branches.contains(target) || !state.branches.contains(source) {
            return Err(MirrorError::repository(
                format!("git merge --no-ff {}", source),
                "branch does not exist",
            ));
        }
        state.merges.push(MergeRecord {
            target: target.to_string(),
            source: source.to_string(),
            no_fast_forward,
        });
        state
            .operations
            .push(format!("merge {} into {}", source, target));
        Ok(())
    }
}
