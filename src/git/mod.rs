//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the two repositories
//! the mirror drives: the upstream source repository (read-mostly: tag list
//! and archive-by-subtree access) and the downstream package repository
//! (read-write: branches, checkout, commit, tag, merge).
//!
//! The primary abstraction is the [Repository] trait. Concrete
//! implementations:
//!
//! - [repository::Git2Repository]: the real implementation using the `git2`
//!   crate
//! - [mock::MockRepository]: an in-memory implementation for testing
//!
//! The selector and pipeline depend only on the trait, so the core can be
//! exercised against the mock and re-targeted to a different backend without
//! touching pipeline logic.

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use crate::error::Result;
use git2::Oid;
use std::path::{Path, PathBuf};

/// Capability interface over one version-control repository
///
/// One handle is bound to the source repository and one to the package
/// repository for the lifetime of a run. All methods are synchronous and
/// block until complete. Failures map to
/// [MirrorError::Repository](crate::error::MirrorError::Repository),
/// carrying the failing operation for diagnosis; none of them are retried.
pub trait Repository: Send + Sync {
    /// Root of the repository's working tree
    fn workdir(&self) -> Result<PathBuf>;

    /// All tag names currently in the repository
    fn list_tags(&self) -> Result<Vec<String>>;

    /// All local branch names
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Resolve a tag name to the commit it points to
    ///
    /// Handles both lightweight and annotated tags. Returns `Ok(None)` if
    /// the tag does not exist.
    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>>;

    /// Switch the working tree to a branch or tag
    ///
    /// Fails if the target does not exist or the working tree cannot be
    /// switched (e.g. uncommitted conflicting changes).
    fn checkout(&self, refname: &str) -> Result<()>;

    /// Create a branch from an existing ref
    ///
    /// Fails if `name` already exists.
    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()>;

    /// Write a gzip-compressed tar archive of `subpath` as of `commit`
    ///
    /// Fails if the path does not exist at that commit.
    fn archive_subtree(&self, commit: Oid, subpath: &str, destination: &Path) -> Result<()>;

    /// Delete all tracked files from the working tree
    ///
    /// Scoped to files recorded in the index; untracked and ignored files
    /// are left alone.
    fn remove_tracked_files(&self) -> Result<()>;

    /// Stage every change in the working tree, including deletions
    fn stage_all(&self) -> Result<()>;

    /// Whether the index differs from the last commit
    ///
    /// Callers must consult this before [Repository::commit]: committing
    /// with nothing staged is an error, not a no-op.
    fn has_pending_changes(&self) -> Result<bool>;

    /// Record the staged changes as a commit on the checked-out branch
    fn commit(&self, message: &str) -> Result<()>;

    /// Create a lightweight tag on the current HEAD
    ///
    /// Fails if the tag already exists.
    fn create_tag(&self, name: &str) -> Result<()>;

    /// Merge `source` into `target`
    ///
    /// With `no_fast_forward` a merge commit is always created even when a
    /// fast-forward would be possible, preserving each release line's
    /// integration point. Merging a source that is already reachable from
    /// `target` is a no-op.
    fn merge_into(&self, target: &str, source: &str, no_fast_forward: bool) -> Result<()>;
}
