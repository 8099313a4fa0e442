use crate::error::{MirrorError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use git2::{BranchType, Oid, Repository as Git2Repo};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Wrapper around git2::Repository implementing the [Repository] trait
///
/// Every failure is mapped to a repository error carrying the equivalent
/// git command line, so the controller can log exactly which operation
/// broke without this module knowing anything about logging.
///
/// [Repository]: super::Repository
pub struct Git2Repository {
    repo: Git2Repo,
}

impl Git2Repository {
    /// Open an existing repository at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::open(path.as_ref()).map_err(|e| {
            MirrorError::repository(
                format!("git open {}", path.as_ref().display()),
                e.message().to_string(),
            )
        })?;

        Ok(Git2Repository { repo })
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Git2Repo) -> Self {
        Git2Repository { repo }
    }

    fn op_err(operation: impl Into<String>, err: git2::Error) -> MirrorError {
        MirrorError::repository(operation, err.message().to_string())
    }

    fn branch_commit(&self, name: &str) -> Result<git2::Commit<'_>> {
        let operation = format!("git rev-parse {}", name);
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|e| Self::op_err(&operation, e))?;
        branch
            .get()
            .peel_to_commit()
            .map_err(|e| Self::op_err(&operation, e))
    }

    /// Recursively append a git tree's entries to a tar archive
    fn append_tree<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        tree: &git2::Tree<'_>,
        prefix: &str,
    ) -> Result<()> {
        for entry in tree.iter() {
            let name = entry.name().ok_or_else(|| {
                MirrorError::repository("git archive", "tree entry name is not valid UTF-8")
            })?;
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            };

            match entry.kind() {
                Some(git2::ObjectType::Tree) => {
                    let child = self
                        .repo
                        .find_tree(entry.id())
                        .map_err(|e| Self::op_err("git archive", e))?;

                    let mut header = tar::Header::new_gnu();
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    header.set_mtime(0);
                    builder.append_data(&mut header, format!("{}/", path), std::io::empty())?;

                    self.append_tree(builder, &child, &path)?;
                }
                Some(git2::ObjectType::Blob) => {
                    let blob = self
                        .repo
                        .find_blob(entry.id())
                        .map_err(|e| Self::op_err("git archive", e))?;

                    let mut header = tar::Header::new_gnu();
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(if entry.filemode() == 0o100755 {
                        0o755
                    } else {
                        0o644
                    });
                    header.set_size(blob.content().len() as u64);
                    header.set_mtime(0);
                    builder.append_data(&mut header, &path, blob.content())?;
                }
                // Submodules and symlinks are not part of the packaged subtree
                _ => continue,
            }
        }

        Ok(())
    }
}

impl super::Repository for Git2Repository {
    fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| MirrorError::repository("git worktree", "repository is bare"))
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let tags = self
            .repo
            .tag_names(None)
            .map_err(|e| Self::op_err("git tag --list", e))?;

        Ok(tags.iter().flatten().map(|s| s.to_string()).collect())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let branches = self
            .repo
            .branches(Some(BranchType::Local))
            .map_err(|e| Self::op_err("git branch --list", e))?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| Self::op_err("git branch --list", e))?;
            if let Some(name) = branch
                .name()
                .map_err(|e| Self::op_err("git branch --list", e))?
            {
                names.push(name.to_string());
            }
        }

        Ok(names)
    }

    fn find_tag_oid(&self, tag_name: &str) -> Result<Option<Oid>> {
        let reference_name = format!("refs/tags/{}", tag_name);

        match self.repo.find_reference(&reference_name) {
            Ok(reference) => {
                let commit = reference
                    .peel_to_commit()
                    .map_err(|e| Self::op_err(format!("git rev-parse {}", tag_name), e))?;
                Ok(Some(commit.id()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(Self::op_err(format!("git rev-parse {}", tag_name), e)),
        }
    }

    fn checkout(&self, refname: &str) -> Result<()> {
        let operation = format!("git checkout {}", refname);

        let (object, reference) = self
            .repo
            .revparse_ext(refname)
            .map_err(|e| Self::op_err(&operation, e))?;

        self.repo
            .checkout_tree(&object, None)
            .map_err(|e| Self::op_err(&operation, e))?;

        match reference {
            Some(gref) => {
                let name = gref.name().ok_or_else(|| {
                    MirrorError::repository(&operation, "reference name is not valid UTF-8")
                })?;
                self.repo.set_head(name)
            }
            None => self.repo.set_head_detached(object.id()),
        }
        .map_err(|e| Self::op_err(&operation, e))
    }

    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()> {
        let operation = format!("git branch {} {}", name, from_ref);

        if self.repo.find_branch(name, BranchType::Local).is_ok() {
            return Err(MirrorError::repository(
                operation,
                format!("branch '{}' already exists", name),
            ));
        }

        let commit = self
            .repo
            .revparse_single(from_ref)
            .and_then(|object| object.peel_to_commit())
            .map_err(|e| Self::op_err(&operation, e))?;

        self.repo
            .branch(name, &commit, false)
            .map_err(|e| Self::op_err(&operation, e))?;

        Ok(())
    }

    fn archive_subtree(&self, commit: Oid, subpath: &str, destination: &Path) -> Result<()> {
        let operation = format!("git archive {}:{}", commit, subpath);

        let tree = self
            .repo
            .find_commit(commit)
            .and_then(|c| c.tree())
            .map_err(|e| Self::op_err(&operation, e))?;

        // Fails when the path does not exist at this historical commit, or
        // names a file rather than a directory.
        let subtree = tree
            .get_path(Path::new(subpath))
            .and_then(|entry| self.repo.find_tree(entry.id()))
            .map_err(|e| Self::op_err(&operation, e))?;

        let file = File::create(destination).map_err(|e| {
            MirrorError::filesystem(format!(
                "cannot create archive {}: {}",
                destination.display(),
                e
            ))
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        self.append_tree(&mut builder, &subtree, "")?;

        builder
            .into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| {
                MirrorError::filesystem(format!(
                    "cannot finalize archive {}: {}",
                    destination.display(),
                    e
                ))
            })?;

        Ok(())
    }

    fn remove_tracked_files(&self) -> Result<()> {
        let workdir = self.workdir()?;
        let index = self
            .repo
            .index()
            .map_err(|e| Self::op_err("git ls-files", e))?;

        for entry in index.iter() {
            let rel = String::from_utf8_lossy(&entry.path).to_string();
            let path = workdir.join(&rel);
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| {
                    MirrorError::filesystem(format!("cannot remove {}: {}", path.display(), e))
                })?;
            }
        }

        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        let operation = "git add --all";

        let mut index = self.repo.index().map_err(|e| Self::op_err(operation, e))?;
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .map_err(|e| Self::op_err(operation, e))?;
        index
            .update_all(["*"], None)
            .map_err(|e| Self::op_err(operation, e))?;
        index.write().map_err(|e| Self::op_err(operation, e))?;

        Ok(())
    }

    fn has_pending_changes(&self) -> Result<bool> {
        let operation = "git status";

        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree().map_err(|e| Self::op_err(operation, e))?),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                None
            }
            Err(e) => return Err(Self::op_err(operation, e)),
        };

        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), None, None)
            .map_err(|e| Self::op_err(operation, e))?;

        Ok(diff.deltas().len() > 0)
    }

    fn commit(&self, message: &str) -> Result<()> {
        let operation = format!("git commit -m \"{}\"", message);

        let mut index = self.repo.index().map_err(|e| Self::op_err(&operation, e))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| Self::op_err(&operation, e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| Self::op_err(&operation, e))?;

        let signature = self
            .repo
            .signature()
            .map_err(|e| Self::op_err(&operation, e))?;

        let parent = match self.repo.head() {
            Ok(head) => Some(
                head.peel_to_commit()
                    .map_err(|e| Self::op_err(&operation, e))?,
            ),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                None
            }
            Err(e) => return Err(Self::op_err(&operation, e)),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(|e| Self::op_err(&operation, e))?;

        Ok(())
    }

    fn create_tag(&self, name: &str) -> Result<()> {
        let operation = format!("git tag {}", name);

        let head = self
            .repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| Self::op_err(&operation, e))?;

        self.repo
            .tag_lightweight(name, head.as_object(), false)
            .map_err(|e| Self::op_err(&operation, e))?;

        Ok(())
    }

    fn merge_into(&self, target: &str, source: &str, no_fast_forward: bool) -> Result<()> {
        let operation = if no_fast_forward {
            format!("git merge --no-ff {}", source)
        } else {
            format!("git merge {}", source)
        };

        let target_commit = self.branch_commit(target)?;
        let source_commit = self.branch_commit(source)?;

        let base = self
            .repo
            .merge_base(target_commit.id(), source_commit.id())
            .map_err(|e| Self::op_err(&operation, e))?;

        // Source already reachable from target: nothing to integrate.
        if base == source_commit.id() {
            return Ok(());
        }

        if !no_fast_forward && base == target_commit.id() {
            let mut reference = self
                .repo
                .find_reference(&format!("refs/heads/{}", target))
                .map_err(|e| Self::op_err(&operation, e))?;
            reference
                .set_target(
                    source_commit.id(),
                    &format!("merge {}: fast-forward", source),
                )
                .map_err(|e| Self::op_err(&operation, e))?;
        } else {
            let mut merged_index = self
                .repo
                .merge_commits(&target_commit, &source_commit, None)
                .map_err(|e| Self::op_err(&operation, e))?;

            if merged_index.has_conflicts() {
                return Err(MirrorError::repository(
                    operation,
                    "merge produced conflicts",
                ));
            }

            let tree_id = merged_index
                .write_tree_to(&self.repo)
                .map_err(|e| Self::op_err(&operation, e))?;
            let tree = self
                .repo
                .find_tree(tree_id)
                .map_err(|e| Self::op_err(&operation, e))?;
            let signature = self
                .repo
                .signature()
                .map_err(|e| Self::op_err(&operation, e))?;

            self.repo
                .commit(
                    Some(&format!("refs/heads/{}", target)),
                    &signature,
                    &signature,
                    &format!("Merge branch '{}' into {}", source, target),
                    &tree,
                    &[&target_commit, &source_commit],
                )
                .map_err(|e| Self::op_err(&operation, e))?;
        }

        // Sync the working tree when the merged branch is checked out.
        if let Ok(head) = self.repo.head() {
            if head.shorthand() == Some(target) {
                let mut checkout = git2::build::CheckoutBuilder::new();
                checkout.force();
                self.repo
                    .checkout_head(Some(&mut checkout))
                    .map_err(|e| Self::op_err(&operation, e))?;
            }
        }

        Ok(())
    }
}

// SAFETY: Git2Repository wraps git2::Repository which is Send + Sync.
// git2 library is thread-safe for read operations via libgit2's thread-safe design.
unsafe impl Sync for Git2Repository {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Repository;
    use tempfile::TempDir;

    fn init_repo_with_commit() -> (TempDir, Git2Repository, Oid) {
        let temp_dir = TempDir::new().expect("Could not create temp dir");
        let repo = Git2Repo::init(temp_dir.path()).expect("Could not init git repo");

        {
            let mut config = repo.config().expect("Could not get config");
            config
                .set_str("user.name", "Test User")
                .expect("Could not set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Could not set user.email");
        }

        std::fs::write(temp_dir.path().join("README.md"), "Initial content\n")
            .expect("Could not write initial file");

        let mut index = repo.index().expect("Could not get index");
        index
            .add_path(Path::new("README.md"))
            .expect("Could not add file to index");
        index.write().expect("Could not write index");

        let tree_id = index.write_tree().expect("Could not write tree");
        let tree = repo.find_tree(tree_id).expect("Could not find tree");
        let signature = repo.signature().expect("Could not get sig");

        let commit_id = repo
            .commit(
                Some("refs/heads/master"),
                &signature,
                &signature,
                "Initial commit",
                &tree,
                &[],
            )
            .expect("Could not create commit");
        repo.set_head("refs/heads/master").expect("Could not set HEAD");

        drop(tree);
        (temp_dir, Git2Repository::from_git2(repo), commit_id)
    }

    #[test]
    fn test_checkout_missing_ref_fails() {
        let (_dir, repo, _head) = init_repo_with_commit();
        let err = repo.checkout("no-such-branch").unwrap_err();
        assert_eq!(
            err.failed_operation(),
            Some("git checkout no-such-branch")
        );
    }

    #[test]
    fn test_create_branch_twice_fails() {
        let (_dir, repo, _head) = init_repo_with_commit();
        repo.create_branch("3.9", "master").unwrap();
        assert!(repo.create_branch("3.9", "master").is_err());
        assert!(repo.list_branches().unwrap().contains(&"3.9".to_string()));
    }

    #[test]
    fn test_create_tag_twice_fails() {
        let (_dir, repo, _head) = init_repo_with_commit();
        repo.create_tag("3.9.0").unwrap();
        assert!(repo.create_tag("3.9.0").is_err());
        assert_eq!(repo.list_tags().unwrap(), vec!["3.9.0".to_string()]);
    }

    #[test]
    fn test_find_tag_oid_missing_is_none() {
        let (_dir, repo, _head) = init_repo_with_commit();
        assert_eq!(repo.find_tag_oid("3.9.0").unwrap(), None);
        repo.create_tag("3.9.0").unwrap();
        assert!(repo.find_tag_oid("3.9.0").unwrap().is_some());
    }

    #[test]
    fn test_archive_subtree_missing_path_fails() {
        let (_dir, repo, head) = init_repo_with_commit();

        let dest = repo.workdir().unwrap().join("out.tar.gz");
        let err = repo
            .archive_subtree(head, "tests/phpunit", &dest)
            .unwrap_err();
        assert!(err.to_string().contains("git archive"));
    }

    #[test]
    fn test_has_pending_changes_after_staging() {
        let (dir, repo, _head) = init_repo_with_commit();

        repo.stage_all().unwrap();
        assert!(!repo.has_pending_changes().unwrap());

        std::fs::write(dir.path().join("new.txt"), "content\n").unwrap();
        repo.stage_all().unwrap();
        assert!(repo.has_pending_changes().unwrap());

        repo.commit("Building 3.9.0").unwrap();
        repo.stage_all().unwrap();
        assert!(!repo.has_pending_changes().unwrap());
    }

    #[test]
    fn test_remove_tracked_files_leaves_untracked() {
        let (dir, repo, _head) = init_repo_with_commit();

        std::fs::write(dir.path().join("untracked.txt"), "keep me\n").unwrap();
        repo.remove_tracked_files().unwrap();

        assert!(!dir.path().join("README.md").exists());
        assert!(dir.path().join("untracked.txt").exists());
    }
}
