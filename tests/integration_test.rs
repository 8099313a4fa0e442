// tests/integration_test.rs
//
// End-to-end runs against real git repositories: an upstream source repo
// carrying a packaged subtree under tests/phpunit, and a downstream package
// repo that receives mirrored content, tags, release-line branches, and
// merge commits.

use git2::{Oid, Repository as Git2Repo};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use tag_mirror::git::{Git2Repository, Repository};
use tag_mirror::packager::Packager;
use tag_mirror::pipeline::BuildPipeline;
use tag_mirror::runner::{self, RunSummary};

fn init_repo(path: &Path) -> Git2Repo {
    let repo = Git2Repo::init(path).expect("Could not init git repo");

    {
        let mut config = repo.config().expect("Could not get config");
        config
            .set_str("user.name", "Test User")
            .expect("Could not set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Could not set user.email");
    }

    // Pin the default branch name regardless of the host git configuration
    repo.set_head("refs/heads/master")
        .expect("Could not set HEAD");
    repo
}

fn commit_all(repo: &Git2Repo, message: &str) -> Oid {
    let mut index = repo.index().expect("Could not get index");
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .expect("Could not add files");
    index.update_all(["*"], None).expect("Could not update");
    index.write().expect("Could not write index");

    let tree_id = index.write_tree().expect("Could not write tree");
    let tree = repo.find_tree(tree_id).expect("Could not find tree");
    let signature = repo.signature().expect("Could not get sig");

    let parent = repo.head().ok().map(|h| {
        h.peel_to_commit()
            .expect("Could not resolve HEAD to a commit")
    });
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .expect("Could not create commit")
}

fn tag_head(repo: &Git2Repo, name: &str) {
    let head = repo
        .head()
        .and_then(|h| h.peel_to_commit())
        .expect("Could not resolve HEAD");
    repo.tag_lightweight(name, head.as_object(), false)
        .expect("Could not create tag");
}

struct Mirror {
    root: TempDir,
    source: Git2Repo,
    package: Git2Repo,
}

impl Mirror {
    /// Source repo with a phpunit harness tagged 3.6.0 and 3.7.0, an empty
    /// package repo on master, and one template file.
    fn new() -> Self {
        let root = TempDir::new().expect("Could not create temp dir");

        let source = init_repo(&root.path().join("source"));
        let harness = root.path().join("source/tests/phpunit");
        fs::create_dir_all(harness.join("includes")).unwrap();
        fs::create_dir_all(harness.join("data")).unwrap();
        fs::create_dir_all(harness.join("tests")).unwrap();
        fs::write(harness.join("includes/bootstrap.php"), "<?php // v1\n").unwrap();
        fs::write(harness.join("data/sample.xml"), "<sample/>\n").unwrap();
        fs::write(harness.join("tests/unit-test.php"), "<?php // test\n").unwrap();
        fs::write(root.path().join("source/README.md"), "Upstream\n").unwrap();
        commit_all(&source, "Add phpunit harness");
        tag_head(&source, "3.6.0");
        tag_head(&source, "3.7.0");

        let package = init_repo(&root.path().join("package"));
        fs::write(root.path().join("package/README.md"), "Package scaffold\n").unwrap();
        commit_all(&package, "Initial commit");

        fs::create_dir_all(root.path().join("templates")).unwrap();
        fs::write(
            root.path().join("templates/composer.json"),
            "{\"name\":\"mirror/package\"}\n",
        )
        .unwrap();

        Mirror {
            root,
            source,
            package,
        }
    }

    /// Commit a harness change in the source repo and tag it
    fn add_source_release(&self, tag: &str, bootstrap_content: &str) {
        fs::write(
            self.root
                .path()
                .join("source/tests/phpunit/includes/bootstrap.php"),
            bootstrap_content,
        )
        .unwrap();
        commit_all(&self.source, &format!("Release {}", tag));
        tag_head(&self.source, tag);
    }

    /// Tag the source HEAD again without any content change
    fn tag_source_head(&self, tag: &str) {
        tag_head(&self.source, tag);
    }

    /// Wire up fresh handles exactly as the binary does and run
    fn run(&self) -> tag_mirror::Result<RunSummary> {
        let source = Git2Repository::open(self.root.path().join("source"))?;
        let package = Git2Repository::open(self.root.path().join("package"))?;
        let workdir = package.workdir()?;

        let packager = Packager::new(
            self.root.path().join("artifacts"),
            self.root.path().join("templates"),
            workdir,
            "tests/phpunit",
        );
        let pipeline = BuildPipeline::new(&source, &package, packager, "master");
        runner::run(&source, &package, &pipeline)
    }

    fn package_tag_commit(&self, tag: &str) -> Oid {
        self.package
            .find_reference(&format!("refs/tags/{}", tag))
            .and_then(|r| r.peel_to_commit())
            .map(|c| c.id())
            .expect("Tag should exist in package repository")
    }

    fn branch_head(&self, branch: &str) -> git2::Commit<'_> {
        self.package
            .find_branch(branch, git2::BranchType::Local)
            .expect("Branch should exist")
            .get()
            .peel_to_commit()
            .expect("Branch should point at a commit")
    }
}

#[test]
fn test_threshold_drops_old_tags_and_builds_the_rest() {
    let mirror = Mirror::new();

    let summary = mirror.run().expect("Run should succeed");

    assert_eq!(summary.built_count(), 1);
    assert_eq!(summary.outcomes[0].tag.name, "3.7.0");

    assert!(mirror
        .package
        .find_reference("refs/tags/3.7.0")
        .is_ok());
    assert!(mirror
        .package
        .find_reference("refs/tags/3.6.0")
        .is_err());

    // The downstream tag points at the build commit on the 3.7 line
    let tagged = mirror.package_tag_commit("3.7.0");
    let build_commit = mirror.package.find_commit(tagged).unwrap();
    assert_eq!(build_commit.message(), Some("Building 3.7.0"));
}

#[test]
fn test_major_boundary_creates_branch_and_merges_forward() {
    let mirror = Mirror::new();
    mirror.run().expect("Run should succeed");

    // 3.7.0 opened the 3.7 line
    let line_head = mirror.branch_head("3.7");
    assert_eq!(line_head.message(), Some("Building 3.7.0"));

    // master received a no-fast-forward merge of the line
    let master_head = mirror.branch_head("master");
    assert_eq!(master_head.parent_count(), 2);
    assert_eq!(master_head.parent_id(1).unwrap(), line_head.id());
}

#[test]
fn test_mirrored_content_and_templates_land_in_the_working_tree() {
    let mirror = Mirror::new();
    mirror.run().expect("Run should succeed");

    let workdir = mirror.root.path().join("package");
    assert!(workdir.join("includes/bootstrap.php").is_file());
    assert!(workdir.join("data/sample.xml").is_file());
    assert!(workdir.join("composer.json").is_file());
    // The harness's own tests directory is never packaged
    assert!(!workdir.join("tests").exists());

    let content = fs::read_to_string(workdir.join("composer.json")).unwrap();
    assert_eq!(content, "{\"name\":\"mirror/package\"}\n");
}

#[test]
fn test_second_run_is_idempotent() {
    let mirror = Mirror::new();

    let first = mirror.run().expect("First run should succeed");
    assert_eq!(first.built_count(), 1);

    let second = mirror.run().expect("Second run should succeed");
    assert_eq!(second.built_count(), 0);
}

#[test]
fn test_patch_release_builds_on_the_existing_line() {
    let mirror = Mirror::new();
    mirror.run().expect("Run should succeed");

    let master_before = mirror.branch_head("master").id();

    mirror.add_source_release("3.7.1", "<?php // v2\n");
    let summary = mirror.run().expect("Run should succeed");
    assert_eq!(summary.built_count(), 1);

    let line_head = mirror.branch_head("3.7");
    assert_eq!(line_head.message(), Some("Building 3.7.1"));
    assert_eq!(mirror.package_tag_commit("3.7.1"), line_head.id());

    // Patch releases do not merge forward
    assert_eq!(mirror.branch_head("master").id(), master_before);
}

#[test]
fn test_unchanged_release_skips_commit_but_still_tags() {
    let mirror = Mirror::new();
    mirror.run().expect("Run should succeed");

    // A second tag on the same source commit stages identical content
    mirror.tag_source_head("3.7.1");
    let summary = mirror.run().expect("Run should succeed");
    assert_eq!(summary.built_count(), 1);

    assert_eq!(
        mirror.package_tag_commit("3.7.1"),
        mirror.package_tag_commit("3.7.0")
    );
    let line_head = mirror.branch_head("3.7");
    assert_eq!(line_head.message(), Some("Building 3.7.0"));
}

#[test]
fn test_new_major_line_forks_from_master() {
    let mirror = Mirror::new();
    mirror.run().expect("Run should succeed");

    mirror.add_source_release("4.0.0", "<?php // v4\n");
    let summary = mirror.run().expect("Run should succeed");
    assert_eq!(summary.built_count(), 1);

    let line_head = mirror.branch_head("4.0");
    assert_eq!(line_head.message(), Some("Building 4.0.0"));

    let master_head = mirror.branch_head("master");
    assert_eq!(master_head.parent_count(), 2);
    assert_eq!(master_head.parent_id(1).unwrap(), line_head.id());

    // The new line forked from master, so the build commit's parent is the
    // previous merge commit
    let fork_parent = line_head.parent_id(0).unwrap();
    assert_eq!(fork_parent, master_head.parent_id(0).unwrap());
}

#[test]
fn test_missing_subtree_fails_the_run_without_tagging() {
    let root = TempDir::new().unwrap();

    // Source repo without the packaged subtree
    let source = init_repo(&root.path().join("source"));
    fs::write(root.path().join("source/README.md"), "Upstream\n").unwrap();
    commit_all(&source, "Initial commit");
    tag_head(&source, "3.7.0");

    let package = init_repo(&root.path().join("package"));
    fs::write(root.path().join("package/README.md"), "Package scaffold\n").unwrap();
    commit_all(&package, "Initial commit");

    fs::create_dir_all(root.path().join("templates")).unwrap();

    let source_handle = Git2Repository::open(root.path().join("source")).unwrap();
    let package_handle = Git2Repository::open(root.path().join("package")).unwrap();
    let packager = Packager::new(
        root.path().join("artifacts"),
        root.path().join("templates"),
        package_handle.workdir().unwrap(),
        "tests/phpunit",
    );
    let pipeline = BuildPipeline::new(&source_handle, &package_handle, packager, "master");

    let err = runner::run(&source_handle, &package_handle, &pipeline).unwrap_err();
    assert!(err.failed_operation().is_some());
    assert!(package.find_reference("refs/tags/3.7.0").is_err());
}
