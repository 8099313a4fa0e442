use crate::domain::ReleaseTag;
use crate::error::Result;
use crate::git::Repository;
use crate::packager::Packager;
use log::debug;

/// Builds one selected tag into the package repository
///
/// Steps are strictly sequential: reset the scratch area, prime the release
/// branch, stage the extracted source and the templates, commit when there
/// is anything to commit, tag, and merge the release line forward when the
/// tag opens one. Any step's failure aborts this tag and propagates to the
/// run controller; nothing is rolled back, and re-running is safe because
/// already-tagged versions are skipped at selection time.
pub struct BuildPipeline<'a> {
    source: &'a dyn Repository,
    package: &'a dyn Repository,
    packager: Packager,
    default_branch: String,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        source: &'a dyn Repository,
        package: &'a dyn Repository,
        packager: Packager,
        default_branch: impl Into<String>,
    ) -> Self {
        BuildPipeline {
            source,
            package,
            packager,
            default_branch: default_branch.into(),
        }
    }

    /// Run the whole pipeline for one tag
    pub fn build(&self, tag: &ReleaseTag) -> Result<()> {
        self.packager.reset_scratch()?;
        self.prime_branch(tag)?;
        self.packager.extract_and_stage(tag, self.source)?;
        self.packager.copy_templates()?;
        self.commit_and_tag(tag)?;
        self.merge_if_major_boundary(tag)?;
        Ok(())
    }

    /// Check out the tag's release branch, creating it from the default
    /// branch when the tag opens a new line, and clear all tracked files so
    /// the new content is projected onto a clean slate
    fn prime_branch(&self, tag: &ReleaseTag) -> Result<()> {
        let branch = tag.major_branch_name();

        if tag.is_major_boundary() && !self.package.list_branches()?.contains(&branch) {
            debug!("Initializing branch for {}", tag.name);
            self.package.create_branch(&branch, &self.default_branch)?;
        }

        self.package.checkout(&branch)?;
        self.package.remove_tracked_files()?;
        Ok(())
    }

    fn commit_and_tag(&self, tag: &ReleaseTag) -> Result<()> {
        self.package.stage_all()?;

        // Committing with nothing staged fails in the backend. Not every
        // version changes the packaged files, so check first; the tag is
        // still created either way.
        if self.package.has_pending_changes()? {
            self.package.commit(&format!("Building {}", tag.name))?;
        }

        self.package.create_tag(&tag.name)?;
        Ok(())
    }

    fn merge_if_major_boundary(&self, tag: &ReleaseTag) -> Result<()> {
        if tag.is_major_boundary() {
            self.package.checkout(&self.default_branch)?;
            self.package
                .merge_into(&self.default_branch, &tag.major_branch_name(), true)?;
        }
        Ok(())
    }
}
