use crate::domain::{ReleaseTag, ReleaseVersion};
use crate::error::{MirrorError, Result};
use crate::git::Repository;
use std::collections::HashSet;

/// Tags below this version predate the packaged subtree and are never built
fn minimum_version() -> ReleaseVersion {
    ReleaseVersion::new(3, 7, 0)
}

/// Compute the ordered set of source tags that still need building
///
/// Lists every tag in the source repository, drops tags below the minimum
/// version and tags that already exist in the package repository, resolves
/// each survivor to the commit it points at, and returns them sorted
/// ascending by normalized version (stable, so duplicate versions keep
/// their discovery order). An empty result means nothing new to build and
/// is a normal outcome.
///
/// A tag name that does not parse as a version is an error: the queue
/// cannot be safely sorted or thresholded around it.
///
/// This function performs no writes and may be recomputed freely; it is
/// what makes re-running the whole mirror idempotent.
pub fn select_tags_to_build(
    source: &dyn Repository,
    package: &dyn Repository,
) -> Result<Vec<ReleaseTag>> {
    let already_built: HashSet<String> = package.list_tags()?.into_iter().collect();
    let threshold = minimum_version();

    let mut tags = Vec::new();
    for name in source.list_tags()? {
        let version = ReleaseVersion::parse(&name)?;
        if version < threshold {
            continue;
        }
        if already_built.contains(&name) {
            continue;
        }

        let commit = source.find_tag_oid(&name)?.ok_or_else(|| {
            MirrorError::repository(
                format!("git rev-parse {}", name),
                "listed tag disappeared from the source repository",
            )
        })?;
        tags.push(ReleaseTag {
            name,
            commit,
            version,
        });
    }

    tags.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(tags)
}
