use crate::domain::version::ReleaseVersion;
use crate::error::Result;
use git2::Oid;
use std::fmt;

/// One upstream release point selected for building
///
/// Always derived from a concrete tag in the source repository, never
/// synthesized. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag {
    /// Tag name exactly as it appears in the source repository
    pub name: String,
    /// Commit the tag points to
    pub commit: Oid,
    /// Normalized version used for sorting and threshold comparison
    pub version: ReleaseVersion,
}

impl ReleaseTag {
    /// Construct a tag, normalizing the name into a comparable version
    pub fn new(name: impl Into<String>, commit: Oid) -> Result<Self> {
        let name = name.into();
        let version = ReleaseVersion::parse(&name)?;
        Ok(ReleaseTag {
            name,
            commit,
            version,
        })
    }

    /// Whether this tag starts a new major.minor release line
    pub fn is_major_boundary(&self) -> bool {
        self.version.is_major_boundary()
    }

    /// Name of the long-lived branch for this tag's release line
    /// (e.g. "3.9" for any 3.9.x tag)
    pub fn major_branch_name(&self) -> String {
        format!("{}.{}", self.version.major(), self.version.minor())
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
