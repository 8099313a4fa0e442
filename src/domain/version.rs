use crate::error::{MirrorError, Result};
use std::fmt;

/// Normalized release version parsed from a tag name
///
/// Wraps [semver::Version] so ordering follows semantic-version precedence:
/// numeric component-wise, with a release sorting above its own pre-releases
/// (`4.0.0-rc.1 < 4.0.0 < 4.0.1`). Tag names that cannot be normalized are
/// an error, never silently dropped, since the selector cannot safely sort
/// or threshold an unparsable tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseVersion(semver::Version);

impl ReleaseVersion {
    /// Create a version from explicit components
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        ReleaseVersion(semver::Version::new(major, minor, patch))
    }

    /// Parse a version from a tag name (e.g. "3.9.2", "v4.0.0-rc.1", "3.8")
    ///
    /// Accepts an optional 'v'/'V' prefix and a missing patch component
    /// (normalized to zero). Anything else that `semver` rejects is a
    /// version parsing error.
    pub fn parse(tag: &str) -> Result<Self> {
        let clean_tag = tag.trim_start_matches('v').trim_start_matches('V');

        if let Ok(version) = semver::Version::parse(clean_tag) {
            return Ok(ReleaseVersion(version));
        }

        // Upstream occasionally tags major.minor lines without a patch
        // component; pad those before handing them to semver.
        if let Ok(two_part) = regex::Regex::new(r"^(\d+)\.(\d+)((?:-|\+)\S*)?$") {
            if let Some(caps) = two_part.captures(clean_tag) {
                let padded = format!(
                    "{}.{}.0{}",
                    &caps[1],
                    &caps[2],
                    caps.get(3).map_or("", |m| m.as_str())
                );
                if let Ok(version) = semver::Version::parse(&padded) {
                    return Ok(ReleaseVersion(version));
                }
            }
        }

        Err(MirrorError::version(format!(
            "'{}' is not a comparable version",
            tag
        )))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Whether this version starts a new major.minor release line
    ///
    /// True only for full releases with a zero patch component; a
    /// pre-release of a dot-zero version does not open the line.
    pub fn is_major_boundary(&self) -> bool {
        self.0.patch == 0 && self.0.pre.is_empty()
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
