//! Domain types for release mirroring
//!
//! Core value types shared across the selector and the build pipeline:
//! normalized versions and upstream release tags.

pub mod tag;
pub mod version;

pub use tag::ReleaseTag;
pub use version::ReleaseVersion;
