use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Represents the complete configuration for tag-mirror.
///
/// Names the two repositories and the filesystem locations the build uses;
/// all paths are consumed as opaque strings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

/// Filesystem locations for one source/package repository pair.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    /// Working copy of the upstream source repository
    pub source_repo: String,

    /// Working copy of the downstream package repository
    pub package_repo: String,

    /// Scratch root for per-tag build artifacts
    pub artifacts: String,

    /// Static template files projected into every build
    pub templates: String,
}

/// Build behavior customization.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BuildConfig {
    /// Branch the release-line branches fork from and merge back into
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Subtree of the source repository that gets packaged
    #[serde(default = "default_subtree")]
    pub source_subtree: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_subtree() -> String {
    "tests/phpunit".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            default_branch: default_branch(),
            source_subtree: default_subtree(),
        }
    }
}

/// Loads configuration from file.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `tagmirror.toml` in current directory
/// 3. `.tagmirror.toml` in the user config directory
///
/// Unlike purely behavioral settings, the repository paths have no sane
/// defaults, so a missing file is a configuration error.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        fs::read_to_string(path)
            .map_err(|e| MirrorError::config(format!("cannot read {}: {}", path, e)))?
    } else if Path::new("./tagmirror.toml").exists() {
        fs::read_to_string("./tagmirror.toml")
            .map_err(|e| MirrorError::config(format!("cannot read ./tagmirror.toml: {}", e)))?
    } else if let Some(config_dir) = dirs::config_dir() {
        let fallback = config_dir.join(".tagmirror.toml");
        if fallback.exists() {
            fs::read_to_string(&fallback).map_err(|e| {
                MirrorError::config(format!("cannot read {}: {}", fallback.display(), e))
            })?
        } else {
            return Err(MirrorError::config(
                "no configuration file found (expected ./tagmirror.toml)",
            ));
        }
    } else {
        return Err(MirrorError::config(
            "no configuration file found (expected ./tagmirror.toml)",
        ));
    };

    let config: Config =
        toml::from_str(&config_str).map_err(|e| MirrorError::config(e.to_string()))?;
    Ok(config)
}
