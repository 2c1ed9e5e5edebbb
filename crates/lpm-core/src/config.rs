//! Configuration file loading.
//!
//! Settings come from an optional TOML file (by default
//! `<config_dir>/lpm/config.toml`) layered over built-in defaults, plus
//! `.lpmignore` files in the scan root and the config directory. The result
//! is turned into an explicit [`ScanConfig`] for each scan.
//!
//! ```toml
//! [scan]
//! default_path = "~/code"
//! exclude_nested_git_repos = true
//! ignore_patterns = ["experimental-*", "*.tmp"]
//!
//! [classification]
//! active_days_threshold = 14
//! prunable_min_size_mb = 50.0
//! ```

use crate::error::{Error, Result};
use crate::ignore::{load_ignore_file, IGNORE_FILE_NAME};
use crate::models::{ClassificationConfig, ScanConfig};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "lpm";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration file.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

/// The `[scan]` table.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    /// Root used when none is given on the command line. `~` is expanded.
    pub default_path: Option<PathBuf>,
    pub exclude_nested_git_repos: bool,
    /// Appended to the built-in ignore defaults.
    pub ignore_patterns: Vec<String>,
    pub compute_size: bool,
    pub case_insensitive_ignore: bool,
    pub jobs: Option<usize>,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            default_path: None,
            exclude_nested_git_repos: false,
            ignore_patterns: Vec::new(),
            compute_size: true,
            case_insensitive_ignore: false,
            jobs: None,
        }
    }
}

/// `<config_dir>/lpm`, if the platform has a config directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join(CONFIG_FILE))
    }

    /// Loads configuration.
    ///
    /// With an explicit `path` the file must exist. Without one, the default
    /// location is tried and a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        match fs::read_to_string(&path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Loading configuration");
                Self::from_toml_str(&contents, &path)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => Ok(Self::default()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::path_not_found(path)),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Parses and validates TOML text; `origin` is used in error messages.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate(origin)?;
        Ok(config)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let c = &self.classification;
        if c.active_days_threshold < 0 {
            return Err(Error::config(origin, "active_days_threshold must not be negative"));
        }
        if c.dormant_days_threshold < c.active_days_threshold {
            return Err(Error::config(
                origin,
                "dormant_days_threshold must be at least active_days_threshold",
            ));
        }
        if c.prunable_min_size_mb < 0.0 || c.prunable_max_size_mb < 0.0 {
            return Err(Error::config(origin, "prunable size thresholds must not be negative"));
        }
        if self.scan.jobs == Some(0) {
            return Err(Error::config(origin, "jobs must be at least 1"));
        }
        Ok(())
    }

    /// Builds the scan configuration for `root` (or the configured default
    /// path, or the current directory).
    ///
    /// Ignore patterns are the configured ones followed by the contents of
    /// `<root>/.lpmignore` and `<config_dir>/lpm/.lpmignore`.
    pub fn scan_config(&self, root: Option<PathBuf>) -> Result<ScanConfig> {
        let defaults = ScanConfig::default();
        let root_path = root
            .or_else(|| self.scan.default_path.as_deref().map(expand_home))
            .unwrap_or(defaults.root_path);

        let mut ignore_patterns = self.scan.ignore_patterns.clone();
        ignore_patterns.extend(load_ignore_file(&root_path.join(IGNORE_FILE_NAME))?);
        if let Some(dir) = config_dir() {
            ignore_patterns.extend(load_ignore_file(&dir.join(IGNORE_FILE_NAME))?);
        }

        Ok(ScanConfig {
            root_path,
            ignore_patterns,
            exclude_nested_git_repos: self.scan.exclude_nested_git_repos,
            compute_size: self.scan.compute_size,
            case_insensitive_ignore: self.scan.case_insensitive_ignore,
            jobs: self.scan.jobs,
            batch_size: defaults.batch_size,
            classification: self.classification,
        })
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
