//! Project configuration for tagtrace
//!
//! Config lives at `.tagtrace/config.yaml` relative to the project root.
//! Every key is optional:
//!
//! ```yaml
//! specs_dir: specs
//! store_path: .tagtrace/linkage.json
//! strict_mode: true
//! detection_mode: hybrid
//! languages: [rust, python]
//! code_directories: [src, "lib/**/*.rs"]
//! exclude: ["**/generated/**"]
//! domain_directories:
//!   AUTH: src/auth
//! lock:
//!   timeout_secs: 300
//!   poll_interval_ms: 500
//! ```

use crate::code_dirs::Language;
use eyre::{Result, WrapErr, bail};
use facet::Facet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default config location, relative to the project root
pub const DEFAULT_CONFIG_PATH: &str = ".tagtrace/config.yaml";

const DEFAULT_SPECS_DIR: &str = "specs";
const DEFAULT_STORE_PATH: &str = ".tagtrace/linkage.json";
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Root configuration
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Directory holding SPEC documents, relative to the project root
    #[facet(default)]
    pub specs_dir: Option<String>,

    /// Linkage store file, relative to the project root
    #[facet(default)]
    pub store_path: Option<String>,

    /// Block on critical violations
    #[facet(default)]
    pub strict_mode: Option<bool>,

    /// `auto`, `manual` or `hybrid`
    #[facet(default)]
    pub detection_mode: Option<String>,

    /// Languages whose default globs are used in auto/hybrid mode.
    /// Empty means every known language.
    #[facet(default)]
    pub languages: Vec<String>,

    /// Project code directories or globs (manual/hybrid mode)
    #[facet(default)]
    pub code_directories: Vec<String>,

    /// Extra exclude globs, added to the global exclude set
    #[facet(default)]
    pub exclude: Vec<String>,

    /// Domain (the `AUTH` in `SPEC-AUTH-001`) to directory prefix
    #[facet(default)]
    pub domain_directories: BTreeMap<String, String>,

    #[facet(default)]
    pub lock: Option<LockConfig>,
}

/// Advisory lock tuning
#[derive(Debug, Clone, Default, Facet)]
pub struct LockConfig {
    #[facet(default)]
    pub timeout_secs: Option<u64>,

    #[facet(default)]
    pub poll_interval_ms: Option<u64>,

    /// A holder older than this is considered dead. Defaults to the timeout.
    #[facet(default)]
    pub stale_after_secs: Option<u64>,
}

/// How code directories are detected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// Language-default globs only
    Auto,
    /// Project globs only
    Manual,
    /// Union of both
    #[default]
    Hybrid,
}

impl DetectionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Hybrid => "hybrid",
        }
    }
}

impl Config {
    /// Load config from `path`. A missing file yields the defaults; a file
    /// that exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("Failed to read config file: {}", path.display()));
            }
        };

        Self::from_yaml(&content)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and check a YAML config document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = facet_yaml::from_str(content)?;

        if let Some(mode) = &config.detection_mode
            && DetectionMode::parse(mode).is_none()
        {
            bail!("unknown detection_mode '{mode}' (expected auto, manual or hybrid)");
        }
        for name in &config.languages {
            if Language::parse(name).is_none() {
                bail!("unknown language '{name}'");
            }
        }
        if config.lock.as_ref().and_then(|l| l.poll_interval_ms) == Some(0) {
            bail!("lock.poll_interval_ms must be greater than zero");
        }

        Ok(config)
    }

    pub fn specs_dir(&self) -> &str {
        self.specs_dir.as_deref().unwrap_or(DEFAULT_SPECS_DIR)
    }

    pub fn store_path(&self) -> &str {
        self.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH)
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode.unwrap_or(true)
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detection_mode
            .as_deref()
            .and_then(DetectionMode::parse)
            .unwrap_or_default()
    }

    /// Configured languages, or every known language when none are listed.
    pub fn languages(&self) -> Vec<Language> {
        if self.languages.is_empty() {
            return Language::ALL.to_vec();
        }
        self.languages
            .iter()
            .filter_map(|name| Language::parse(name))
            .collect()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(
            self.lock
                .as_ref()
                .and_then(|l| l.timeout_secs)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
        )
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.lock
                .as_ref()
                .and_then(|l| l.poll_interval_ms)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn lock_stale_after(&self) -> Duration {
        self.lock
            .as_ref()
            .and_then(|l| l.stale_after_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.lock_timeout())
    }

    /// Directory prefix configured for a spec domain, if any.
    pub fn domain_directory(&self, domain: &str) -> Option<&str> {
        self.domain_directories.get(domain).map(String::as_str)
    }

    pub fn resolve_specs_dir(&self, root: &Path) -> PathBuf {
        root.join(self.specs_dir())
    }

    pub fn resolve_store_path(&self, root: &Path) -> PathBuf {
        root.join(self.store_path())
    }
}
