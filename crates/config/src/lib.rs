//! Layered configuration.
//!
//! Sources are merged in order, later ones winning:
//! 1. Built-in defaults.
//! 2. A configuration file (TOML, YAML or JSON, chosen by extension). Either
//!    the path given explicitly, or `config.toml` in the platform config
//!    directory if it exists.
//! 3. `DOCKET_`-prefixed environment variables, nested keys separated by a
//!    double underscore (`DOCKET_CACHE__SWEEP_INTERVAL=600`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DOCKET_";
const DEFAULT_SWEEP_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    /// Database used when a builder names none. Falls back to the first
    /// database registered.
    pub default_database: Option<String>,
    /// Log every query a builder sends.
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Time between full flushes, in whole seconds.
    #[serde(with = "seconds")]
    pub sweep_interval: Duration,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS) }
    }
}

impl Config {
    /// Load from defaults, a config file, and the environment.
    ///
    /// An explicit `path` must exist. Without one, the platform default is
    /// used only when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path)?,
            None => {
                if let Some(path) = default_path().filter(|path| path.is_file()) {
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used, such as a zero sweep
    /// interval.
    pub fn validate(&self) -> Result<()> {
        if self.cache.sweep_interval.is_zero() {
            exn::bail!(ErrorKind::Invalid("cache.sweep_interval must be greater than zero".to_string()));
        }
        if self.default_database.as_deref().is_some_and(|name| name.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("default_database must not be blank".to_string()));
        }
        Ok(())
    }
}

/// `config.toml` in the platform configuration directory, if one can be
/// determined for the current user.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "docket").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    tracing::debug!(path = %path.display(), "Loading configuration file");
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
