use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use depot_utils::{
    fs::ensure_dir_exists,
    path::{resolve_path, xdg_config_home, xdg_data_home},
    system::host_abis,
    time::{parse_duration, parse_std_duration},
};
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{ConfigError, Result},
    repository::{default_repositories, Repository},
};

pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_API_LEVEL: u32 = 34;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_SYNC_INTERVAL_MS: u128 = 3 * 3_600_000;

/// Application's configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// List of configured repositories, synced in this order.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<Repository>,

    /// Directory holding downloaded artifacts.
    /// Default: $DEPOT_ROOT/cache
    pub cache_path: Option<String>,

    /// Directory where the catalog database is stored.
    /// Default: $DEPOT_ROOT/db
    pub db_path: Option<String>,

    /// File holding conditional-request validators and the last sync time.
    /// Default: $DEPOT_ROOT/state.json
    pub state_path: Option<String>,

    /// How often scheduled syncs run: a duration like "6h", or "always", "never", "auto".
    /// Default: "auto" (3h)
    pub sync_interval: Option<String>,

    /// Preferred locale for names, summaries and changelogs.
    /// Default: "en-US"
    pub locale: Option<String>,

    /// Platform API level of the target device.
    /// Default: 34
    pub api_level: Option<u32>,

    /// Native ABIs supported by the target device.
    /// Default: derived from the host CPU
    pub abis: Option<Vec<String>>,

    /// Whether installing packages from this client has been allowed.
    /// Default: false
    pub allow_unknown_sources: Option<bool>,

    /// Command that hands an artifact to the installer; `{file}` is replaced with its path.
    /// Default: ["adb", "install", "-r", "{file}"]
    pub install_command: Option<Vec<String>>,

    /// Wait for the installer to report completion instead of only launching it.
    /// Default: true
    pub install_session: Option<bool>,

    /// How long to wait for the installer to report completion.
    /// Default: "10m"
    pub install_timeout: Option<String>,

    /// Cached artifacts older than this are removed at startup.
    /// Default: "1h"
    pub cache_expiry: Option<String>,

    /// Delay before removing an artifact that was handed to the installer.
    /// Default: "60s"
    pub cleanup_delay: Option<String>,

    /// Limits the number of results returned by a search.
    /// Default: 20
    pub search_limit: Option<usize>,

    /// User-Agent sent with every request.
    /// Default: "depot/<version>"
    pub user_agent: Option<String>,

    /// Timeout applied to each HTTP request.
    /// Default: "60s"
    pub http_timeout: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Location of the config file: `$DEPOT_CONFIG`, else `$XDG_CONFIG_HOME/depot/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("DEPOT_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("depot").join("config.toml"),
    }
}

fn depot_root() -> String {
    std::env::var("DEPOT_ROOT").unwrap_or_else(|_| format!("{}/depot", xdg_data_home().display()))
}

fn resolve_override(env_key: &str, value: Option<&str>, default: String) -> Result<PathBuf> {
    if let Ok(env_path) = std::env::var(env_key) {
        return Ok(resolve_path(&env_path)?);
    }
    Ok(resolve_path(value.unwrap_or(&default))?)
}

/// Interval value in milliseconds. `always` is 0, `never` is `u128::MAX`.
pub fn parse_sync_interval(value: &str) -> Option<u128> {
    match value {
        "always" => Some(0),
        "never" => Some(u128::MAX),
        "auto" => Some(DEFAULT_SYNC_INTERVAL_MS),
        value => parse_duration(value),
    }
}

/// Whether a scheduled sync should run, given the interval and the last successful sync.
pub fn is_sync_due(interval_ms: u128, last_sync: Option<i64>, now: i64) -> bool {
    if interval_ms == u128::MAX {
        return false;
    }
    match last_sync {
        None => true,
        Some(last) => {
            let elapsed = now.saturating_sub(last).max(0) as u128;
            elapsed >= interval_ms
        }
    }
}

impl Config {
    pub fn default_config() -> Self {
        let root = depot_root();

        Self {
            repositories: default_repositories(),
            cache_path: Some(format!("{root}/cache")),
            db_path: Some(format!("{root}/db")),
            state_path: Some(format!("{root}/state.json")),
            sync_interval: Some("auto".into()),
            locale: Some(DEFAULT_LOCALE.into()),
            api_level: Some(DEFAULT_API_LEVEL),
            abis: None,
            allow_unknown_sources: Some(false),
            install_command: None,
            install_session: Some(true),
            install_timeout: Some("10m".into()),
            cache_expiry: Some("1h".into()),
            cleanup_delay: Some("60s".into()),
            search_limit: Some(DEFAULT_SEARCH_LIMIT),
            user_agent: None,
            http_timeout: Some("60s".into()),
        }
    }

    /// Loads the configuration from `path`, falling back to defaults when the file is missing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading config");
                Self::from_toml(&content)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config not found, using defaults");
                Ok(Self::default_config())
            }
            Err(err) => {
                Err(ConfigError::IoError {
                    action: format!("read config {}", path.display()),
                    source: err,
                })
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.resolve()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            ensure_dir_exists(parent)?;
        }
        fs::write(path, self.to_toml()?).map_err(|err| {
            ConfigError::IoError {
                action: format!("write config {}", path.display()),
                source: err,
            }
        })
    }

    /// Validates the configuration and fills in defaults for unset values.
    pub fn resolve(&mut self) -> Result<()> {
        let mut seen_repos = HashSet::new();
        for repo in &mut self.repositories {
            repo.validate()?;
            if !seen_repos.insert(repo.name.clone()) {
                return Err(ConfigError::DuplicateRepositoryName(repo.name.clone()));
            }
            repo.enabled.get_or_insert(true);
            if !repo.is_https() && !repo.allows_insecure() {
                warn!(
                    repo = %repo.name,
                    url = %repo.url,
                    "repository is not served over HTTPS and will be skipped"
                );
            }
        }

        if let Some(interval) = self.sync_interval.as_deref() {
            if parse_sync_interval(interval).is_none() {
                return Err(ConfigError::InvalidDuration {
                    field: "sync_interval",
                    value: interval.to_string(),
                });
            }
        }

        for (field, value) in [
            ("install_timeout", &self.install_timeout),
            ("cache_expiry", &self.cache_expiry),
            ("cleanup_delay", &self.cleanup_delay),
            ("http_timeout", &self.http_timeout),
        ] {
            if let Some(value) = value {
                if parse_std_duration(value).is_none() {
                    return Err(ConfigError::InvalidDuration {
                        field,
                        value: value.clone(),
                    });
                }
            }
        }

        self.search_limit.get_or_insert(DEFAULT_SEARCH_LIMIT);
        self.locale.get_or_insert_with(|| DEFAULT_LOCALE.into());

        Ok(())
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        resolve_override(
            "DEPOT_CACHE",
            self.cache_path.as_deref(),
            format!("{}/cache", depot_root()),
        )
    }

    pub fn get_db_path(&self) -> Result<PathBuf> {
        resolve_override(
            "DEPOT_DB",
            self.db_path.as_deref(),
            format!("{}/db", depot_root()),
        )
    }

    pub fn get_state_path(&self) -> Result<PathBuf> {
        resolve_override(
            "DEPOT_STATE",
            self.state_path.as_deref(),
            format!("{}/state.json", depot_root()),
        )
    }

    /// Looks up a repository by name, enabled or not.
    pub fn get_repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    pub fn enabled_repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter().filter(|repo| repo.is_enabled())
    }

    pub fn set_repository_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let repo = self
            .repositories
            .iter_mut()
            .find(|repo| repo.name == name)
            .ok_or_else(|| ConfigError::RepositoryNotFound(name.to_string()))?;
        repo.enabled = Some(enabled);
        Ok(())
    }

    pub fn sync_interval_ms(&self) -> u128 {
        self.sync_interval
            .as_deref()
            .and_then(parse_sync_interval)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MS)
    }

    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    pub fn api_level(&self) -> u32 {
        self.api_level.unwrap_or(DEFAULT_API_LEVEL)
    }

    pub fn abis(&self) -> Vec<String> {
        self.abis.clone().unwrap_or_else(host_abis)
    }

    pub fn allow_unknown_sources(&self) -> bool {
        self.allow_unknown_sources.unwrap_or(false)
    }

    pub fn install_command(&self) -> Vec<String> {
        self.install_command.clone().unwrap_or_else(|| {
            ["adb", "install", "-r", "{file}"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    pub fn install_session(&self) -> bool {
        self.install_session.unwrap_or(true)
    }

    pub fn install_timeout(&self) -> Duration {
        duration_or(&self.install_timeout, Duration::from_secs(10 * 60))
    }

    pub fn cache_expiry(&self) -> Duration {
        duration_or(&self.cache_expiry, Duration::from_secs(60 * 60))
    }

    pub fn cleanup_delay(&self) -> Duration {
        duration_or(&self.cleanup_delay, Duration::from_secs(60))
    }

    pub fn http_timeout(&self) -> Duration {
        duration_or(&self.http_timeout, Duration::from_secs(60))
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("depot/{}", env!("CARGO_PKG_VERSION")))
    }
}

fn duration_or(value: &Option<String>, default: Duration) -> Duration {
    value
        .as_deref()
        .and_then(parse_std_duration)
        .unwrap_or(default)
}
