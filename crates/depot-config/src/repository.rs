use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// File name of the index document served at the root of every repository.
pub const INDEX_FILE: &str = "index-v2.json";

pub const FDROID_REPO_URL: &str = "https://f-droid.org/repo";
pub const FDROID_ARCHIVE_URL: &str = "https://f-droid.org/archive";

/// Defines a remote repository that provides packages.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Repository {
    /// Unique name of the repository.
    pub name: String,

    /// Base URL of the repository; the index is fetched from `{url}/index-v2.json`.
    pub url: String,

    /// Whether the repository is enabled.
    /// Default: true
    pub enabled: Option<bool>,

    /// Allow fetching this repository over plain HTTP.
    /// Default: false
    pub allow_insecure: Option<bool>,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: Some(true),
            allow_insecure: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn allows_insecure(&self) -> bool {
        self.allow_insecure.unwrap_or(false)
    }

    /// The repository URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn index_url(&self) -> String {
        format!("{}/{INDEX_FILE}", self.base_url())
    }

    /// Archival mirrors keep old versions only and don't host current icons.
    pub fn is_archive(&self) -> bool {
        self.base_url().ends_with("/archive")
    }

    pub fn is_https(&self) -> bool {
        Url::parse(&self.url)
            .map(|url| url.scheme() == "https")
            .unwrap_or(false)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidRepository(self.name.clone()));
        }

        let parsed = Url::parse(&self.url).map_err(|err| {
            ConfigError::InvalidRepositoryUrl {
                url: self.url.clone(),
                reason: err.to_string(),
            }
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidRepositoryUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }

        Ok(())
    }
}

pub struct DefaultRepositoryInfo {
    pub name: &'static str,
    pub url: &'static str,
    pub enabled: bool,
}

pub const DEFAULT_REPOSITORIES: &[DefaultRepositoryInfo] = &[
    DefaultRepositoryInfo {
        name: "fdroid",
        url: FDROID_REPO_URL,
        enabled: true,
    },
    DefaultRepositoryInfo {
        name: "fdroid-archive",
        url: FDROID_ARCHIVE_URL,
        enabled: false,
    },
];

pub fn default_repositories() -> Vec<Repository> {
    DEFAULT_REPOSITORIES
        .iter()
        .map(|info| {
            Repository {
                name: info.name.to_string(),
                url: info.url.to_string(),
                enabled: Some(info.enabled),
                allow_insecure: None,
            }
        })
        .collect()
}
