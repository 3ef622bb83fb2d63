use depot_utils::error::{FileSystemError, PathError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(depot_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(depot_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Sync state is not valid JSON: {0}")]
    #[diagnostic(code(depot_config::state_json))]
    StateJson(#[from] serde_json::Error),

    #[error("Invalid repository name: {0:?}")]
    #[diagnostic(
        code(depot_config::invalid_repository),
        help("Repository names must be non-empty")
    )]
    InvalidRepository(String),

    #[error("Invalid repository URL `{url}`: {reason}")]
    #[diagnostic(
        code(depot_config::invalid_repository_url),
        help("Use the repository base URL, e.g. https://f-droid.org/repo")
    )]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Duplicate repository name: {0}")]
    #[diagnostic(
        code(depot_config::duplicate_repo),
        help("Each repository must have a unique name")
    )]
    DuplicateRepositoryName(String),

    #[error("Repository not found: {0}")]
    #[diagnostic(
        code(depot_config::repository_not_found),
        help("Run `depot repos` to list configured repositories")
    )]
    RepositoryNotFound(String),

    #[error("Invalid duration `{value}` for `{field}`")]
    #[diagnostic(
        code(depot_config::invalid_duration),
        help("Use a duration like 30s, 10m, 3h or 1d")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("Unknown setting: {0}")]
    #[diagnostic(
        code(depot_config::unknown_setting),
        help("Run `depot config list` to see available settings")
    )]
    UnknownSetting(String),

    #[error("Invalid value `{value}` for `{key}`: {reason}")]
    #[diagnostic(code(depot_config::invalid_setting))]
    InvalidSettingValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("IO error while trying to {action}: {source}")]
    #[diagnostic(code(depot_config::io))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(depot_config::path))]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(code(depot_config::filesystem))]
    FileSystem(#[from] FileSystemError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
