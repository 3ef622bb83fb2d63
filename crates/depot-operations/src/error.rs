//! Error types for depot operations.

use std::time::Duration;

use depot_config::error::ConfigError;
use depot_db::DbError;
use depot_dl::error::DownloadError;
use depot_events::SessionId;
use depot_registry::RegistryError;
use depot_utils::error::{FileSystemError, HashError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DepotError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(code(depot::filesystem), help("Check file permissions and disk space"))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(depot::hash))]
    Hash(#[from] HashError),

    #[error("Error while {action}")]
    #[diagnostic(code(depot::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Installing {0} requires permission to install from unknown sources")]
    #[diagnostic(
        code(depot::permission_required),
        help("Run `depot config set allow_unknown_sources true` to grant it")
    )]
    PermissionRequired(String),

    #[error("Checksum verification failed for {0}")]
    #[diagnostic(
        code(depot::verification_failed),
        help("The cached artifact was removed; installing again downloads a fresh copy")
    )]
    VerificationFailed(String),

    #[error("Download of {pkg_id} failed: {reason}")]
    #[diagnostic(
        code(depot::download_failed),
        help("Check your internet connection or try again later")
    )]
    DownloadFailed { pkg_id: String, reason: String },

    #[error("Installation of {pkg_id} failed: {reason}")]
    #[diagnostic(code(depot::install_failed))]
    InstallFailed { pkg_id: String, reason: String },

    #[error("Installer did not report on session {session_id} for {pkg_id} within {timeout:?}")]
    #[diagnostic(
        code(depot::install_timeout),
        help("Increase `install_timeout` if the installer needs more time")
    )]
    InstallTimeout {
        pkg_id: String,
        session_id: SessionId,
        timeout: Duration,
    },

    #[error("An installation of {0} is still running")]
    #[diagnostic(code(depot::install_in_progress), help("Wait for it to finish and retry"))]
    InstallInProgress(String),

    #[error("Download of {0} was cancelled")]
    #[diagnostic(code(depot::cancelled))]
    Cancelled(String),

    #[error("Package {0} not found in the catalog")]
    #[diagnostic(
        code(depot::package_not_found),
        help("Run `depot sync` to refresh the catalog, or check the package id")
    )]
    PackageNotFound(String),

    #[error("Repository {0} is not configured")]
    #[diagnostic(
        code(depot::repository_not_found),
        help("Run `depot repos` to list configured repositories")
    )]
    RepositoryNotFound(String),

    #[error("{0}")]
    #[diagnostic(code(depot::custom))]
    Custom(String),
}

pub type DepotResult<T> = std::result::Result<T, DepotError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> DepotResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> DepotResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            DepotError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
