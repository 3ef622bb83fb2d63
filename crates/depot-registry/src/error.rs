//! Error types for the registry crate.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while fetching or parsing a repository index.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(depot_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Request to {url} failed: {message}")]
    #[diagnostic(
        code(depot_registry::transport),
        help("Check your network connection and the repository URL")
    )]
    Transport { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    #[diagnostic(
        code(depot_registry::http_status),
        help("Verify the repository URL is correct and accessible")
    )]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    #[diagnostic(
        code(depot_registry::invalid_url),
        help("Ensure the URL is valid and properly formatted")
    )]
    InvalidUrl(String),

    #[error("Refusing to fetch {0} over an insecure connection")]
    #[diagnostic(
        code(depot_registry::insecure),
        help("Use an https:// URL or set `allow_insecure = true` for this repository")
    )]
    InsecureRepository(String),

    #[error("Malformed index: {0}")]
    #[diagnostic(
        code(depot_registry::json),
        help("The index may be truncated or not an index-v2 document")
    )]
    JsonError(#[from] serde_json::Error),

    #[error("Package batch consumer went away")]
    #[diagnostic(code(depot_registry::consumer_closed))]
    ConsumerClosed,

    #[error("{0}")]
    #[diagnostic(code(depot_registry::custom))]
    Custom(String),
}

impl RegistryError {
    /// Whether retrying the same request may succeed: transport failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Transport { .. } => true,
            RegistryError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
