use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Artifact URL `{url}` is not valid")]
    #[diagnostic(
        code(depot_dl::invalid_url),
        help("The repository index may be corrupt; run `depot sync --force`")
    )]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    #[diagnostic(
        code(depot_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("Server returned HTTP {status} for {url}")]
    #[diagnostic(
        code(depot_dl::http_error),
        help("The artifact may have been removed upstream; sync and try again")
    )]
    HttpError { status: u16, url: String },

    #[error("Cannot write the artifact: {0}")]
    #[diagnostic(code(depot_dl::io), help("Check free space in the cache directory"))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(depot_dl::filesystem))]
    FileSystem(#[from] depot_utils::error::FileSystemError),

    #[error("Download was cancelled")]
    #[diagnostic(code(depot_dl::cancelled))]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}
