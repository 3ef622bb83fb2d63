use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Cannot open the catalog database: {0}")]
    #[diagnostic(
        code(depot_db::open),
        help("Check that `db_path` points to a writable directory")
    )]
    Open(String),

    #[error("Catalog query failed: {0}")]
    #[diagnostic(
        code(depot_db::query),
        help("Run `depot sync --force` to rebuild the catalog")
    )]
    Query(String),

    #[error("Catalog schema migration failed: {0}")]
    #[diagnostic(
        code(depot_db::migration),
        help("Delete catalog.db under `db_path` and sync again; the catalog is rebuilt from the repositories")
    )]
    Migration(String),

    #[error("Cannot prepare the catalog directory: {0}")]
    #[diagnostic(code(depot_db::io), help("Check file permissions and disk space"))]
    Io(#[from] std::io::Error),
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(kind, info) => {
                DbError::Query(format!("{kind:?}: {}", info.message()))
            }
            other => DbError::Query(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::Open(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
