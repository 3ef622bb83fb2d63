use depot_registry::PackageRecord;

use crate::error::Result;

/// Persistent catalog of package records, keyed by package id.
pub trait CatalogStore: Send + Sync {
    /// Atomically replaces the whole catalog. Returns the stored row count.
    fn replace_all(&self, records: &[PackageRecord]) -> Result<usize>;

    fn clear(&self) -> Result<()>;

    fn bulk_upsert(&self, records: &[PackageRecord]) -> Result<usize>;

    /// Case-insensitive substring search over name, summary and id, ordered by name.
    fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<PackageRecord>>;

    fn find(&self, pkg_id: &str) -> Result<Option<PackageRecord>>;

    /// Records currently stored for one origin repository.
    fn records_for_repo(&self, repo_name: &str) -> Result<Vec<PackageRecord>>;

    fn count(&self) -> Result<usize>;
}
