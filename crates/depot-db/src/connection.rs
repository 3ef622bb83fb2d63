//! Catalog database connection and the [`CatalogStore`] implementation over it.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use depot_registry::PackageRecord;
use diesel::{sql_query, Connection, RunQueryDsl, SqliteConnection};
use tracing::{debug, info};

use crate::{
    error::{DbError, Result},
    migration::apply_migrations,
    repository::CatalogRepository,
    store::CatalogStore,
};

/// The local package catalog, backed by SQLite.
pub struct CatalogDatabase {
    conn: Mutex<SqliteConnection>,
}

impl CatalogDatabase {
    /// Opens (creating if needed) the catalog at `path` and runs migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy();
        let mut conn = SqliteConnection::establish(&path_str)?;

        // WAL mode for better concurrent access
        sql_query("PRAGMA journal_mode = WAL;").execute(&mut conn)?;

        apply_migrations(&mut conn)?;
        debug!(path = %path.display(), "catalog database opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = SqliteConnection::establish(":memory:")?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CatalogStore for CatalogDatabase {
    fn replace_all(&self, records: &[PackageRecord]) -> Result<usize> {
        let count = CatalogRepository::replace_all(&mut self.conn(), records)?;
        info!(packages = count, "catalog replaced");
        Ok(count)
    }

    fn clear(&self) -> Result<()> {
        CatalogRepository::delete_all(&mut self.conn())?;
        Ok(())
    }

    fn bulk_upsert(&self, records: &[PackageRecord]) -> Result<usize> {
        let mut conn = self.conn();
        conn.transaction(|conn| CatalogRepository::upsert_all(conn, records))
            .map_err(DbError::from)
    }

    fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<PackageRecord>> {
        let limit = limit.map(|lim| i64::try_from(lim).unwrap_or(i64::MAX));
        let rows = CatalogRepository::search(&mut self.conn(), query, limit)?;
        Ok(rows.into_iter().map(PackageRecord::from).collect())
    }

    fn find(&self, pkg_id: &str) -> Result<Option<PackageRecord>> {
        let row = CatalogRepository::find_by_pkg_id(&mut self.conn(), pkg_id)?;
        Ok(row.map(PackageRecord::from))
    }

    fn records_for_repo(&self, repo_name: &str) -> Result<Vec<PackageRecord>> {
        let rows = CatalogRepository::list_by_repo(&mut self.conn(), repo_name)?;
        Ok(rows.into_iter().map(PackageRecord::from).collect())
    }

    fn count(&self) -> Result<usize> {
        let count = CatalogRepository::count(&mut self.conn())?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(pkg_id: &str, name: &str, repo: &str) -> PackageRecord {
        PackageRecord {
            package_id: pkg_id.into(),
            name: name.into(),
            summary: format!("{name} summary"),
            download_url: format!("https://f-droid.org/repo/{pkg_id}.apk"),
            category: "Other".into(),
            repo_name: repo.into(),
            screenshots: vec!["https://f-droid.org/repo/a.png".into()],
            anti_features: vec!["Ads".into(), "Tracking".into()],
            version_code: 3,
            size: 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_replace_all_round_trips_records() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let app = record("org.app", "App", "fdroid");

        assert_eq!(db.replace_all(std::slice::from_ref(&app)).unwrap(), 1);
        assert_eq!(db.find("org.app").unwrap(), Some(app));
        assert_eq!(db.find("org.missing").unwrap(), None);
    }

    #[test]
    fn test_replace_all_drops_previous_rows() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        db.replace_all(&[
            record("org.a", "A", "fdroid"),
            record("org.b", "B", "fdroid"),
        ])
        .unwrap();
        db.replace_all(&[record("org.c", "C", "fdroid")]).unwrap();

        assert_eq!(db.count().unwrap(), 1);
        assert!(db.find("org.a").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        let count = db
            .replace_all(&[
                record("org.app", "Old", "fdroid-archive"),
                record("org.app", "New", "fdroid"),
            ])
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(db.find("org.app").unwrap().unwrap().name, "New");
    }

    #[test]
    fn test_search_is_case_insensitive_and_ordered() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        db.replace_all(&[
            record("org.mozilla.fennec", "Fennec", "fdroid"),
            record("org.fire", "Aurora Fire", "fdroid"),
            record("org.other", "Other", "fdroid"),
        ])
        .unwrap();

        let names: Vec<_> = db
            .search("FIRE", None)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Aurora Fire"]);

        let by_id = db.search("mozilla", None).unwrap();
        assert_eq!(by_id.len(), 1);

        let all = db.search("", Some(2)).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Aurora Fire");

        assert!(db.search("%", None).unwrap().is_empty());
    }

    #[test]
    fn test_records_for_repo_and_clear() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        db.replace_all(&[
            record("org.a", "A", "fdroid"),
            record("org.b", "B", "archive"),
        ])
        .unwrap();

        let archive = db.records_for_repo("archive").unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].package_id, "org.b");

        db.clear().unwrap();
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_bulk_upsert_updates_in_place() {
        let db = CatalogDatabase::open_in_memory().unwrap();
        db.bulk_upsert(&[record("org.a", "A", "fdroid")]).unwrap();
        let mut updated = record("org.a", "A2", "fdroid");
        updated.version_code = 4;
        db.bulk_upsert(&[updated, record("org.b", "B", "fdroid")])
            .unwrap();

        assert_eq!(db.count().unwrap(), 2);
        assert_eq!(db.find("org.a").unwrap().unwrap().version_code, 4);
    }

    #[test]
    fn test_open_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        {
            let db = CatalogDatabase::open(&path).unwrap();
            db.replace_all(&[record("org.a", "A", "fdroid")]).unwrap();
        }

        let db = CatalogDatabase::open(&path).unwrap();
        assert_eq!(db.count().unwrap(), 1);
    }
}
