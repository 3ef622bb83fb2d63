//! Catalog queries.

use depot_registry::PackageRecord;
use diesel::{dsl::sql, prelude::*, sql_types::Text};

use crate::{
    models::{NewPackage, Package},
    schema::packages,
};

/// Escapes `LIKE` wildcards so user input only matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct CatalogRepository;

impl CatalogRepository {
    /// Case-insensitive substring search over name, summary and package id, ordered by name.
    pub fn search(
        conn: &mut SqliteConnection,
        query: &str,
        limit: Option<i64>,
    ) -> QueryResult<Vec<Package>> {
        let pattern = like_pattern(query.trim());

        let mut query = packages::table
            .filter(
                sql::<diesel::sql_types::Bool>("LOWER(name) LIKE ")
                    .bind::<Text, _>(pattern.clone())
                    .sql(" ESCAPE '\\' OR LOWER(summary) LIKE ")
                    .bind::<Text, _>(pattern.clone())
                    .sql(" ESCAPE '\\' OR LOWER(pkg_id) LIKE ")
                    .bind::<Text, _>(pattern)
                    .sql(" ESCAPE '\\'"),
            )
            .order((packages::name.asc(), packages::pkg_id.asc()))
            .into_boxed();

        if let Some(lim) = limit {
            query = query.limit(lim);
        }

        query.select(Package::as_select()).load(conn)
    }

    pub fn find_by_pkg_id(
        conn: &mut SqliteConnection,
        pkg_id: &str,
    ) -> QueryResult<Option<Package>> {
        packages::table
            .filter(packages::pkg_id.eq(pkg_id))
            .select(Package::as_select())
            .first(conn)
            .optional()
    }

    pub fn list_by_repo(conn: &mut SqliteConnection, repo_name: &str) -> QueryResult<Vec<Package>> {
        packages::table
            .filter(packages::repo_name.eq(repo_name))
            .order(packages::pkg_id.asc())
            .select(Package::as_select())
            .load(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }

    pub fn delete_all(conn: &mut SqliteConnection) -> QueryResult<usize> {
        diesel::delete(packages::table).execute(conn)
    }

    /// Inserts or replaces one row per record; a later record with the same id wins.
    pub fn upsert_all(conn: &mut SqliteConnection, records: &[PackageRecord]) -> QueryResult<usize> {
        let mut written = 0;
        for record in records {
            written += diesel::replace_into(packages::table)
                .values(NewPackage::from(record))
                .execute(conn)?;
        }
        Ok(written)
    }

    /// Clears the table and inserts `records` in one transaction.
    pub fn replace_all(conn: &mut SqliteConnection, records: &[PackageRecord]) -> QueryResult<usize> {
        conn.transaction(|conn| {
            Self::delete_all(conn)?;
            Self::upsert_all(conn, records)?;
            Self::count(conn).map(|count| count as usize)
        })
    }
}
