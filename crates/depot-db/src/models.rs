use depot_registry::PackageRecord;
use diesel::prelude::*;

use crate::schema::packages;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Package {
    pub pkg_id: String,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub icon_url: String,
    pub version_name: String,
    pub version_code: i64,
    pub size: i64,
    pub download_url: String,
    pub license: String,
    pub category: String,
    pub author: String,
    pub homepage: String,
    pub source_url: String,
    pub added: i64,
    pub last_updated: i64,
    pub screenshots: String,
    pub anti_features: String,
    pub repo_name: String,
    pub sha256: String,
    pub changelog: String,
}

impl From<Package> for PackageRecord {
    fn from(row: Package) -> Self {
        PackageRecord {
            package_id: row.pkg_id,
            name: row.name,
            summary: row.summary,
            description: row.description,
            icon_url: row.icon_url,
            version_name: row.version_name,
            version_code: row.version_code,
            size: row.size,
            download_url: row.download_url,
            license: row.license,
            category: row.category,
            author: row.author,
            homepage: row.homepage,
            source_url: row.source_url,
            added: row.added,
            last_updated: row.last_updated,
            screenshots: serde_json::from_str(&row.screenshots).unwrap_or_default(),
            anti_features: serde_json::from_str(&row.anti_features).unwrap_or_default(),
            repo_name: row.repo_name,
            sha256: row.sha256,
            changelog: row.changelog,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = packages)]
pub struct NewPackage<'a> {
    pub pkg_id: &'a str,
    pub name: &'a str,
    pub summary: &'a str,
    pub description: &'a str,
    pub icon_url: &'a str,
    pub version_name: &'a str,
    pub version_code: i64,
    pub size: i64,
    pub download_url: &'a str,
    pub license: &'a str,
    pub category: &'a str,
    pub author: &'a str,
    pub homepage: &'a str,
    pub source_url: &'a str,
    pub added: i64,
    pub last_updated: i64,
    pub screenshots: String,
    pub anti_features: String,
    pub repo_name: &'a str,
    pub sha256: &'a str,
    pub changelog: &'a str,
}

impl<'a> From<&'a PackageRecord> for NewPackage<'a> {
    fn from(record: &'a PackageRecord) -> Self {
        let to_json = |list: &[String]| serde_json::to_string(list).unwrap_or_else(|_| "[]".into());

        NewPackage {
            pkg_id: &record.package_id,
            name: &record.name,
            summary: &record.summary,
            description: &record.description,
            icon_url: &record.icon_url,
            version_name: &record.version_name,
            version_code: record.version_code,
            size: record.size,
            download_url: &record.download_url,
            license: &record.license,
            category: &record.category,
            author: &record.author,
            homepage: &record.homepage,
            source_url: &record.source_url,
            added: record.added,
            last_updated: record.last_updated,
            screenshots: to_json(&record.screenshots),
            anti_features: to_json(&record.anti_features),
            repo_name: &record.repo_name,
            sha256: &record.sha256,
            changelog: &record.changelog,
        }
    }
}
