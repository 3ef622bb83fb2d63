use serde::{Deserialize, Serialize};

/// Category assigned to packages that declare none.
pub const DEFAULT_CATEGORY: &str = "Other";

/// A catalog entry: one package with its selected version, as produced by a sync.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub package_id: String,
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
    pub screenshots: Vec<String>,
    pub anti_features: Vec<String>,
    pub repo_name: String,
    pub sha256: String,
    pub changelog: String,
}

impl PackageRecord {
    /// Whether a digest is published; blank digests mean verification is not required.
    pub fn has_checksum(&self) -> bool {
        !self.sha256.trim().is_empty()
    }
}

/// `http://` and `https://` URLs are absolute; everything else is relative to a repository.
pub fn is_absolute_url(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Joins a repository base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
