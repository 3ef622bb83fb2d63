use std::sync::Arc;

use crate::error::DepotError;

// ---- Sync ----

/// What one repository contributed to a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Fetched and parsed; `packages` records were produced.
    Updated { packages: usize },
    /// The server reported no change.
    Unchanged,
    /// Fetching or parsing failed; nothing was contributed.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSyncResult {
    pub repo_name: String,
    pub outcome: RepoOutcome,
}

/// Report returned after a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub repos: Vec<RepoSyncResult>,
    /// Whether the catalog was replaced this cycle.
    pub catalog_replaced: bool,
    /// Catalog size after replacement; 0 when untouched.
    pub package_count: usize,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.repos.iter().filter_map(|repo| {
            match &repo.outcome {
                RepoOutcome::Failed {
                    error,
                } => Some((repo.repo_name.as_str(), error.as_str())),
                _ => None,
            }
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// One user-facing message naming every failing repository, or `None` if all succeeded.
    pub fn error_summary(&self) -> Option<String> {
        let failed: Vec<_> = self.failed().map(|(name, _)| name).collect();
        match failed.as_slice() {
            [] => None,
            [one] => Some(format!("Failed to sync repository {one}")),
            many => Some(format!("Failed to sync repositories: {}", many.join(", "))),
        }
    }
}

// ---- Install ----

/// Where an install currently is. Observed through an [`crate::install::InstallHandle`].
#[derive(Debug, Clone)]
pub enum InstallProgress {
    Queued,
    /// Fraction of the artifact downloaded, `0.0..=1.0`.
    Downloading(f32),
    Verifying,
    Installing,
    Finished(InstallReport),
}

impl InstallProgress {
    pub fn is_finished(&self) -> bool {
        matches!(self, InstallProgress::Finished(_))
    }
}

/// Final result of an install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub pkg_id: String,
    pub success: bool,
    /// The last error when `success` is false.
    pub error: Option<Arc<DepotError>>,
}

impl InstallReport {
    pub(crate) fn from_result(pkg_id: &str, result: Result<(), DepotError>) -> Self {
        match result {
            Ok(()) => {
                Self {
                    pkg_id: pkg_id.to_string(),
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                Self {
                    pkg_id: pkg_id.to_string(),
                    success: false,
                    error: Some(Arc::new(err)),
                }
            }
        }
    }

    pub fn is_permission_error(&self) -> bool {
        matches!(self.error.as_deref(), Some(DepotError::PermissionRequired(_)))
    }
}
