use std::sync::Arc;

use depot_registry::PackageRecord;
use tracing::{debug, trace};

use crate::{
    context::DepotContext,
    error::{DepotError, DepotResult},
};

/// Case-insensitive substring search over the catalog, ordered by name.
///
/// `limit` falls back to the configured `search_limit`.
pub async fn search_packages(
    ctx: &DepotContext,
    query: &str,
    limit: Option<usize>,
) -> DepotResult<Vec<PackageRecord>> {
    let limit = limit.unwrap_or_else(|| ctx.config().search_limit());
    debug!(query, limit, "searching packages");

    let catalog = Arc::clone(ctx.catalog());
    let query = query.to_string();
    let packages = tokio::task::spawn_blocking(move || catalog.search(&query, Some(limit)))
        .await
        .map_err(|err| DepotError::Custom(format!("search task failed: {err}")))??;

    trace!(count = packages.len(), "search finished");
    Ok(packages)
}

/// Looks up one package by id.
pub async fn find_package(ctx: &DepotContext, pkg_id: &str) -> DepotResult<PackageRecord> {
    debug!(pkg_id, "looking up package");
    let catalog = Arc::clone(ctx.catalog());
    let id = pkg_id.to_string();

    tokio::task::spawn_blocking(move || catalog.find(&id))
        .await
        .map_err(|err| DepotError::Custom(format!("lookup task failed: {err}")))??
        .ok_or_else(|| DepotError::PackageNotFound(pkg_id.to_string()))
}

/// Number of packages in the catalog.
pub async fn count_packages(ctx: &DepotContext) -> DepotResult<usize> {
    let catalog = Arc::clone(ctx.catalog());
    Ok(tokio::task::spawn_blocking(move || catalog.count())
        .await
        .map_err(|err| DepotError::Custom(format!("count task failed: {err}")))??)
}
