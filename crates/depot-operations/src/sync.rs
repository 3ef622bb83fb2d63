//! Sync orchestrator: fetches and parses every enabled repository in order, then replaces the
//! catalog in one transaction.

use std::{collections::HashMap, io::Read, sync::Arc};

use depot_config::{
    config::is_sync_due,
    repository::Repository,
    state::{CacheEntry, HeaderCache},
};
use depot_events::{DepotEvent, SyncStage};
use depot_registry::{FetchOutcome, IndexParser, PackageRecord, RegistryError};
use depot_utils::time::now_millis;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    context::DepotContext,
    error::{DepotError, DepotResult},
    types::{RepoOutcome, RepoSyncResult, SyncReport},
};

/// Batches buffered between the parser thread and the collector.
const BATCH_BUFFER: usize = 4;

/// What a repository hands to the catalog at the end of a cycle.
enum Contribution {
    Fresh(Vec<PackageRecord>),
    /// Keep whatever the catalog already holds for this repository.
    Retained,
}

/// Catalog under construction. A later repository replaces an earlier one's record for the
/// same package id in place.
#[derive(Default)]
struct CatalogBuilder {
    records: Vec<PackageRecord>,
    positions: HashMap<String, usize>,
}

impl CatalogBuilder {
    fn extend(&mut self, records: impl IntoIterator<Item = PackageRecord>) {
        for record in records {
            match self.positions.get(&record.package_id) {
                Some(&index) => self.records[index] = record,
                None => {
                    self.positions
                        .insert(record.package_id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
    }
}

/// Syncs all enabled repositories.
///
/// Per-repository failures never abort the cycle; they are reported in the returned
/// [`SyncReport`] and as [`DepotEvent::SyncFailed`]. Errors are only returned when the catalog
/// or the sync state cannot be written.
///
/// Unchanged and failed repositories keep the records the catalog already holds for them.
/// Package ids such a repository lost to another repository earlier are not restored.
pub async fn sync_all(ctx: &DepotContext, force: bool) -> DepotResult<SyncReport> {
    let _guard = ctx.lock_sync().await;

    let repos: Vec<Repository> = ctx.config().enabled_repositories().cloned().collect();
    let total = repos.len();
    debug!(total, force, "syncing repositories");

    let mut report = SyncReport::default();
    let mut contributions = Vec::with_capacity(total);
    let mut validators: Vec<CacheEntry> = Vec::new();

    for (index, repo) in repos.iter().enumerate() {
        let progress = |stage: SyncStage| {
            ctx.events().emit(DepotEvent::SyncProgress {
                repo_name: repo.name.clone(),
                index,
                total,
                stage,
            });
        };

        progress(SyncStage::Fetching);
        let previous = ctx.state().get(repo.base_url());

        let result = match ctx.fetcher().fetch(repo, previous.as_ref(), force).await {
            FetchOutcome::Success(fetched) => {
                progress(SyncStage::Parsing);
                parse_index(ctx, repo, fetched.body)
                    .await
                    .map(|records| (records, fetched.cache_entry))
            }
            FetchOutcome::Unchanged(_) => {
                debug!(repo = %repo.name, "repository unchanged");
                progress(SyncStage::UpToDate);
                contributions.push(Contribution::Retained);
                report.repos.push(RepoSyncResult {
                    repo_name: repo.name.clone(),
                    outcome: RepoOutcome::Unchanged,
                });
                continue;
            }
            FetchOutcome::Failed(err) => Err(err.into()),
        };

        let outcome = match result {
            Ok((records, cache_entry)) => {
                let packages = records.len();
                info!(repo = %repo.name, packages, "repository parsed");
                progress(SyncStage::Complete {
                    package_count: packages as u64,
                });
                validators.push(cache_entry);
                contributions.push(Contribution::Fresh(records));
                RepoOutcome::Updated {
                    packages,
                }
            }
            Err(err) => {
                warn!(repo = %repo.name, "Failed to sync repository: {err}");
                ctx.events().emit(DepotEvent::SyncFailed {
                    repo_name: repo.name.clone(),
                    error: err.to_string(),
                });
                contributions.push(Contribution::Retained);
                RepoOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        report.repos.push(RepoSyncResult {
            repo_name: repo.name.clone(),
            outcome,
        });
    }

    let has_fresh = contributions.iter().any(
        |contribution| matches!(contribution, Contribution::Fresh(records) if !records.is_empty()),
    );

    if has_fresh {
        let mut catalog = CatalogBuilder::default();
        for (repo, contribution) in repos.iter().zip(contributions) {
            match contribution {
                Contribution::Fresh(records) => catalog.extend(records),
                Contribution::Retained => catalog.extend(retained_records(ctx, &repo.name).await?),
            }
        }

        let package_count = replace_catalog(ctx, catalog.records).await?;
        info!(package_count, "catalog replaced");
        ctx.events().emit(DepotEvent::CatalogReplaced {
            package_count,
        });
        report.catalog_replaced = true;
        report.package_count = package_count;
    } else {
        debug!("no fresh records, catalog left untouched");
    }

    for entry in validators {
        ctx.state().put(entry)?;
    }
    if report.catalog_replaced || !report.has_failures() {
        ctx.state().set_last_sync(now_millis())?;
    }

    Ok(report)
}

/// Runs [`sync_all`] without forcing if the configured interval has elapsed since the last
/// sync. Returns `None` when no sync was due.
pub async fn sync_if_due(ctx: &DepotContext, now: i64) -> DepotResult<Option<SyncReport>> {
    let interval = ctx.config().sync_interval_ms();
    let last_sync = ctx.state().last_sync();

    if !is_sync_due(interval, last_sync, now) {
        debug!(?last_sync, "sync not due");
        return Ok(None);
    }
    sync_all(ctx, false).await.map(Some)
}

/// Streams `body` through the parser on a blocking worker and collects the emitted batches.
async fn parse_index(
    ctx: &DepotContext,
    repo: &Repository,
    body: Box<dyn Read + Send>,
) -> DepotResult<Vec<PackageRecord>> {
    let parser = IndexParser::new(repo, ctx.device().clone()).with_locale(ctx.config().locale());
    let (sender, mut receiver) = mpsc::channel::<Vec<PackageRecord>>(BATCH_BUFFER);

    let worker = tokio::task::spawn_blocking(move || {
        parser.parse(body, |batch| {
            sender
                .blocking_send(batch)
                .map_err(|_| RegistryError::ConsumerClosed)
        })
    });

    let mut records = Vec::new();
    while let Some(batch) = receiver.recv().await {
        records.extend(batch);
    }

    let summary = worker
        .await
        .map_err(|err| DepotError::Custom(format!("index parse task failed: {err}")))??;
    debug!(
        repo = %repo.name,
        packages = summary.packages,
        malformed = summary.malformed,
        incompatible = summary.incompatible,
        batches = summary.batches,
        "index parsed"
    );
    Ok(records)
}

async fn retained_records(ctx: &DepotContext, repo_name: &str) -> DepotResult<Vec<PackageRecord>> {
    let catalog = Arc::clone(ctx.catalog());
    let name = repo_name.to_string();
    let records = tokio::task::spawn_blocking(move || catalog.records_for_repo(&name))
        .await
        .map_err(|err| DepotError::Custom(format!("catalog task failed: {err}")))??;
    debug!(repo = repo_name, count = records.len(), "keeping stored records");
    Ok(records)
}

async fn replace_catalog(ctx: &DepotContext, records: Vec<PackageRecord>) -> DepotResult<usize> {
    let catalog = Arc::clone(ctx.catalog());
    let count = tokio::task::spawn_blocking(move || catalog.replace_all(&records))
        .await
        .map_err(|err| DepotError::Custom(format!("catalog task failed: {err}")))??;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pkg_id: &str, repo: &str) -> PackageRecord {
        PackageRecord {
            package_id: pkg_id.into(),
            repo_name: repo.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_later_repository_wins() {
        let mut catalog = CatalogBuilder::default();
        catalog.extend([record("a", "main"), record("b", "main")]);
        catalog.extend([record("b", "extra"), record("c", "extra")]);

        let ids: Vec<_> = catalog
            .records
            .iter()
            .map(|r| (r.package_id.as_str(), r.repo_name.as_str()))
            .collect();
        assert_eq!(ids, vec![("a", "main"), ("b", "extra"), ("c", "extra")]);
    }
}
