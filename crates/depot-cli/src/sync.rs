use std::time::Duration;

use depot_operations::{
    sync::{sync_all, sync_if_due},
    DepotContext, DepotError, DepotResult, RepoOutcome, SyncReport,
};
use depot_utils::time::now_millis;
use nu_ansi_term::Color::{Green, Yellow};
use tracing::{debug, error, info, warn};

use crate::utils::{progress_enabled, Colored};

/// Upper bound between due-checks while watching, so interval changes are noticed.
const MAX_WATCH_TICK: Duration = Duration::from_secs(60);
const MIN_WATCH_TICK: Duration = Duration::from_secs(1);

pub async fn sync_catalog(ctx: &DepotContext, force: bool, if_due: bool) -> DepotResult<()> {
    let report = if if_due {
        match sync_if_due(ctx, now_millis()).await? {
            Some(report) => report,
            None => {
                info!("Catalog is fresh, next sync is not due yet");
                return Ok(());
            }
        }
    } else {
        sync_all(ctx, force).await?
    };

    print_report(&report);

    match report.error_summary() {
        Some(summary) if !report.catalog_replaced && report.repos.len() == report.failed().count() => {
            Err(DepotError::Custom(summary))
        }
        _ => Ok(()),
    }
}

fn print_report(report: &SyncReport) {
    // Progress bars already print one line per repository.
    if !progress_enabled() {
        for repo in &report.repos {
            match &repo.outcome {
                RepoOutcome::Updated {
                    packages,
                } => info!("{}: {packages} packages", Colored(Green, &repo.repo_name)),
                RepoOutcome::Unchanged => info!("{}: up to date", Colored(Green, &repo.repo_name)),
                RepoOutcome::Failed {
                    error,
                } => warn!("{}: {error}", Colored(Yellow, &repo.repo_name)),
            }
        }
    }

    if report.catalog_replaced {
        info!(
            "Catalog updated: {} packages",
            Colored(Green, report.package_count)
        );
    } else if report.repos.is_empty() {
        warn!("No repositories are enabled");
    } else {
        info!("Catalog unchanged");
    }

    if let Some(summary) = report.error_summary() {
        error!("{summary}");
    }
}

fn watch_tick(interval_ms: u128) -> Duration {
    let interval = Duration::from_millis(interval_ms.min(MAX_WATCH_TICK.as_millis()) as u64);
    interval.clamp(MIN_WATCH_TICK, MAX_WATCH_TICK)
}

/// Run due syncs until interrupted. Failures of a single pass are logged and retried on
/// the next tick.
pub async fn watch(ctx: &DepotContext) -> DepotResult<()> {
    let interval_ms = ctx.config().sync_interval_ms();
    if interval_ms == u128::MAX {
        return Err(DepotError::Custom(
            "sync_interval is set to `never`, nothing to watch".into(),
        ));
    }

    let mut ticker = tokio::time::interval(watch_tick(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Watching for due syncs, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped watching");
                return Ok(());
            }
        }

        match sync_if_due(ctx, now_millis()).await {
            Ok(Some(report)) => print_report(&report),
            Ok(None) => debug!("sync not due"),
            Err(err) => error!("Sync failed: {err}"),
        }
    }
}
