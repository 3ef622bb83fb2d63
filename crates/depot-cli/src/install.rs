use std::sync::Arc;

use depot_operations::{search, DepotContext, DepotError, DepotResult, InstallReport};
use nu_ansi_term::Color::{Green, Red};
use tracing::{debug, error, info, warn};

use crate::utils::{progress_enabled, Colored};

pub async fn install_packages(ctx: &DepotContext, packages: &[String]) -> DepotResult<()> {
    debug!(count = packages.len(), "installing packages");

    let mut records = Vec::with_capacity(packages.len());
    for pkg_id in packages {
        records.push(search::find_package(ctx, pkg_id).await?);
    }

    let pipeline = ctx.pipeline();
    let handles: Vec<_> = records
        .into_iter()
        .map(|record| pipeline.install(record))
        .collect();

    let cancel_pipeline = Arc::clone(pipeline);
    let ids = packages.to_vec();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads");
            for pkg_id in &ids {
                cancel_pipeline.cancel_download(pkg_id);
            }
        }
    });

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.wait().await);
    }
    interrupt.abort();

    summarize(&reports)
}

fn summarize(reports: &[InstallReport]) -> DepotResult<()> {
    let failed: Vec<_> = reports.iter().filter(|report| !report.success).collect();

    // Progress output already printed a line per package.
    if !progress_enabled() {
        for report in reports {
            match &report.error {
                None => info!("{}: installed", Colored(Green, &report.pkg_id)),
                Some(err) => error!("{}: {err}", Colored(Red, &report.pkg_id)),
            }
        }
    }

    if failed.iter().any(|report| report.is_permission_error()) {
        info!("Run `depot config set allow_unknown_sources true` to allow installing packages");
    }

    if failed.is_empty() {
        info!(
            "Installed {} of {} packages",
            Colored(Green, reports.len()),
            reports.len()
        );
        return Ok(());
    }

    Err(DepotError::Custom(format!(
        "{} of {} packages failed to install",
        failed.len(),
        reports.len()
    )))
}

pub fn clean_cache(ctx: &DepotContext) -> DepotResult<()> {
    let removed = ctx.pipeline().clean_cache()?;
    info!(
        removed,
        "Removed {} cached artifacts from {}",
        removed,
        ctx.pipeline().cache_dir().display()
    );
    Ok(())
}
