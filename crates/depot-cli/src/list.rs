use depot_config::state::HeaderCache;
use depot_operations::{search, DepotContext, DepotResult};
use depot_registry::PackageRecord;
use depot_utils::bytes::format_bytes;
use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed, Magenta, Red, Yellow};
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::{debug, info};

use crate::utils::{format_date, format_datetime, or_dash, term_width, Colored, Icons};

fn pretty_size(size: i64) -> String {
    if size > 0 {
        format_bytes(size as u64, 2)
    } else {
        "-".to_string()
    }
}

fn vec_string(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        serde_json::to_string(values).ok()
    }
}

pub async fn search_packages(
    ctx: &DepotContext,
    query: String,
    limit: Option<usize>,
) -> DepotResult<()> {
    debug!(query = %query, limit = ?limit, "searching packages");

    let packages = search::search_packages(ctx, &query, limit).await?;
    let total = search::count_packages(ctx).await?;

    for package in &packages {
        info!(
            pkg_name = %package.name,
            pkg_id = %package.package_id,
            repo_name = %package.repo_name,
            version = %package.version_name,
            summary = %package.summary,
            size = package.size,
            "{}#{}:{} | {} - {} ({})",
            Colored(Blue, &package.name),
            Colored(Cyan, &package.package_id),
            Colored(Green, &package.repo_name),
            Colored(LightRed, &package.version_name),
            package.summary,
            pretty_size(package.size)
        );
    }

    let mut builder = Builder::new();
    builder.push_record([
        format!("{} Found", Icons::PACKAGE),
        format!("{}", Colored(Cyan, packages.len())),
    ]);
    builder.push_record([
        format!("{} Catalog", Icons::TYPE),
        format!("{} packages", Colored(Blue, total)),
    ]);

    let table = builder
        .build()
        .with(Panel::header("Search Results"))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string();

    info!("\n{table}");

    Ok(())
}

fn package_table(package: &PackageRecord) -> String {
    let mut builder = Builder::new();

    builder.push_record([
        format!("{} Name", Icons::PACKAGE),
        format!(
            "{}#{}:{}",
            Colored(Blue, &package.name),
            Colored(Cyan, &package.package_id),
            Colored(Green, &package.repo_name)
        ),
    ]);
    builder.push_record([
        format!("{} Summary", Icons::DESCRIPTION),
        or_dash(&package.summary).to_string(),
    ]);
    builder.push_record([
        format!("{} Version", Icons::VERSION),
        format!(
            "{} ({})",
            Colored(Blue, &package.version_name),
            package.version_code
        ),
    ]);
    builder.push_record([format!("{} Size", Icons::SIZE), pretty_size(package.size)]);

    if package.has_checksum() {
        builder.push_record([
            format!("{} Checksum", Icons::CHECKSUM),
            format!("{} (sha256)", Colored(Blue, &package.sha256)),
        ]);
    }

    builder.push_record([
        format!("{} License", Icons::LICENSE),
        or_dash(&package.license).to_string(),
    ]);
    builder.push_record([
        format!("{} Category", Icons::TYPE),
        Colored(Magenta, &package.category).to_string(),
    ]);

    if !package.author.is_empty() {
        builder.push_record([format!("{} Author", Icons::MAINTAINER), package.author.clone()]);
    }

    if !package.homepage.is_empty() {
        builder.push_record([
            format!("{} Homepage", Icons::HOME),
            Colored(Blue, &package.homepage).to_string(),
        ]);
    }

    if !package.source_url.is_empty() {
        builder.push_record([
            format!("{} Source", Icons::LINK),
            Colored(Blue, &package.source_url).to_string(),
        ]);
    }

    builder.push_record([
        format!("{} Download", Icons::LINK),
        Colored(Blue, &package.download_url).to_string(),
    ]);
    builder.push_record([
        format!("{} Added", Icons::CALENDAR),
        format_date(package.added),
    ]);
    builder.push_record([
        format!("{} Updated", Icons::CALENDAR),
        format_date(package.last_updated),
    ]);

    if !package.anti_features.is_empty() {
        builder.push_record([
            format!("{} Anti-features", Icons::WARNING),
            Colored(Yellow, package.anti_features.join(", ")).to_string(),
        ]);
    }

    if !package.description.is_empty() {
        builder.push_record([
            format!("{} Description", Icons::DESCRIPTION),
            package.description.clone(),
        ]);
    }

    if !package.changelog.is_empty() {
        builder.push_record([
            format!("{} Changelog", Icons::LINK),
            Colored(Blue, &package.changelog).to_string(),
        ]);
    }

    builder
        .build()
        .with(Style::rounded())
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string()
}

pub async fn query_package(ctx: &DepotContext, pkg_id: String) -> DepotResult<()> {
    debug!(pkg_id = %pkg_id, "querying package info");

    let package = search::find_package(ctx, &pkg_id).await?;
    let table = package_table(&package);

    info!(
        pkg_name = %package.name,
        pkg_id = %package.package_id,
        repo_name = %package.repo_name,
        version = %package.version_name,
        version_code = package.version_code,
        license = %package.license,
        category = %package.category,
        download_url = %package.download_url,
        sha256 = %package.sha256,
        anti_features = vec_string(&package.anti_features),
        screenshots = vec_string(&package.screenshots),
        "\n{table}"
    );

    Ok(())
}

pub fn list_repositories(ctx: &DepotContext) -> DepotResult<()> {
    let config = ctx.config();

    let mut builder = Builder::new();
    builder.push_record(["Name", "URL", "Status", "Validator"]);

    for repo in &config.repositories {
        let status = if repo.is_enabled() {
            Colored(Green, "enabled").to_string()
        } else {
            Colored(Red, "disabled").to_string()
        };
        let validator = ctx
            .state()
            .get(repo.base_url())
            .and_then(|entry| entry.etag.or(entry.last_modified))
            .unwrap_or_else(|| "-".to_string());

        builder.push_record([
            Colored(Cyan, &repo.name).to_string(),
            repo.url.clone(),
            status,
            validator,
        ]);
    }

    let last_sync = ctx
        .state()
        .last_sync()
        .map(format_datetime)
        .unwrap_or_else(|| "never".to_string());

    let table = builder
        .build()
        .with(Panel::footer(format!("Last sync: {last_sync}")))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string();

    info!("\n{table}");

    Ok(())
}
