use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use cli::{Args, Commands};
use depot_config::{
    config::{default_config_path, Config},
    error::ConfigError,
};
use depot_events::{ChannelSink, EventSinkHandle, NullSink};
use depot_operations::{DepotContext, DepotResult};
use depot_utils::path::resolve_path;
use install::{clean_cache, install_packages};
use list::{list_repositories, query_package, search_packages};
use logging::setup_logging;
use progress::{spawn_event_handler, ProgressGuard};
use settings::{handle_config, handle_repo_action};
use sync::{sync_catalog, watch};
use tracing::debug;
use utils::{progress_enabled, set_flag, COLOR, PROGRESS};

mod cli;
mod install;
mod list;
mod logging;
mod progress;
mod settings;
mod sync;
mod utils;

/// Wire the context; progress events go to the terminal only when progress is enabled.
pub fn create_context(config: Config) -> DepotResult<(DepotContext, Option<ProgressGuard>)> {
    if progress_enabled() {
        let (sink, receiver) = ChannelSink::new();
        let events: EventSinkHandle = Arc::new(sink);
        let ctx = DepotContext::new(config, events)?;
        let guard = spawn_event_handler(receiver);
        Ok((ctx, Some(guard)))
    } else {
        let events: EventSinkHandle = Arc::new(NullSink);
        let ctx = DepotContext::new(config, events)?;
        Ok((ctx, None))
    }
}

fn config_path(args: &Args) -> DepotResult<PathBuf> {
    match &args.config {
        Some(path) => Ok(resolve_path(path).map_err(ConfigError::from)?),
        None => Ok(default_config_path()),
    }
}

async fn handle_cli() -> DepotResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        set_flag(&COLOR, false);
    }
    if args.no_progress || args.json || args.quiet {
        set_flag(&PROGRESS, false);
    }

    let config_path = config_path(&args)?;
    debug!(path = %config_path.display(), "using config");
    let mut config = Config::load(&config_path)?;

    let command = match args.command {
        Commands::Config {
            action,
        } => return handle_config(&mut config, &config_path, action),
        Commands::Repos {
            action: Some(action),
        } => return handle_repo_action(&mut config, &config_path, action),
        command => command,
    };

    let (ctx, guard) = create_context(config)?;

    let result = match command {
        Commands::Sync {
            force,
            if_due,
        } => sync_catalog(&ctx, force, if_due).await,
        Commands::Watch => watch(&ctx).await,
        Commands::Search {
            query,
            limit,
        } => search_packages(&ctx, query, limit).await,
        Commands::Info {
            package,
        } => query_package(&ctx, package).await,
        Commands::Install {
            packages,
        } => install_packages(&ctx, &packages).await,
        Commands::Repos {
            action: None,
        } => list_repositories(&ctx),
        Commands::Clean => clean_cache(&ctx),
        Commands::Config {
            ..
        }
        | Commands::Repos {
            ..
        } => Ok(()),
    };

    drop(ctx);
    if let Some(guard) = guard {
        guard.finish();
    }
    progress::stop();

    result
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
