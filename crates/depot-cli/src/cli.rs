use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// List every setting with its current value
    #[clap(name = "list", visible_alias = "ls")]
    List,

    /// Print the value of a setting
    #[command(arg_required_else_help = true)]
    Get {
        /// Setting key
        key: String,
    },

    /// Change a setting and save the configuration file
    #[command(arg_required_else_help = true)]
    Set {
        /// Setting key
        key: String,

        /// New value
        value: String,
    },
}

#[derive(Subcommand)]
pub enum RepoAction {
    /// Include a repository in future syncs
    #[command(arg_required_else_help = true)]
    Enable {
        /// Repository name
        name: String,
    },

    /// Exclude a repository from future syncs
    #[command(arg_required_else_help = true)]
    Disable {
        /// Repository name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the configuration, or inspect and change individual settings
    Config {
        #[clap(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Refresh the package catalog from enabled repositories
    #[clap(name = "sync", visible_alias = "S", visible_alias = "fetch")]
    Sync {
        /// Ignore cached validators and download every index again
        #[arg(short, long)]
        force: bool,

        /// Only sync when the configured interval has elapsed
        #[arg(long, conflicts_with = "force")]
        if_due: bool,
    },

    /// Keep the catalog fresh, syncing whenever the interval elapses
    #[clap(name = "watch")]
    Watch,

    /// Search the catalog
    #[command(arg_required_else_help = true)]
    #[clap(name = "search", visible_alias = "s", visible_alias = "find")]
    Search {
        /// Text to match against names, summaries and package ids
        query: String,

        /// Maximum number of results
        #[arg(required = false, short, long)]
        limit: Option<usize>,
    },

    /// Show details of a package
    #[command(arg_required_else_help = true)]
    #[clap(name = "info", visible_alias = "query", visible_alias = "Q")]
    Info {
        /// Package id
        package: String,
    },

    /// Download, verify and install packages
    #[command(arg_required_else_help = true)]
    #[clap(name = "install", visible_alias = "i", visible_alias = "add")]
    Install {
        /// Package ids to install
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// List configured repositories, or enable and disable them
    #[clap(name = "repos", visible_alias = "repo")]
    Repos {
        #[clap(subcommand)]
        action: Option<RepoAction>,
    },

    /// Remove downloaded artifacts from the cache
    #[clap(name = "clean")]
    Clean,
}
