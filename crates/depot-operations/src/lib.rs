//! Sync and acquisition operations for depot.
//!
//! [`DepotContext`] is the composition root: it is built once from a
//! [`Config`](depot_config::config::Config) and passed to every operation. Syncing lives in
//! [`sync`], installing in [`install`], catalog queries in [`search`].

pub mod context;
pub mod error;
pub mod install;
pub mod installer;
pub mod progress;
pub mod search;
pub mod sync;
pub mod types;

pub use context::{DepotContext, DepotContextBuilder};
pub use error::{DepotError, DepotResult};
pub use install::{InstallHandle, InstallPipeline, PipelineOptions};
pub use installer::{CommandInstaller, ContentUri, InstallFlow, PackageInstaller};
pub use types::*;
