//! Repository index handling for depot.
//!
//! This crate fetches `index-v2.json` documents from repositories with conditional requests
//! and retries, then streams them through a tolerant parser that picks the best compatible
//! version of every package and emits [`PackageRecord`]s in bounded batches.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use depot_config::repository::Repository;
//! use depot_registry::{
//!     DeviceProfile, FetchOutcome, IndexFetcher, IndexParser, UreqTransport,
//! };
//!
//! async fn sync_repo(repo: &Repository) -> depot_registry::Result<()> {
//!     let transport = Arc::new(UreqTransport::new(ureq::Agent::new_with_defaults()));
//!     let fetcher = IndexFetcher::new(transport, "depot/0.1.0");
//!
//!     if let FetchOutcome::Success(index) = fetcher.fetch(repo, None, false).await {
//!         let device = DeviceProfile::new(34, ["arm64-v8a"]);
//!         let parser = IndexParser::new(repo, device);
//!         parser.parse(index.body, |batch| {
//!             println!("{} packages", batch.len());
//!             Ok(())
//!         })?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fetch;
pub mod index;
pub mod parse;
pub mod record;
pub mod select;
pub mod transport;

pub use error::{ErrorContext, RegistryError, Result};
pub use fetch::{FetchOutcome, FetchedIndex, IndexFetcher, RetryPolicy};
pub use parse::{IndexParser, ParseSummary, DEFAULT_BATCH_SIZE};
pub use record::PackageRecord;
pub use select::{BestVersion, DeviceProfile, VersionCandidate};
pub use transport::{IndexRequest, IndexResponse, IndexTransport, UreqTransport};
