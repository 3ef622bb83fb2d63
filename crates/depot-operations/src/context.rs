//! Composition root: builds every collaborator once and hands them to operations.

use std::sync::Arc;

use depot_config::{config::Config, state::StateStore};
use depot_db::{CatalogDatabase, CatalogStore};
use depot_dl::{
    http_client::ClientConfig,
    manager::{DownloadManager, TransferService},
};
use depot_events::{EventSinkHandle, InstallResultBus, NullSink};
use depot_registry::{DeviceProfile, IndexFetcher, IndexTransport, RetryPolicy, UreqTransport};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    error::DepotResult,
    install::{InstallPipeline, PipelineOptions},
    installer::{CommandInstaller, PackageInstaller},
};

const CATALOG_FILE: &str = "catalog.db";

/// Shared handle to everything an operation needs. Cheap to clone.
#[derive(Clone)]
pub struct DepotContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: Config,
    events: EventSinkHandle,
    device: DeviceProfile,
    state: Arc<StateStore>,
    catalog: Arc<dyn CatalogStore>,
    fetcher: IndexFetcher,
    pipeline: Arc<InstallPipeline>,
    results: InstallResultBus,
    sync_lock: Mutex<()>,
}

impl DepotContext {
    /// Wires the default collaborators for `config`.
    pub fn new(config: Config, events: EventSinkHandle) -> DepotResult<Self> {
        Self::builder(config).events(events).build()
    }

    pub fn builder(config: Config) -> DepotContextBuilder {
        DepotContextBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn events(&self) -> &EventSinkHandle {
        &self.inner.events
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.inner.device
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.inner.state
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.inner.catalog
    }

    pub fn fetcher(&self) -> &IndexFetcher {
        &self.inner.fetcher
    }

    pub fn pipeline(&self) -> &Arc<InstallPipeline> {
        &self.inner.pipeline
    }

    pub fn results(&self) -> &InstallResultBus {
        &self.inner.results
    }

    /// Serializes sync passes over the shared validator map and catalog.
    pub(crate) async fn lock_sync(&self) -> MutexGuard<'_, ()> {
        self.inner.sync_lock.lock().await
    }
}

/// Builds a [`DepotContext`], substituting any collaborator that was provided explicitly.
pub struct DepotContextBuilder {
    config: Config,
    events: Option<EventSinkHandle>,
    state: Option<Arc<StateStore>>,
    catalog: Option<Arc<dyn CatalogStore>>,
    transport: Option<Arc<dyn IndexTransport>>,
    transfers: Option<Arc<dyn TransferService>>,
    installer: Option<Arc<dyn PackageInstaller>>,
    results: Option<InstallResultBus>,
    retry_policy: Option<RetryPolicy>,
    pipeline_options: Option<PipelineOptions>,
}

impl DepotContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            events: None,
            state: None,
            catalog: None,
            transport: None,
            transfers: None,
            installer: None,
            results: None,
            retry_policy: None,
            pipeline_options: None,
        }
    }

    pub fn events(mut self, events: EventSinkHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(mut self, state: Arc<StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn IndexTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transfers(mut self, transfers: Arc<dyn TransferService>) -> Self {
        self.transfers = Some(transfers);
        self
    }

    pub fn installer(mut self, installer: Arc<dyn PackageInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// The bus the installer publishes to. Must be the same one a custom installer uses.
    pub fn results(mut self, results: InstallResultBus) -> Self {
        self.results = Some(results);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn pipeline_options(mut self, options: PipelineOptions) -> Self {
        self.pipeline_options = Some(options);
        self
    }

    pub fn build(self) -> DepotResult<DepotContext> {
        let config = self.config;
        let events = self.events.unwrap_or_else(|| Arc::new(NullSink));
        let results = self.results.unwrap_or_default();

        let agent = || ClientConfig::new(config.user_agent(), config.http_timeout()).build();

        let state = match self.state {
            Some(state) => state,
            None => Arc::new(StateStore::open(config.get_state_path()?)?),
        };
        let catalog: Arc<dyn CatalogStore> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(CatalogDatabase::open(config.get_db_path()?.join(CATALOG_FILE))?),
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new(agent())));
        let transfers = self
            .transfers
            .unwrap_or_else(|| Arc::new(DownloadManager::new(agent())));
        let installer = self.installer.unwrap_or_else(|| {
            Arc::new(CommandInstaller::from_config(&config, results.clone()))
        });

        let fetcher = IndexFetcher::new(transport, config.user_agent())
            .with_retry_policy(self.retry_policy.unwrap_or_default());

        let options = self
            .pipeline_options
            .unwrap_or_else(|| PipelineOptions::from_config(&config));
        let pipeline = InstallPipeline::new(
            config.get_cache_path()?,
            config.repositories.clone(),
            transfers,
            installer,
            results.clone(),
            events.clone(),
            options,
        )?;

        let device = DeviceProfile::from_config(&config);
        debug!(
            api_level = device.api_level(),
            abis = ?device.abis(),
            repositories = config.repositories.len(),
            "depot context ready"
        );

        Ok(DepotContext {
            inner: Arc::new(ContextInner {
                config,
                events,
                device,
                state,
                catalog,
                fetcher,
                pipeline: Arc::new(pipeline),
                results,
                sync_lock: Mutex::new(()),
            }),
        })
    }
}
