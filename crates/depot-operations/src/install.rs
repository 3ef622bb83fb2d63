//! Download, verify and install pipeline.
//!
//! Each install runs as its own task and reports through a [`watch`] channel. At most one
//! pipeline runs per package id; a second request attaches to the running one.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use depot_config::{config::Config, repository::Repository};
use depot_dl::manager::{TransferId, TransferRequest, TransferService, TransferState};
use depot_events::{
    DepotEvent, EventSinkHandle, InstallResultBus, InstallStage, InstallStatus, OperationId,
    VerifyStage, WaitError,
};
use depot_registry::{
    record::{is_absolute_url, join_url},
    PackageRecord,
};
use depot_utils::{
    fs::{ensure_dir_exists, remove_stale_files, safe_remove, sanitize_file_name},
    hash::verify_checksum,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::{DepotError, DepotResult, ErrorContext},
    installer::{InstallFlow, PackageInstaller},
    progress::{next_op_id, DownloadTracker},
    types::{InstallProgress, InstallReport},
};

const ARTIFACT_EXTENSION: &str = "apk";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Interval between transfer status polls.
    pub poll_interval: Duration,
    /// How long a session install may stay silent before it counts as failed.
    pub install_timeout: Duration,
    /// Delay before a handed-off artifact is deleted from the cache.
    pub cleanup_delay: Duration,
    /// Cached artifacts older than this are evicted when the pipeline starts.
    pub cache_expiry: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            install_timeout: config.install_timeout(),
            cleanup_delay: config.cleanup_delay(),
            cache_expiry: config.cache_expiry(),
        }
    }
}

/// Shared state of one running install.
struct InFlight {
    transfer: Mutex<Option<TransferId>>,
    cancelled: AtomicBool,
    progress: watch::Sender<InstallProgress>,
}

impl InFlight {
    fn new() -> Self {
        let (progress, _) = watch::channel(InstallProgress::Queued);
        Self {
            transfer: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            progress,
        }
    }

    fn transfer(&self) -> MutexGuard<'_, Option<TransferId>> {
        self.transfer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn report(&self, progress: InstallProgress) {
        self.progress.send_replace(progress);
    }
}

/// Caller side of an install: a stream of [`InstallProgress`] ending in
/// [`InstallProgress::Finished`].
pub struct InstallHandle {
    pkg_id: String,
    receiver: watch::Receiver<InstallProgress>,
}

impl InstallHandle {
    fn new(pkg_id: &str, mut receiver: watch::Receiver<InstallProgress>) -> Self {
        receiver.mark_changed();
        Self {
            pkg_id: pkg_id.to_string(),
            receiver,
        }
    }

    pub fn pkg_id(&self) -> &str {
        &self.pkg_id
    }

    /// The latest progress without waiting.
    pub fn progress(&self) -> InstallProgress {
        self.receiver.borrow().clone()
    }

    /// Waits for the next progress update. Intermediate updates may be coalesced; `None` once
    /// the final update has been observed.
    pub async fn next(&mut self) -> Option<InstallProgress> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the install finishes.
    pub async fn wait(mut self) -> InstallReport {
        loop {
            if let InstallProgress::Finished(report) = &*self.receiver.borrow_and_update() {
                return report.clone();
            }
            if self.receiver.changed().await.is_err() {
                if let InstallProgress::Finished(report) = &*self.receiver.borrow() {
                    return report.clone();
                }
                return InstallReport::from_result(
                    &self.pkg_id,
                    Err(DepotError::Custom("install pipeline stopped unexpectedly".into())),
                );
            }
        }
    }
}

pub struct InstallPipeline {
    cache_dir: PathBuf,
    repositories: Vec<Repository>,
    transfers: Arc<dyn TransferService>,
    installer: Arc<dyn PackageInstaller>,
    results: InstallResultBus,
    events: EventSinkHandle,
    options: PipelineOptions,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl InstallPipeline {
    /// Creates the pipeline over `cache_dir`, evicting artifacts older than
    /// [`PipelineOptions::cache_expiry`] first.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        repositories: Vec<Repository>,
        transfers: Arc<dyn TransferService>,
        installer: Arc<dyn PackageInstaller>,
        results: InstallResultBus,
        events: EventSinkHandle,
        options: PipelineOptions,
    ) -> DepotResult<Self> {
        let cache_dir = cache_dir.into();
        ensure_dir_exists(&cache_dir)?;

        let evicted = remove_stale_files(&cache_dir, options.cache_expiry)?;
        if evicted > 0 {
            info!(evicted, dir = %cache_dir.display(), "evicted expired cached artifacts");
        }

        Ok(Self {
            cache_dir,
            repositories,
            transfers,
            installer,
            results,
            events,
            options,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The cache slot for a package id. The same id always maps to the same file.
    pub fn cache_path(&self, pkg_id: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ARTIFACT_EXTENSION}", sanitize_file_name(pkg_id)))
    }

    pub fn is_cached(&self, pkg_id: &str) -> bool {
        self.cache_path(pkg_id).is_file()
    }

    pub fn is_installing(&self, pkg_id: &str) -> bool {
        self.in_flight().contains_key(pkg_id)
    }

    /// Absolute artifact URL for `record`, resolving relative paths against its repository.
    pub fn resolve_url(&self, record: &PackageRecord) -> DepotResult<String> {
        if is_absolute_url(&record.download_url) {
            return Ok(record.download_url.clone());
        }
        self.repositories
            .iter()
            .find(|repo| repo.name == record.repo_name)
            .map(|repo| join_url(repo.base_url(), &record.download_url))
            .ok_or_else(|| DepotError::RepositoryNotFound(record.repo_name.clone()))
    }

    /// Starts installing `record`, or attaches to the install already running for its id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install(self: &Arc<Self>, record: PackageRecord) -> InstallHandle {
        let pkg_id = record.package_id.clone();
        let mut in_flight = self.in_flight();

        if let Some(running) = in_flight.get(&pkg_id) {
            debug!(pkg_id = %pkg_id, "attaching to running install");
            return InstallHandle::new(&pkg_id, running.progress.subscribe());
        }

        let task = Arc::new(InFlight::new());
        let receiver = task.progress.subscribe();
        in_flight.insert(pkg_id.clone(), Arc::clone(&task));
        drop(in_flight);

        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(record, task).await });

        InstallHandle::new(&pkg_id, receiver)
    }

    /// Cancels the download of `pkg_id` and removes its partial artifact.
    ///
    /// Returns whether an install was running. A cancelled install finishes with
    /// [`DepotError::Cancelled`]. It is detached at once, so installing again starts from
    /// scratch even before the old task has noticed.
    pub fn cancel_download(&self, pkg_id: &str) -> bool {
        let Some(task) = self.in_flight().remove(pkg_id) else {
            return false;
        };

        task.cancelled.store(true, Ordering::SeqCst);
        let transfer = task.transfer().take();
        if let Some(id) = transfer {
            self.transfers.cancel(id);
            if let Err(err) = safe_remove(self.cache_path(pkg_id)) {
                warn!(pkg_id, "failed to remove partial artifact: {err}");
            }
            info!(pkg_id, transfer = %id, "download cancelled");
        }
        true
    }

    /// Removes every cached artifact. Refused while any install is running.
    pub fn clean_cache(&self) -> DepotResult<usize> {
        if let Some(pkg_id) = self.in_flight().keys().next() {
            return Err(DepotError::InstallInProgress(pkg_id.clone()));
        }

        let entries = fs::read_dir(&self.cache_dir)
            .with_context(|| format!("reading cache directory {}", self.cache_dir.display()))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                safe_remove(&path)?;
                removed += 1;
            }
        }
        debug!(removed, "cache cleaned");
        Ok(removed)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, Arc<InFlight>>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(self: Arc<Self>, record: PackageRecord, task: Arc<InFlight>) {
        let op_id = next_op_id();
        let pkg_id = record.package_id.clone();

        let result = self.execute(&record, &task, op_id).await;
        match &result {
            Ok(()) => {
                info!(pkg_id = %pkg_id, "install finished");
                self.events.emit(DepotEvent::OperationComplete {
                    op_id,
                    pkg_name: record.name.clone(),
                    pkg_id: pkg_id.clone(),
                });
            }
            Err(err) => {
                warn!(pkg_id = %pkg_id, "install failed: {err}");
                self.events.emit(DepotEvent::OperationFailed {
                    op_id,
                    pkg_name: record.name.clone(),
                    pkg_id: pkg_id.clone(),
                    error: err.to_string(),
                });
            }
        }

        {
            let mut in_flight = self.in_flight();
            if in_flight
                .get(&pkg_id)
                .is_some_and(|current| Arc::ptr_eq(current, &task))
            {
                in_flight.remove(&pkg_id);
            }
        }
        task.report(InstallProgress::Finished(InstallReport::from_result(
            &pkg_id, result,
        )));

        if self.is_cached(&pkg_id) {
            self.schedule_cleanup(pkg_id);
        }
    }

    /// A verified cached artifact skips the download but still needs installer consent.
    async fn execute(
        &self,
        record: &PackageRecord,
        task: &InFlight,
        op_id: OperationId,
    ) -> DepotResult<()> {
        let pkg_id = record.package_id.as_str();
        let path = self.cache_path(pkg_id);

        let cache_hit = path.is_file() && self.verify(record, &path, task, op_id).await?;
        if cache_hit {
            debug!(pkg_id, path = %path.display(), "reusing cached artifact");
            self.emit_install_stage(record, op_id, InstallStage::CacheHit);
        }

        if self.installer.requires_consent() && !self.installer.has_consent() {
            self.events.emit(DepotEvent::PermissionRequired {
                op_id,
                pkg_name: record.name.clone(),
                pkg_id: pkg_id.to_string(),
            });
            return Err(DepotError::PermissionRequired(pkg_id.to_string()));
        }

        if !cache_hit {
            self.download(record, &path, task, op_id).await?;
            if task.is_cancelled() {
                return Err(DepotError::Cancelled(pkg_id.to_string()));
            }
            if !self.verify(record, &path, task, op_id).await? {
                return Err(DepotError::VerificationFailed(pkg_id.to_string()));
            }
            task.report(InstallProgress::Downloading(1.0));
        }

        if task.is_cancelled() {
            return Err(DepotError::Cancelled(pkg_id.to_string()));
        }
        task.report(InstallProgress::Installing);
        self.hand_off(record, &path, op_id).await?;
        self.emit_install_stage(record, op_id, InstallStage::Complete);
        Ok(())
    }

    async fn download(
        &self,
        record: &PackageRecord,
        path: &Path,
        task: &InFlight,
        op_id: OperationId,
    ) -> DepotResult<()> {
        let pkg_id = record.package_id.as_str();
        let url = self.resolve_url(record)?;
        task.report(InstallProgress::Downloading(0.0));

        let id = {
            let mut transfer = task.transfer();
            if task.is_cancelled() {
                return Err(DepotError::Cancelled(pkg_id.to_string()));
            }
            let id = self.transfers.enqueue(TransferRequest {
                url: url.clone(),
                destination: path.to_path_buf(),
                allow_metered: true,
                allow_roaming: false,
            });
            *transfer = Some(id);
            id
        };
        debug!(pkg_id, transfer = %id, url = %url, "download enqueued");

        let mut tracker = DownloadTracker::new(self.events.clone(), op_id, &record.name, pkg_id);
        let mut ticker = tokio::time::interval(self.options.poll_interval);

        loop {
            ticker.tick().await;

            if task.is_cancelled() {
                tracker.cancelled();
                return Err(DepotError::Cancelled(pkg_id.to_string()));
            }

            let Some(status) = self.transfers.poll(id) else {
                if task.is_cancelled() {
                    tracker.cancelled();
                    return Err(DepotError::Cancelled(pkg_id.to_string()));
                }
                task.transfer().take();
                safe_remove(path)?;
                return Err(DepotError::DownloadFailed {
                    pkg_id: pkg_id.to_string(),
                    reason: format!("transfer {id} disappeared"),
                });
            };

            if let Some(fraction) = tracker.observe(&status) {
                task.report(InstallProgress::Downloading(fraction));
            }

            match status.state {
                TransferState::Successful => {
                    task.transfer().take();
                    tracker.complete(&status);
                    return Ok(());
                }
                TransferState::Failed(reason) => {
                    task.transfer().take();
                    safe_remove(path)?;
                    return Err(DepotError::DownloadFailed {
                        pkg_id: pkg_id.to_string(),
                        reason,
                    });
                }
                TransferState::Pending | TransferState::Running => {}
            }
        }
    }

    /// Checks the artifact at `path` against the record's digest. A mismatching file is
    /// deleted. Records without a digest pass unchecked.
    async fn verify(
        &self,
        record: &PackageRecord,
        path: &Path,
        task: &InFlight,
        op_id: OperationId,
    ) -> DepotResult<bool> {
        if !record.has_checksum() {
            self.emit_verify_stage(record, op_id, VerifyStage::Skipped);
            return Ok(true);
        }

        task.report(InstallProgress::Verifying);
        self.emit_verify_stage(record, op_id, VerifyStage::Checksum);

        let file = path.to_path_buf();
        let expected = record.sha256.trim().to_string();
        let valid = tokio::task::spawn_blocking(move || verify_checksum(&file, &expected))
            .await
            .map_err(|err| DepotError::Custom(format!("checksum task failed: {err}")))??;

        if valid {
            self.emit_verify_stage(record, op_id, VerifyStage::Passed);
        } else {
            warn!(pkg_id = %record.package_id, path = %path.display(), "checksum mismatch");
            self.emit_verify_stage(
                record,
                op_id,
                VerifyStage::Failed("checksum mismatch".into()),
            );
            safe_remove(path)?;
        }
        Ok(valid)
    }

    async fn hand_off(
        &self,
        record: &PackageRecord,
        path: &Path,
        op_id: OperationId,
    ) -> DepotResult<()> {
        let pkg_id = record.package_id.as_str();
        self.emit_install_stage(record, op_id, InstallStage::Launching);

        let uri = self.installer.grant(path)?;
        match self.installer.flow() {
            InstallFlow::Direct => {
                self.installer.launch(&uri)?;
                debug!(pkg_id, %uri, "installer launched");
                Ok(())
            }
            InstallFlow::Session => {
                let session_id = self.installer.create_session(pkg_id)?;
                let pending = self.results.register(session_id);
                self.installer.commit_session(session_id, &uri)?;
                self.emit_install_stage(record, op_id, InstallStage::AwaitingResult {
                    session_id,
                });

                let failed = |reason: String| {
                    DepotError::InstallFailed {
                        pkg_id: pkg_id.to_string(),
                        reason,
                    }
                };
                match pending.wait(self.options.install_timeout).await {
                    Ok(InstallStatus::Success) => Ok(()),
                    Ok(InstallStatus::Failure {
                        code,
                        message,
                    }) => {
                        Err(failed(message.unwrap_or_else(|| {
                            format!("installer exited with code {code}")
                        })))
                    }
                    Ok(InstallStatus::Aborted) => Err(failed("installation was aborted".into())),
                    Err(WaitError::TimedOut {
                        session_id,
                        timeout,
                    }) => {
                        Err(DepotError::InstallTimeout {
                            pkg_id: pkg_id.to_string(),
                            session_id,
                            timeout,
                        })
                    }
                    Err(err @ WaitError::Closed(_)) => Err(failed(err.to_string())),
                }
            }
        }
    }

    fn schedule_cleanup(self: Arc<Self>, pkg_id: String) {
        let delay = self.options.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if self.is_installing(&pkg_id) {
                debug!(pkg_id = %pkg_id, "skipping cleanup of artifact in use");
                return;
            }
            match safe_remove(self.cache_path(&pkg_id)) {
                Ok(()) => debug!(pkg_id = %pkg_id, "cached artifact removed"),
                Err(err) => warn!(pkg_id = %pkg_id, "failed to remove cached artifact: {err}"),
            }
        });
    }

    fn emit_verify_stage(&self, record: &PackageRecord, op_id: OperationId, stage: VerifyStage) {
        self.events.emit(DepotEvent::Verifying {
            op_id,
            pkg_name: record.name.clone(),
            pkg_id: record.package_id.clone(),
            stage,
        });
    }

    fn emit_install_stage(&self, record: &PackageRecord, op_id: OperationId, stage: InstallStage) {
        self.events.emit(DepotEvent::Installing {
            op_id,
            pkg_name: record.name.clone(),
            pkg_id: record.package_id.clone(),
            stage,
        });
    }
}

#[cfg(test)]
mod tests {
    use depot_dl::manager::TransferStatus;
    use depot_events::{InstallResultBus, NullSink};
    use tempfile::tempdir;

    use super::*;
    use crate::installer::ContentUri;

    struct NoTransfers;

    impl TransferService for NoTransfers {
        fn enqueue(&self, _request: TransferRequest) -> TransferId {
            TransferId(0)
        }

        fn poll(&self, _id: TransferId) -> Option<TransferStatus> {
            None
        }

        fn cancel(&self, _id: TransferId) -> bool {
            false
        }
    }

    struct NoInstaller;

    impl PackageInstaller for NoInstaller {
        fn requires_consent(&self) -> bool {
            false
        }

        fn has_consent(&self) -> bool {
            true
        }

        fn grant(&self, _path: &Path) -> DepotResult<ContentUri> {
            Err(DepotError::Custom("unused".into()))
        }

        fn flow(&self) -> InstallFlow {
            InstallFlow::Direct
        }

        fn launch(&self, _uri: &ContentUri) -> DepotResult<()> {
            Ok(())
        }

        fn create_session(&self, _pkg_id: &str) -> DepotResult<u64> {
            Ok(0)
        }

        fn commit_session(&self, _session_id: u64, _uri: &ContentUri) -> DepotResult<()> {
            Ok(())
        }
    }

    fn pipeline(dir: &Path) -> InstallPipeline {
        InstallPipeline::new(
            dir,
            vec![Repository::new("fdroid", "https://f-droid.org/repo/")],
            Arc::new(NoTransfers),
            Arc::new(NoInstaller),
            InstallResultBus::new(),
            Arc::new(NullSink),
            PipelineOptions::default(),
        )
        .unwrap()
    }

    fn record(download_url: &str, repo_name: &str) -> PackageRecord {
        PackageRecord {
            package_id: "org.app".into(),
            download_url: download_url.into(),
            repo_name: repo_name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_path_is_deterministic() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        assert_eq!(
            pipeline.cache_path("org.fdroid.fdroid"),
            dir.path().join("org.fdroid.fdroid.apk")
        );
        assert_eq!(pipeline.cache_path("../evil"), pipeline.cache_path("../evil"));
        assert_eq!(pipeline.cache_path("../evil").parent(), Some(dir.path()));
    }

    #[test]
    fn test_resolve_url() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        assert_eq!(
            pipeline
                .resolve_url(&record("https://cdn.example/a.apk", "unknown"))
                .unwrap(),
            "https://cdn.example/a.apk"
        );
        assert_eq!(
            pipeline.resolve_url(&record("/a.apk", "fdroid")).unwrap(),
            "https://f-droid.org/repo/a.apk"
        );
        assert!(matches!(
            pipeline.resolve_url(&record("a.apk", "missing")),
            Err(DepotError::RepositoryNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_clean_cache_removes_files() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        fs::write(pipeline.cache_path("a"), b"a").unwrap();
        fs::write(pipeline.cache_path("b"), b"b").unwrap();

        assert!(pipeline.is_cached("a"));
        assert_eq!(pipeline.clean_cache().unwrap(), 2);
        assert!(!pipeline.is_cached("a"));
    }

    #[test]
    fn test_cancel_unknown_package() {
        let dir = tempdir().unwrap();
        assert!(!pipeline(dir.path()).cancel_download("org.app"));
    }
}
