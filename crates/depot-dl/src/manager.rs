//! Background transfers addressed by id.
//!
//! The install pipeline enqueues a transfer and polls it; it never owns the download thread.

use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
};

use tracing::{debug, error};
use ureq::Agent;

use crate::{
    download::{CancelToken, Download},
    error::DownloadError,
    types::Progress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    pub allow_metered: bool,
    pub allow_roaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Running,
    Successful,
    Failed(String),
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Successful | TransferState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub state: TransferState,
    pub bytes_so_far: u64,
    /// 0 while unknown.
    pub total_bytes: u64,
}

impl TransferStatus {
    fn pending() -> Self {
        Self {
            state: TransferState::Pending,
            bytes_so_far: 0,
            total_bytes: 0,
        }
    }

    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        (self.total_bytes > 0)
            .then(|| (self.bytes_so_far as f64 / self.total_bytes as f64).clamp(0.0, 1.0))
    }
}

/// An OS-style download service: transfers run on their own and are observed by polling.
pub trait TransferService: Send + Sync {
    fn enqueue(&self, request: TransferRequest) -> TransferId;

    /// Current status, or `None` for unknown or cancelled transfers.
    fn poll(&self, id: TransferId) -> Option<TransferStatus>;

    /// Stops the transfer and forgets it. Returns whether it was known.
    ///
    /// Once this returns the transfer writes nothing more to its destination.
    fn cancel(&self, id: TransferId) -> bool;
}

struct TransferEntry {
    status: TransferStatus,
    cancel: Arc<CancelToken>,
}

type TransferTable = Arc<Mutex<HashMap<TransferId, TransferEntry>>>;

/// [`TransferService`] running one thread per transfer over a shared ureq agent.
pub struct DownloadManager {
    agent: Agent,
    next_id: AtomicU64,
    transfers: TransferTable,
}

impl DownloadManager {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            next_id: AtomicU64::new(1),
            transfers: Arc::default(),
        }
    }

    fn table(transfers: &TransferTable) -> MutexGuard<'_, HashMap<TransferId, TransferEntry>> {
        transfers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(transfers: &TransferTable, id: TransferId, f: F)
    where
        F: FnOnce(&mut TransferStatus),
    {
        if let Some(entry) = Self::table(transfers).get_mut(&id) {
            f(&mut entry.status);
        }
    }
}

impl TransferService for DownloadManager {
    fn enqueue(&self, request: TransferRequest) -> TransferId {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = Arc::new(CancelToken::new());

        Self::table(&self.transfers).insert(
            id,
            TransferEntry {
                status: TransferStatus::pending(),
                cancel: cancel.clone(),
            },
        );

        debug!(
            %id,
            url = %request.url,
            allow_metered = request.allow_metered,
            allow_roaming = request.allow_roaming,
            "transfer enqueued"
        );

        let agent = self.agent.clone();
        let transfers = self.transfers.clone();
        let progress_table = self.transfers.clone();

        thread::spawn(move || {
            let download = Download::new(request.url, request.destination)
                .cancel_token(cancel)
                .progress(move |progress| {
                    Self::update(&progress_table, id, |status| {
                        match progress {
                            Progress::Starting {
                                total,
                            } => {
                                status.state = TransferState::Running;
                                status.total_bytes = total;
                            }
                            Progress::Chunk {
                                current,
                                ..
                            } => status.bytes_so_far = current,
                            Progress::Complete {
                                total,
                            } => {
                                status.bytes_so_far = total;
                                if status.total_bytes == 0 {
                                    status.total_bytes = total;
                                }
                            }
                        }
                    });
                });

            let result = download.execute(&agent);
            match result {
                Ok(_) => {
                    Self::update(&transfers, id, |status| {
                        status.state = TransferState::Successful;
                    });
                }
                Err(DownloadError::Cancelled) => {
                    debug!(%id, "transfer cancelled");
                }
                Err(err) => {
                    error!(%id, "transfer failed: {err}");
                    Self::update(&transfers, id, |status| {
                        status.state = TransferState::Failed(err.to_string());
                    });
                }
            }
        });

        id
    }

    fn poll(&self, id: TransferId) -> Option<TransferStatus> {
        Self::table(&self.transfers)
            .get(&id)
            .map(|entry| entry.status.clone())
    }

    fn cancel(&self, id: TransferId) -> bool {
        let entry = Self::table(&self.transfers).remove(&id);
        match entry {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
