//! Process-wide publish/subscribe channel for installer completion reports.
//!
//! A waiter calls [`InstallResultBus::register`] *before* the install session is committed
//! and then awaits the returned [`PendingResult`]. Results published before registration are
//! not replayed.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Correlation key between a committed install session and its completion report.
pub type SessionId = u64;

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Success,
    /// The installer rejected the package.
    Failure { code: i32, message: Option<String> },
    /// The user dismissed the install prompt.
    Aborted,
}

impl InstallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallStatus::Success)
    }

    /// Maps a process exit status the way installer commands report it.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => InstallStatus::Success,
            Some(code) => {
                InstallStatus::Failure {
                    code,
                    message: None,
                }
            }
            None => InstallStatus::Aborted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    pub session_id: SessionId,
    pub status: InstallStatus,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("no result for install session {session_id} within {timeout:?}")]
    TimedOut {
        session_id: SessionId,
        timeout: Duration,
    },

    #[error("install result bus closed before session {0} reported")]
    Closed(SessionId),
}

#[derive(Clone)]
pub struct InstallResultBus {
    sender: broadcast::Sender<InstallResult>,
}

impl Default for InstallResultBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallResultBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes a completion report. Returns how many waiters were listening.
    pub fn publish(&self, result: InstallResult) -> usize {
        debug!(session_id = result.session_id, status = ?result.status, "install result published");
        self.sender.send(result).unwrap_or(0)
    }

    /// Registers interest in `session_id`.
    pub fn register(&self, session_id: SessionId) -> PendingResult {
        PendingResult {
            session_id,
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct PendingResult {
    session_id: SessionId,
    receiver: broadcast::Receiver<InstallResult>,
}

impl PendingResult {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Waits for the first result carrying this session id.
    pub async fn wait(mut self, timeout: Duration) -> Result<InstallStatus, WaitError> {
        let session_id = self.session_id;
        let receive = async {
            loop {
                match self.receiver.recv().await {
                    Ok(result) if result.session_id == session_id => return Ok(result.status),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id, skipped, "install result bus lagged");
                    }
                    Err(RecvError::Closed) => return Err(WaitError::Closed(session_id)),
                }
            }
        };

        tokio::time::timeout(timeout, receive)
            .await
            .unwrap_or(Err(WaitError::TimedOut {
                session_id,
                timeout,
            }))
    }
}
