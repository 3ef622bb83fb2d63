use crate::{OperationId, SessionId};

/// All event types emitted by depot operations.
#[derive(Debug, Clone)]
pub enum DepotEvent {
    /// Per-repository sync progress; `index` is zero-based within `total` enabled repositories.
    SyncProgress {
        repo_name: String,
        index: usize,
        total: usize,
        stage: SyncStage,
    },
    /// A repository contributed nothing this cycle because of an error.
    SyncFailed { repo_name: String, error: String },
    /// The catalog was atomically replaced.
    CatalogReplaced { package_count: usize },
    DownloadStarting {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        total: u64,
    },
    DownloadProgress {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        current: u64,
        total: u64,
    },
    DownloadComplete {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        total: u64,
    },
    DownloadCancelled {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
    },
    Verifying {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        stage: VerifyStage,
    },
    Installing {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        stage: InstallStage,
    },
    /// Installing requires a consent the user has not granted yet.
    PermissionRequired {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
    },
    OperationComplete {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
    },
    OperationFailed {
        op_id: OperationId,
        pkg_name: String,
        pkg_id: String,
        error: String,
    },
    Log { level: LogLevel, message: String },
}

/// Repository sync stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStage {
    /// Requesting the index.
    Fetching,
    /// Index unchanged since the last sync (304 Not Modified).
    UpToDate,
    /// Streaming and parsing the index.
    Parsing,
    Complete { package_count: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStage {
    Checksum,
    /// No digest published for this artifact.
    Skipped,
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStage {
    /// A previously downloaded artifact is being reused.
    CacheHit,
    /// Handing the artifact to the installer.
    Launching,
    /// Waiting for the installer to report on a session.
    AwaitingResult { session_id: SessionId },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
