use std::{
    fs::File,
    io::{Read as _, Write as _},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use depot_utils::fs::{ensure_dir_exists, safe_remove};
use tracing::{debug, warn};
use ureq::{
    http::{header::CONTENT_LENGTH, Response},
    Agent, Body,
};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    types::Progress,
};

const BUFFER_SIZE: usize = 8192;

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cancellation shared between a download and whoever may stop it.
///
/// The partial file is created and renamed into place under the same lock [`cancel`] takes,
/// so once `cancel` returns the download has neither a partial file nor a finished output.
///
/// [`cancel`]: CancelToken::cancel
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    partial: Mutex<Option<PathBuf>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stops the download and removes its partial file, even while the download is blocked
    /// reading from the network.
    pub fn cancel(&self) {
        let mut partial = self.partial();
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(path) = partial.take() {
            if let Err(err) = safe_remove(&path) {
                warn!(path = %path.display(), "failed to remove partial download: {err}");
            }
        }
    }

    fn partial(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.partial
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single streaming download into a file.
pub struct Download {
    pub url: String,
    pub output: PathBuf,
    pub cancel: Option<Arc<CancelToken>>,
    pub on_progress: Option<Box<dyn Fn(Progress) + Send + Sync>>,
}

impl Download {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            cancel: None,
            on_progress: None,
        }
    }

    /// Checked between chunks and before the final rename.
    pub fn cancel_token(mut self, cancel: Arc<CancelToken>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Downloads the URL to the output path, replacing any existing file.
    ///
    /// Bytes are written to a sibling partial file that is renamed into place on success.
    /// Any failure, including cancellation, removes the partial file and leaves the output
    /// path untouched.
    pub fn execute(&self, agent: &Agent) -> Result<PathBuf> {
        Url::parse(&self.url).map_err(|source| {
            DownloadError::InvalidUrl {
                url: self.url.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.output.parent() {
            ensure_dir_exists(parent)?;
        }

        let partial = self.partial_path();
        let result = self
            .download_to_file(agent, &partial)
            .and_then(|()| self.commit(&partial));

        match result {
            Ok(()) => Ok(self.output.clone()),
            Err(err) => {
                if let Err(remove_err) = safe_remove(&partial) {
                    warn!(path = %partial.display(), "failed to remove partial download: {remove_err}");
                }
                Err(err)
            }
        }
    }

    /// Unique per download so a cancelled transfer never touches a newer one's bytes.
    fn partial_path(&self) -> PathBuf {
        let n = PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .output
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}-{n}.part", std::process::id()));
        self.output.with_file_name(name)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }

    fn create_partial(&self, path: &Path) -> Result<File> {
        let Some(token) = &self.cancel else {
            return Ok(File::create(path)?);
        };
        let mut partial = token.partial();
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let file = File::create(path)?;
        *partial = Some(path.to_path_buf());
        Ok(file)
    }

    fn commit(&self, partial: &Path) -> Result<()> {
        let Some(token) = &self.cancel else {
            return Ok(std::fs::rename(partial, &self.output)?);
        };
        let mut tracked = token.partial();
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        std::fs::rename(partial, &self.output)?;
        *tracked = None;
        Ok(())
    }

    fn emit(&self, progress: Progress) {
        if let Some(ref cb) = self.on_progress {
            cb(progress);
        }
    }

    fn download_to_file(&self, agent: &Agent, path: &Path) -> Result<()> {
        if self.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        debug!(url = %self.url, path = %path.display(), "starting download");
        let resp = agent.get(&self.url).call()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::HttpError {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let total = Self::parse_content_length(&resp);
        self.emit(Progress::Starting {
            total,
        });

        let mut file = self.create_partial(path)?;
        let mut reader = resp.into_body().into_reader();
        let mut buffer = [0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            if self.is_cancelled() {
                debug!(url = %self.url, downloaded, "download cancelled");
                return Err(DownloadError::Cancelled);
            }

            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])?;
            downloaded += n as u64;

            self.emit(Progress::Chunk {
                current: downloaded,
                total,
            });
        }

        file.flush()?;
        self.emit(Progress::Complete {
            total: downloaded,
        });

        Ok(())
    }

    /// Total size from `Content-Length`, or 0 when unknown.
    fn parse_content_length(resp: &Response<Body>) -> u64 {
        resp.headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|len| len.parse::<u64>().ok())
            .unwrap_or(0)
    }
}
