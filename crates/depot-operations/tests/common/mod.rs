#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    io::{BufRead, BufReader, Cursor, Write},
    net::TcpListener,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use depot_config::{config::Config, repository::Repository, state::StateStore};
use depot_db::CatalogDatabase;
use depot_dl::manager::{
    TransferId, TransferRequest, TransferService, TransferState, TransferStatus,
};
use depot_events::{
    CollectorSink, DepotEvent, InstallResult, InstallResultBus, InstallStatus, SessionId,
};
use depot_operations::{
    ContentUri, DepotContext, DepotResult, InstallFlow, PackageInstaller, PipelineOptions,
};
use depot_registry::{
    IndexRequest, IndexResponse, IndexTransport, RegistryError, RetryPolicy,
};
use depot_utils::hash::calculate_checksum;
use serde_json::json;
use tempfile::TempDir;

pub const MAIN_URL: &str = "https://main.example/repo";
pub const EXTRA_URL: &str = "https://extra.example/repo";

pub fn index_url(base: &str) -> String {
    format!("{base}/index-v2.json")
}

/// One package of a generated index.
pub struct Pkg<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub version_code: i64,
    pub file: &'a str,
    pub sha256: &'a str,
}

impl<'a> Pkg<'a> {
    pub fn new(id: &'a str, version_code: i64) -> Self {
        Self {
            id,
            name: id,
            version_code,
            file: "app.apk",
            sha256: "",
        }
    }
}

pub fn index_json(packages: &[Pkg<'_>]) -> String {
    let packages: serde_json::Map<String, serde_json::Value> = packages
        .iter()
        .map(|pkg| {
            let value = json!({
                "metadata": {
                    "name": { "en-US": pkg.name },
                    "summary": { "en-US": format!("{} summary", pkg.name) },
                    "categories": ["Tools"],
                    "license": "GPL-3.0-only"
                },
                "versions": {
                    format!("h{}", pkg.version_code): {
                        "file": { "name": pkg.file, "size": 1024, "sha256": pkg.sha256 },
                        "manifest": {
                            "versionCode": pkg.version_code,
                            "versionName": format!("1.{}", pkg.version_code),
                            "usesSdk": { "minSdkVersion": 21, "targetSdkVersion": 34 }
                        }
                    }
                }
            });
            (pkg.id.to_string(), value)
        })
        .collect();

    json!({ "repo": { "name": "test" }, "packages": packages }).to_string()
}

struct Document {
    status: u16,
    body: String,
    etag: Option<String>,
}

/// In-process index server honouring `If-None-Match`.
#[derive(Default)]
pub struct FakeIndexServer {
    documents: Mutex<HashMap<String, Document>>,
    requests: Mutex<Vec<IndexRequest>>,
}

impl FakeIndexServer {
    pub fn serve(&self, base: &str, body: String, etag: &str) {
        self.documents.lock().unwrap().insert(
            index_url(base),
            Document {
                status: 200,
                body,
                etag: Some(etag.to_string()),
            },
        );
    }

    pub fn fail(&self, base: &str, status: u16) {
        self.documents.lock().unwrap().insert(
            index_url(base),
            Document {
                status,
                body: String::new(),
                etag: None,
            },
        );
    }

    pub fn requests_for(&self, base: &str) -> Vec<IndexRequest> {
        let url = index_url(base);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }
}

impl IndexTransport for FakeIndexServer {
    fn get(&self, request: &IndexRequest) -> Result<IndexResponse, RegistryError> {
        self.requests.lock().unwrap().push(request.clone());

        let documents = self.documents.lock().unwrap();
        let Some(doc) = documents.get(&request.url) else {
            return Ok(response(404, None, String::new()));
        };
        if doc.status != 200 {
            return Ok(response(doc.status, None, String::new()));
        }
        if doc.etag.is_some() && request.header("If-None-Match") == doc.etag.as_deref() {
            return Ok(response(304, doc.etag.clone(), String::new()));
        }
        Ok(response(200, doc.etag.clone(), doc.body.clone()))
    }
}

fn response(status: u16, etag: Option<String>, body: String) -> IndexResponse {
    IndexResponse {
        status,
        etag,
        last_modified: Some("Tue, 15 Oct 2024 07:28:00 GMT".into()),
        body: Box::new(Cursor::new(body.into_bytes())),
    }
}

struct Transfer {
    request: TransferRequest,
    polls: u32,
}

/// Transfer service that completes on the second poll unless held.
#[derive(Default)]
pub struct FakeTransfers {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    transfers: Mutex<HashMap<TransferId, Transfer>>,
    next_id: AtomicU64,
    enqueued: AtomicUsize,
    cancelled: AtomicUsize,
    held: AtomicBool,
}

impl FakeTransfers {
    pub fn publish(&self, url: &str, content: &[u8]) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(url.to_string(), content.to_vec());
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.transfers
            .lock()
            .unwrap()
            .values()
            .map(|transfer| transfer.request.clone())
            .collect()
    }
}

impl TransferService for FakeTransfers {
    fn enqueue(&self, request: TransferRequest) -> TransferId {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.transfers.lock().unwrap().insert(
            id,
            Transfer {
                request,
                polls: 0,
            },
        );
        id
    }

    fn poll(&self, id: TransferId) -> Option<TransferStatus> {
        let mut transfers = self.transfers.lock().unwrap();
        let transfer = transfers.get_mut(&id)?;

        let Some(content) = self
            .artifacts
            .lock()
            .unwrap()
            .get(&transfer.request.url)
            .cloned()
        else {
            return Some(TransferStatus {
                state: TransferState::Failed("HTTP 404".into()),
                bytes_so_far: 0,
                total_bytes: 0,
            });
        };
        let total = content.len() as u64;

        if self.held.load(Ordering::SeqCst) {
            fs::write(&transfer.request.destination, &content[..content.len() / 2]).unwrap();
            return Some(TransferStatus {
                state: TransferState::Running,
                bytes_so_far: total / 2,
                total_bytes: total,
            });
        }

        transfer.polls += 1;
        if transfer.polls < 2 {
            return Some(TransferStatus {
                state: TransferState::Running,
                bytes_so_far: total / 2,
                total_bytes: total,
            });
        }

        fs::write(&transfer.request.destination, &content).unwrap();
        Some(TransferStatus {
            state: TransferState::Successful,
            bytes_so_far: total,
            total_bytes: total,
        })
    }

    fn cancel(&self, id: TransferId) -> bool {
        let known = self.transfers.lock().unwrap().remove(&id).is_some();
        if known {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        known
    }
}

/// Installer that reports a scripted status for every committed session.
pub struct FakeInstaller {
    flow: InstallFlow,
    consent: AtomicBool,
    reply: Mutex<Option<InstallStatus>>,
    results: InstallResultBus,
    next_session: AtomicU64,
    installed: Mutex<Vec<PathBuf>>,
}

impl FakeInstaller {
    pub fn new(flow: InstallFlow, results: InstallResultBus) -> Self {
        Self {
            flow,
            consent: AtomicBool::new(true),
            reply: Mutex::new(Some(InstallStatus::Success)),
            results,
            next_session: AtomicU64::new(100),
            installed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_consent(&self, consent: bool) {
        self.consent.store(consent, Ordering::SeqCst);
    }

    /// `None` never reports.
    pub fn reply_with(&self, status: Option<InstallStatus>) {
        *self.reply.lock().unwrap() = status;
    }

    pub fn installed(&self) -> Vec<PathBuf> {
        self.installed.lock().unwrap().clone()
    }
}

impl PackageInstaller for FakeInstaller {
    fn requires_consent(&self) -> bool {
        true
    }

    fn has_consent(&self) -> bool {
        self.consent.load(Ordering::SeqCst)
    }

    fn grant(&self, path: &Path) -> DepotResult<ContentUri> {
        ContentUri::from_file(path)
    }

    fn flow(&self) -> InstallFlow {
        self.flow
    }

    fn launch(&self, uri: &ContentUri) -> DepotResult<()> {
        self.installed
            .lock()
            .unwrap()
            .push(uri.to_file_path().unwrap());
        Ok(())
    }

    fn create_session(&self, _pkg_id: &str) -> DepotResult<SessionId> {
        Ok(self.next_session.fetch_add(1, Ordering::SeqCst))
    }

    fn commit_session(&self, session_id: SessionId, uri: &ContentUri) -> DepotResult<()> {
        self.installed
            .lock()
            .unwrap()
            .push(uri.to_file_path().unwrap());
        if let Some(status) = self.reply.lock().unwrap().clone() {
            self.results.publish(InstallResult {
                session_id,
                status,
            });
        }
        Ok(())
    }
}

pub struct Harness {
    pub ctx: DepotContext,
    pub server: Arc<FakeIndexServer>,
    pub transfers: Arc<FakeTransfers>,
    pub installer: Arc<FakeInstaller>,
    pub events: Arc<CollectorSink>,
    pub catalog: Arc<CatalogDatabase>,
    pub state: Arc<StateStore>,
    pub dir: TempDir,
}

pub fn repositories() -> Vec<Repository> {
    vec![
        Repository::new("main", MAIN_URL),
        Repository::new("extra", EXTRA_URL),
    ]
}

impl Harness {
    pub fn new(repositories: Vec<Repository>) -> Self {
        Self::in_dir(TempDir::new().unwrap(), repositories, InstallFlow::Session)
    }

    pub fn with_flow(flow: InstallFlow) -> Self {
        Self::in_dir(TempDir::new().unwrap(), repositories(), flow)
    }

    pub fn cache_dir(dir: &TempDir) -> PathBuf {
        dir.path().join("cache")
    }

    /// Builds the context over `dir`, which may already hold cached artifacts.
    pub fn in_dir(dir: TempDir, repositories: Vec<Repository>, flow: InstallFlow) -> Self {
        let mut config = Config::default_config();
        config.repositories = repositories;
        config.cache_path = Some(Self::cache_dir(&dir).display().to_string());

        let server = Arc::new(FakeIndexServer::default());
        let transfers = Arc::new(FakeTransfers::default());
        let results = InstallResultBus::new();
        let installer = Arc::new(FakeInstaller::new(flow, results.clone()));
        let events = Arc::new(CollectorSink::default());
        let catalog = Arc::new(CatalogDatabase::open_in_memory().unwrap());
        let state = Arc::new(StateStore::in_memory());

        let ctx = DepotContext::builder(config)
            .events(events.clone())
            .state(state.clone())
            .catalog(catalog.clone())
            .transport(server.clone())
            .transfers(transfers.clone())
            .installer(installer.clone())
            .results(results)
            .retry_policy(RetryPolicy {
                max_retries: 2,
                base_delay: Duration::ZERO,
            })
            .pipeline_options(PipelineOptions {
                poll_interval: Duration::from_millis(5),
                install_timeout: Duration::from_millis(200),
                cleanup_delay: Duration::from_secs(3600),
                cache_expiry: Duration::from_secs(3600),
            })
            .build()
            .unwrap();

        Self {
            ctx,
            server,
            transfers,
            installer,
            events,
            catalog,
            state,
            dir,
        }
    }

    pub fn events(&self) -> Vec<DepotEvent> {
        self.events.events()
    }
}

/// SHA-256 of `content`, computed through a scratch file.
pub fn sha256_of(content: &[u8]) -> String {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blob");
    fs::write(&path, content).unwrap();
    calculate_checksum(&path).unwrap()
}

/// Local HTTP server that announces `total` bytes, sends the first `sent` and then stalls.
/// Returns its base URL.
pub fn stalling_server(total: usize, sent: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                while reader.read_line(&mut line).is_ok_and(|n| n > 2) {
                    line.clear();
                }
                let mut stream = reader.into_inner();
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&vec![0u8; sent]);
                let _ = stream.flush();
                thread::sleep(Duration::from_secs(30));
            });
        }
    });

    format!("http://127.0.0.1:{port}")
}
