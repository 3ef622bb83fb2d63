//! Conditional index fetching with retries.

use std::{io::Read, sync::Arc, time::Duration};

use depot_config::{repository::Repository, state::CacheEntry};
use tracing::{debug, warn};
use ureq::http::header::{ACCEPT, IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT};
use url::Url;

use crate::{
    error::RegistryError,
    transport::{IndexRequest, IndexTransport},
};

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1200);

/// How often and how patiently a failed fetch is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: the delay before retry `n` is `n * base_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// A fresh index body and the validators that came with it.
///
/// The body must be consumed exactly once; the cache entry should only be persisted after it
/// was parsed successfully.
pub struct FetchedIndex {
    pub body: Box<dyn Read + Send>,
    pub cache_entry: CacheEntry,
}

impl std::fmt::Debug for FetchedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedIndex")
            .field("cache_entry", &self.cache_entry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchedIndex),
    /// The server answered 304; carries the entry that was sent.
    Unchanged(Option<CacheEntry>),
    Failed(RegistryError),
}

pub struct IndexFetcher {
    transport: Arc<dyn IndexTransport>,
    policy: RetryPolicy,
    user_agent: String,
}

impl IndexFetcher {
    pub fn new(transport: Arc<dyn IndexTransport>, user_agent: impl Into<String>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            user_agent: user_agent.into(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Builds the index request. Validators from `previous` are attached unless `force` is set.
    pub fn build_request(
        &self,
        repo: &Repository,
        previous: Option<&CacheEntry>,
        force: bool,
    ) -> IndexRequest {
        let mut request = IndexRequest::new(repo.index_url())
            .with_header(USER_AGENT.as_str(), self.user_agent.as_str())
            .with_header(ACCEPT.as_str(), "application/json");

        if let Some(entry) = previous.filter(|_| !force) {
            if let Some(etag) = &entry.etag {
                request = request.with_header(IF_NONE_MATCH.as_str(), etag.as_str());
            }
            if let Some(last_modified) = &entry.last_modified {
                request = request.with_header(IF_MODIFIED_SINCE.as_str(), last_modified.as_str());
            }
        }

        request
    }

    /// Fetches the index of `repo`.
    ///
    /// Transport failures and 5xx responses are retried according to the [`RetryPolicy`];
    /// other statuses fail immediately. This never panics and never returns early with an
    /// error: every failure is reported as [`FetchOutcome::Failed`].
    pub async fn fetch(
        &self,
        repo: &Repository,
        previous: Option<&CacheEntry>,
        force: bool,
    ) -> FetchOutcome {
        let index_url = repo.index_url();
        if let Err(err) = Url::parse(&index_url) {
            return FetchOutcome::Failed(RegistryError::InvalidUrl(format!("{index_url}: {err}")));
        }
        if !repo.is_https() && !repo.allows_insecure() {
            return FetchOutcome::Failed(RegistryError::InsecureRepository(repo.url.clone()));
        }

        let request = self.build_request(repo, previous, force);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(repo = %repo.name, attempt, url = %request.url, "fetching index");

            let transport = Arc::clone(&self.transport);
            let req = request.clone();
            let result = match tokio::task::spawn_blocking(move || transport.get(&req)).await {
                Ok(result) => result,
                Err(err) => {
                    return FetchOutcome::Failed(RegistryError::Custom(format!(
                        "index fetch task failed: {err}"
                    )));
                }
            };

            let error = match result {
                Ok(resp) if resp.is_not_modified() => {
                    debug!(repo = %repo.name, "index not modified");
                    return FetchOutcome::Unchanged(previous.cloned());
                }
                Ok(resp) if resp.is_success() => {
                    let cache_entry = CacheEntry {
                        url: repo.base_url().to_string(),
                        etag: resp.etag,
                        last_modified: resp.last_modified,
                    };
                    return FetchOutcome::Success(FetchedIndex {
                        body: resp.body,
                        cache_entry,
                    });
                }
                Ok(resp) => {
                    RegistryError::HttpStatus {
                        url: request.url.clone(),
                        status: resp.status,
                    }
                }
                Err(err) => err,
            };

            if !error.is_transient() || attempt > self.policy.max_retries {
                return FetchOutcome::Failed(error);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                repo = %repo.name,
                attempt,
                "Index fetch failed: {error}, retrying in {delay:?}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io::{self, Cursor},
        sync::Mutex,
    };

    use super::*;
    use crate::{error::Result, transport::IndexResponse};

    #[derive(Default)]
    struct FakeTransport {
        responses: Mutex<VecDeque<Result<IndexResponse>>>,
        requests: Mutex<Vec<IndexRequest>>,
    }

    impl FakeTransport {
        fn with(responses: Vec<Result<IndexResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<IndexRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl IndexTransport for FakeTransport {
        fn get(&self, request: &IndexRequest) -> Result<IndexResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RegistryError::Custom("no scripted response".into())))
        }
    }

    fn status(status: u16) -> Result<IndexResponse> {
        Ok(IndexResponse {
            status,
            etag: None,
            last_modified: None,
            body: Box::new(io::empty()),
        })
    }

    fn ok(body: &str, etag: &str) -> Result<IndexResponse> {
        Ok(IndexResponse {
            status: 200,
            etag: Some(etag.to_string()),
            last_modified: Some("Wed, 01 Jan 2025 00:00:00 GMT".to_string()),
            body: Box::new(Cursor::new(body.as_bytes().to_vec())),
        })
    }

    fn timeout() -> Result<IndexResponse> {
        Err(RegistryError::Transport {
            url: "https://f-droid.org/repo/index-v2.json".into(),
            message: "timed out".into(),
        })
    }

    fn fetcher(transport: Arc<FakeTransport>) -> IndexFetcher {
        IndexFetcher::new(transport, "depot-test").with_retry_policy(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
        })
    }

    fn repo() -> Repository {
        Repository::new("fdroid", "https://f-droid.org/repo/")
    }

    fn previous() -> CacheEntry {
        CacheEntry {
            url: "https://f-droid.org/repo".into(),
            etag: Some("\"v1\"".into()),
            last_modified: Some("Tue, 31 Dec 2024 00:00:00 GMT".into()),
        }
    }

    #[tokio::test]
    async fn test_success_returns_body_and_validators() {
        let transport = FakeTransport::with(vec![ok("{}", "\"v2\"")]);
        let outcome = fetcher(transport.clone()).fetch(&repo(), None, false).await;

        let FetchOutcome::Success(mut index) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        let mut body = String::new();
        index.body.read_to_string(&mut body).unwrap();
        assert_eq!(body, "{}");
        assert_eq!(index.cache_entry.url, "https://f-droid.org/repo");
        assert_eq!(index.cache_entry.etag.as_deref(), Some("\"v2\""));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://f-droid.org/repo/index-v2.json");
        assert_eq!(requests[0].header("accept"), Some("application/json"));
        assert_eq!(requests[0].header("user-agent"), Some("depot-test"));
        assert_eq!(requests[0].header("if-none-match"), None);
    }

    #[tokio::test]
    async fn test_not_modified_is_unchanged() {
        let transport = FakeTransport::with(vec![status(304)]);
        let prev = previous();
        let outcome = fetcher(transport.clone())
            .fetch(&repo(), Some(&prev), false)
            .await;

        assert!(matches!(outcome, FetchOutcome::Unchanged(Some(entry)) if entry == prev));
        let requests = transport.requests();
        assert_eq!(requests[0].header("If-None-Match"), Some("\"v1\""));
        assert_eq!(
            requests[0].header("If-Modified-Since"),
            Some("Tue, 31 Dec 2024 00:00:00 GMT")
        );
    }

    #[tokio::test]
    async fn test_force_skips_conditional_headers() {
        let transport = FakeTransport::with(vec![ok("{}", "\"v2\"")]);
        let prev = previous();
        let outcome = fetcher(transport.clone())
            .fetch(&repo(), Some(&prev), true)
            .await;

        assert!(matches!(outcome, FetchOutcome::Success(_)));
        let requests = transport.requests();
        assert_eq!(requests[0].header("If-None-Match"), None);
        assert_eq!(requests[0].header("If-Modified-Since"), None);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_budget_exhausted() {
        let transport = FakeTransport::with(vec![status(503), status(500), status(502)]);
        let outcome = fetcher(transport.clone()).fetch(&repo(), None, false).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failed(RegistryError::HttpStatus { status: 502, .. })
        ));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_transport_error_then_success() {
        let transport = FakeTransport::with(vec![timeout(), status(500), ok("{}", "\"v3\"")]);
        let outcome = fetcher(transport.clone()).fetch(&repo(), None, false).await;

        assert!(matches!(outcome, FetchOutcome::Success(_)));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately() {
        let transport = FakeTransport::with(vec![status(404), ok("{}", "\"v2\"")]);
        let outcome = fetcher(transport.clone()).fetch(&repo(), None, false).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failed(RegistryError::HttpStatus { status: 404, .. })
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_insecure_repository_is_refused_without_request() {
        let transport = FakeTransport::with(vec![ok("{}", "\"v2\"")]);
        let plain = Repository::new("local", "http://192.168.1.2/repo");
        let outcome = fetcher(transport.clone()).fetch(&plain, None, false).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failed(RegistryError::InsecureRepository(_))
        ));
        assert!(transport.requests().is_empty());

        let mut allowed = plain.clone();
        allowed.allow_insecure = Some(true);
        let outcome = fetcher(transport.clone()).fetch(&allowed, None, false).await;
        assert!(matches!(outcome, FetchOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_malformed_url_fails() {
        let transport = FakeTransport::with(vec![]);
        let outcome = fetcher(transport.clone())
            .fetch(&Repository::new("bad", "not a url"), None, false)
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(RegistryError::InvalidUrl(_))
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2400));
    }
}
