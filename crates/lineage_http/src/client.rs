//! Async client used by lineage views.
//!
//! # Responsibility
//! - Fetch lineage trees, leader pages and members over HTTP.
//! - Share one normalized tree cache across every view of a client.
//! - Drive per-view loading/error state with explicit, user-triggered retry.
//!
//! # Invariants
//! - Requests are bounded by the configured timeout and never retried
//!   automatically.
//! - Dropping a `ViewFetch` aborts its in-flight request; no state is
//!   published afterwards.

use crate::api::{ApiResponse, ErrorEnvelope};
use lineage_core::{
    CacheKey, ErrorCode, LeaderPage, LineageCache, LineageTree, Member, NormalizedLineage,
};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server origin, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
pub enum ClientError {
    /// Connection, timeout or body read failure.
    Transport(reqwest::Error),
    /// Server answered with an error envelope or non-success status.
    Server {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    /// Success body did not match the expected shape.
    Decode(String),
}

impl ClientError {
    /// Whether a manual retry may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Transport(err) => !err.is_builder(),
            Self::Server { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Server { code, .. } => *code,
            Self::Transport(_) => Some(ErrorCode::UpstreamUnavailable),
            Self::Decode(_) => None,
        }
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) if err.is_timeout() => write!(f, "request timed out"),
            Self::Transport(err) => write!(f, "lineage service unreachable: {err}"),
            Self::Server { message, .. } => write!(f, "{message}"),
            Self::Decode(message) => write!(f, "unexpected response: {message}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

/// HTTP client for the lineage API. Clones share the connection pool and
/// the tree cache.
#[derive(Debug, Clone)]
pub struct LineageClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<Mutex<LineageCache>>,
}

impl LineageClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(Mutex::new(LineageCache::new())),
        })
    }

    /// Normalized tree for `(root_id, max_depth)`, fetched once per client.
    pub async fn lineage_tree(
        &self,
        root_id: Option<&str>,
        max_depth: Option<u32>,
    ) -> Result<Arc<NormalizedLineage>, ClientError> {
        let key = CacheKey::new(root_id, max_depth);
        if let Some(cached) = self.lock_cache().get(&key) {
            return Ok(cached);
        }
        let response = self.fetch_lineage_tree(root_id, max_depth).await?;
        Ok(self.lock_cache().insert(key, &response.data))
    }

    /// Uncached tree request, warnings included.
    pub async fn fetch_lineage_tree(
        &self,
        root_id: Option<&str>,
        max_depth: Option<u32>,
    ) -> Result<ApiResponse<LineageTree>, ClientError> {
        let mut query = Vec::new();
        if let Some(root_id) = root_id {
            query.push(("rootId", root_id.to_string()));
        }
        if let Some(max_depth) = max_depth {
            query.push(("maxDepth", max_depth.to_string()));
        }
        let response: ApiResponse<LineageTree> = self.get_json("/lineage-tree", &query).await?;
        if !response.warnings.is_empty() {
            warn!(
                "event=client_fetch module=client route=/lineage-tree status=partial warnings={}",
                response.warnings.len()
            );
        }
        Ok(response)
    }

    pub async fn leaders(&self, page: u32, limit: u32) -> Result<LeaderPage, ClientError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        let response: ApiResponse<LeaderPage> = self.get_json("/lineage-leaders", &query).await?;
        Ok(response.data)
    }

    pub async fn member(&self, id: &str) -> Result<Member, ClientError> {
        let path = format!("/members/{id}");
        let response: ApiResponse<Member> = self.get_json(&path, &[]).await?;
        Ok(response.data)
    }

    pub async fn health(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Number of distinct tree requests held in the cache.
    pub fn cached_trees(&self) -> usize {
        self.lock_cache().len()
    }

    /// Fetch handle for a tree view instance.
    pub fn watch_lineage_tree(
        &self,
        root_id: Option<String>,
        max_depth: Option<u32>,
    ) -> ViewFetch<Arc<NormalizedLineage>> {
        let client = self.clone();
        ViewFetch::spawn(move || {
            let client = client.clone();
            let root_id = root_id.clone();
            async move { client.lineage_tree(root_id.as_deref(), max_depth).await }
        })
    }

    /// Fetch handle for one leaderboard page.
    pub fn watch_leaders(&self, page: u32, limit: u32) -> ViewFetch<LeaderPage> {
        let client = self.clone();
        ViewFetch::spawn(move || {
            let client = client.clone();
            async move { client.leaders(page, limit).await }
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, ClientError> {
        let started_at = Instant::now();
        let result = self.send_json(path, query).await;
        match &result {
            Ok(_) => info!(
                "event=client_fetch module=client route={path} status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=client_fetch module=client route={path} status=error retryable={} duration_ms={}",
                err.retryable(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(envelope) => ClientError::Server {
                    status: status.as_u16(),
                    code: Some(envelope.code),
                    message: envelope.error,
                },
                Err(_) => ClientError::Server {
                    status: status.as_u16(),
                    code: None,
                    message: format!("HTTP {status}: {}", String::from_utf8_lossy(&body)),
                },
            });
        }

        serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LineageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load state of one view's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<T> {
    Loading,
    Loaded(T),
    Failed { message: String, retryable: bool },
}

impl<T> FetchState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

type BoxedRequest<T> =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send>> + Send + Sync>;

/// Single-flight fetch owned by one view instance.
///
/// Must be created inside a Tokio runtime.
pub struct ViewFetch<T> {
    state: Arc<watch::Sender<FetchState<T>>>,
    request: BoxedRequest<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> ViewFetch<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Starts the first request immediately.
    pub fn spawn<F, Fut>(request: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let request: BoxedRequest<T> = Arc::new(
            move || -> Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send>> {
                Box::pin(request())
            },
        );
        let (state, _) = watch::channel(FetchState::Loading);
        let mut fetch = Self {
            state: Arc::new(state),
            request,
            task: None,
        };
        fetch.start();
        fetch
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    /// Re-issues the request after a retryable failure. Returns `false` and
    /// does nothing in any other state.
    pub fn retry(&mut self) -> bool {
        let retryable = matches!(
            &*self.state.borrow(),
            FetchState::Failed {
                retryable: true,
                ..
            }
        );
        if retryable {
            self.start();
        }
        retryable
    }

    /// Waits until the current request finishes.
    pub async fn settled(&self) -> FetchState<T> {
        let mut receiver = self.subscribe();
        loop {
            {
                let current = receiver.borrow_and_update();
                if !current.is_loading() {
                    return current.clone();
                }
            }
            if receiver.changed().await.is_err() {
                return self.state();
            }
        }
    }

    fn start(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_replace(FetchState::Loading);

        let state = Arc::clone(&self.state);
        let request = Arc::clone(&self.request);
        self.task = Some(tokio::spawn(async move {
            let next = match request().await {
                Ok(value) => FetchState::Loaded(value),
                Err(err) => FetchState::Failed {
                    message: err.to_string(),
                    retryable: err.retryable(),
                },
            };
            state.send_replace(next);
        }));
    }
}

impl<T> Drop for ViewFetch<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
