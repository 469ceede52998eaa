//! HTTP handlers for the lineage read API.
//!
//! # Responsibility
//! - Expose lineage tree, leaderboard and member lookup over JSON.
//! - Map service errors onto stable status codes and error envelopes.
//!
//! # Invariants
//! - Handlers never panic; every failure becomes `{ success: false, error, code }`.
//! - SQLite work runs on a blocking worker bounded by the query timeout.
//! - Cycle conditions never fail a request; they travel as `warnings`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use lineage_core::db::open_db;
use lineage_core::{
    CycleReport, ErrorCode, LeaderPage, LeaderPageRequest, LeaderService, LineageQuery,
    LineageService, LineageServiceError, LineageTree, Member, MemberRepoError, MemberService,
    MemberServiceError, SqliteMemberRepository,
};
use log::{info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime settings the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub db_path: PathBuf,
    pub query_timeout: Duration,
    pub default_leader_limit: u32,
    pub max_leader_limit: u32,
}

pub type SharedState = Arc<ApiSettings>;

/// Builds the API router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/lineage-tree", get(lineage_tree))
        .route("/lineage-leaders", get(lineage_leaders))
        .route("/members/:id", get(member_by_id))
        .route("/health", get(health))
        .with_state(state)
}

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ApiWarning>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            warnings: Vec::new(),
        }
    }
}

/// Non-fatal condition attached to a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWarning {
    pub code: ErrorCode,
    pub message: String,
    pub member_id: String,
    pub ancestor_id: String,
}

impl From<&CycleReport> for ApiWarning {
    fn from(report: &CycleReport) -> Self {
        Self {
            code: ErrorCode::CycleDetected,
            message: format!(
                "lineage of {} loops back to {}; branch truncated",
                report.member_id, report.ancestor_id
            ),
            member_id: report.member_id.clone(),
            ancestor_id: report.ancestor_id.clone(),
        }
    }
}

/// Failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
}

/// Handler-level error carrying its wire code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.code)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for ApiError {}

impl From<LineageServiceError> for ApiError {
    fn from(value: LineageServiceError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}

impl From<MemberServiceError> for ApiError {
    fn from(value: MemberServiceError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}

impl From<MemberRepoError> for ApiError {
    fn from(value: MemberRepoError) -> Self {
        LineageServiceError::from(value).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            success: false,
            error: self.message,
            code: self.code,
        };
        (status, Json(body)).into_response()
    }
}

/// HTTP status for each wire error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::CycleDetected => StatusCode::CONFLICT,
        ErrorCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Raw `/lineage-tree` query string. Values stay text so malformed input
/// surfaces as `INVALID_ARGUMENT` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageTreeParams {
    pub root_id: Option<String>,
    pub max_depth: Option<String>,
}

/// Raw `/lineage-leaders` query string.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// GET /lineage-tree
pub async fn lineage_tree(
    State(state): State<SharedState>,
    Query(params): Query<LineageTreeParams>,
) -> Response {
    let started_at = Instant::now();
    let result = match LineageQuery::parse(params.root_id.as_deref(), params.max_depth.as_deref())
    {
        Ok(query) => {
            run_blocking(&state, move |conn| {
                let repo = SqliteMemberRepository::try_new(conn)?;
                Ok(LineageService::new(repo).lineage_tree(&query)?)
            })
            .await
        }
        Err(err) => Err(err.into()),
    };

    let result = result.map(|tree: LineageTree| {
        let warnings = tree.cycles.iter().map(ApiWarning::from).collect();
        ApiResponse {
            warnings,
            ..ApiResponse::ok(tree)
        }
    });
    if let Ok(response) = &result {
        if !response.warnings.is_empty() {
            warn!(
                "event=http_request module=api route=/lineage-tree status=partial warnings={}",
                response.warnings.len()
            );
        }
    }
    respond("/lineage-tree", started_at, result)
}

/// GET /lineage-leaders
pub async fn lineage_leaders(
    State(state): State<SharedState>,
    Query(params): Query<LeaderParams>,
) -> Response {
    let started_at = Instant::now();
    let max_limit = state.max_leader_limit;
    let result = match LeaderPageRequest::parse(
        params.page.as_deref(),
        params.limit.as_deref(),
        state.default_leader_limit,
    ) {
        Ok(request) => {
            run_blocking(&state, move |conn| {
                let repo = SqliteMemberRepository::try_new(conn)?;
                Ok(LeaderService::with_max_limit(repo, max_limit).leaders(&request)?)
            })
            .await
        }
        Err(err) => Err(err.into()),
    };
    respond("/lineage-leaders", started_at, result.map(ApiResponse::<LeaderPage>::ok))
}

/// GET /members/:id
pub async fn member_by_id(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let started_at = Instant::now();
    let result = run_blocking(&state, move |conn| {
        let repo = SqliteMemberRepository::try_new(conn)?;
        Ok(MemberService::new(repo).get_member(id.trim())?)
    })
    .await;
    respond("/members", started_at, result.map(ApiResponse::<Member>::ok))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// Runs one store operation on a blocking worker with its own connection.
async fn run_blocking<T, F>(state: &ApiSettings, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
{
    let db_path = state.db_path.clone();
    let task = tokio::task::spawn_blocking(move || {
        let conn = open_db(&db_path)
            .map_err(|err| ApiError::upstream(format!("member store unavailable: {err}")))?;
        work(&conn)
    });

    match tokio::time::timeout(state.query_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(ApiError::upstream(format!("member store worker failed: {err}"))),
        Err(_) => Err(ApiError::upstream(format!(
            "member store query timed out after {} ms",
            state.query_timeout.as_millis()
        ))),
    }
}

fn respond<T: Serialize>(
    route: &str,
    started_at: Instant,
    result: Result<ApiResponse<T>, ApiError>,
) -> Response {
    match result {
        Ok(body) => {
            info!(
                "event=http_request module=api route={route} status=ok http_status=200 duration_ms={}",
                started_at.elapsed().as_millis()
            );
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            warn!(
                "event=http_request module=api route={route} status=error http_status={} error_code={} duration_ms={}",
                err.status().as_u16(),
                err.code,
                started_at.elapsed().as_millis()
            );
            err.into_response()
        }
    }
}
