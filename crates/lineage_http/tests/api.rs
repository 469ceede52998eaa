use lineage_core::db::open_db;
use lineage_core::{ErrorCode, MemberService, NewMember, SqliteMemberRepository};
use lineage_http::{
    create_router, ApiSettings, ClientConfig, ClientError, ErrorEnvelope, FetchState,
    LineageClient,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestServer {
    addr: SocketAddr,
    db_path: PathBuf,
    _dir: TempDir,
}

impl TestServer {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn client(&self) -> LineageClient {
        LineageClient::new(ClientConfig::new(self.base_url())).unwrap()
    }
}

fn row(id: &str, name: &str, parent: Option<&str>) -> NewMember {
    NewMember {
        id: Some(id.to_string()),
        spiritual_parent_id: parent.map(str::to_string),
        ..NewMember::named(name)
    }
}

fn scenario_rows() -> Vec<NewMember> {
    vec![
        row("M1", "Mary", None),
        row("M2", "Mark", Some("M1")),
        row("M3", "Matt", Some("M1")),
        row("M4", "Mina", Some("M2")),
    ]
}

fn seed(db_path: &Path, rows: Vec<NewMember>) {
    let conn = open_db(db_path).unwrap();
    let service = MemberService::new(SqliteMemberRepository::try_new(&conn).unwrap());
    let report = service.import_members(rows).unwrap();
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);
}

async fn serve(db_path: PathBuf) -> SocketAddr {
    let settings = ApiSettings {
        db_path,
        query_timeout: Duration::from_secs(5),
        default_leader_limit: 12,
        max_leader_limit: 100,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::new(settings));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_server(rows: Vec<NewMember>) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lineage.sqlite3");
    seed(&db_path, rows);
    let addr = serve(db_path.clone()).await;
    TestServer {
        addr,
        db_path,
        _dir: dir,
    }
}

async fn get_error(url: String) -> (u16, ErrorEnvelope) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn rooted_tree_over_http_matches_store() {
    let server = start_server(scenario_rows()).await;
    let client = server.client();

    let response = client.fetch_lineage_tree(Some("M1"), None).await.unwrap();
    assert!(response.success);
    assert!(response.warnings.is_empty());
    let root = &response.data.family_tree[0];
    assert_eq!(root.id, "M1");
    let children: Vec<&str> = root.spiritual_children.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(children, ["M2", "M3"]);
    assert_eq!(root.spiritual_children[0].spiritual_children[0].id, "M4");
    assert_eq!(response.data.statistics.total_members, 4);
    assert_eq!(response.data.statistics.max_depth, 2);

    let truncated = client.fetch_lineage_tree(Some("M1"), Some(1)).await.unwrap();
    let m2 = &truncated.data.family_tree[0].spiritual_children[0];
    assert!(m2.spiritual_children.is_empty());
    assert!(m2.truncated);
}

#[tokio::test]
async fn wire_envelope_uses_camel_case_fields() {
    let server = start_server(scenario_rows()).await;
    let url = format!("{}/lineage-tree?rootId=M1", server.base_url());
    let body: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();

    assert_eq!(body["success"], true);
    assert!(body.get("warnings").is_none());
    let root = &body["data"]["familyTree"][0];
    assert_eq!(root["fullName"], "Mary");
    assert_eq!(root["_count"]["spiritualChildren"], 2);
    assert_eq!(body["data"]["statistics"]["rootMembers"], 1);
}

#[tokio::test]
async fn unknown_root_is_not_found_and_not_retryable() {
    let server = start_server(scenario_rows()).await;
    let err = server
        .client()
        .fetch_lineage_tree(Some("nobody"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 404, .. }));
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
    assert!(!err.retryable());
}

#[tokio::test]
async fn malformed_query_values_are_invalid_arguments() {
    let server = start_server(scenario_rows()).await;

    let (status, envelope) =
        get_error(format!("{}/lineage-tree?maxDepth=-1", server.base_url())).await;
    assert_eq!(status, 400);
    assert!(!envelope.success);
    assert_eq!(envelope.code, ErrorCode::InvalidArgument);

    let (status, envelope) =
        get_error(format!("{}/lineage-leaders?page=0", server.base_url())).await;
    assert_eq!(status, 400);
    assert_eq!(envelope.code, ErrorCode::InvalidArgument);

    let (status, _) = get_error(format!("{}/lineage-leaders?limit=abc", server.base_url())).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn leaders_default_to_twelve_per_page() {
    let mut rows = Vec::new();
    for index in 0..13 {
        let parent = format!("P{index:02}");
        rows.push(row(&parent, &format!("Parent {index:02}"), None));
        rows.push(row(&format!("C{index:02}"), &format!("Child {index:02}"), Some(&parent)));
    }
    let server = start_server(rows).await;
    let client = server.client();

    let body: serde_json::Value = reqwest::get(format!("{}/lineage-leaders", server.base_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["pagination"]["limit"], 12);
    assert_eq!(body["data"]["spiritualParents"].as_array().unwrap().len(), 12);

    let second = client.leaders(2, 12).await.unwrap();
    assert_eq!(second.spiritual_parents.len(), 1);
    assert!(!second.pagination.has_more);
    assert_eq!(second.statistics.total_leaders, 13);
    assert_eq!(second.statistics.total_members, 26);
}

#[tokio::test]
async fn parent_loop_is_reported_as_warning() {
    let server = start_server(scenario_rows()).await;
    {
        let conn = open_db(&server.db_path).unwrap();
        conn.execute(
            "UPDATE members SET spiritual_parent_id = 'M4' WHERE id = 'M1';",
            [],
        )
        .unwrap();
    }

    let response = server
        .client()
        .fetch_lineage_tree(Some("M1"), None)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.warnings.len(), 1);
    let warning = &response.warnings[0];
    assert_eq!(warning.code, ErrorCode::CycleDetected);
    assert_eq!(warning.member_id, "M4");
    assert_eq!(warning.ancestor_id, "M1");
    assert_eq!(response.data.family_tree[0].node_count(), 4);
}

#[tokio::test]
async fn member_lookup_and_health() {
    let server = start_server(scenario_rows()).await;
    let client = server.client();

    let member = client.member("M4").await.unwrap();
    assert_eq!(member.full_name, "Mina");
    assert_eq!(member.spiritual_parent_id.as_deref(), Some("M2"));

    let err = client.member("M9").await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));

    assert_eq!(client.health().await.unwrap(), "OK");
}

#[tokio::test]
async fn unreadable_store_is_upstream_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be opened as a database file.
    let addr = serve(dir.path().to_path_buf()).await;

    let client = LineageClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap();
    let err = client.leaders(1, 12).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
    assert_eq!(err.code(), Some(ErrorCode::UpstreamUnavailable));
    assert!(err.retryable());
}

#[tokio::test]
async fn view_fetch_loads_and_shares_cache() {
    let server = start_server(scenario_rows()).await;
    let client = server.client();

    let tree_view = client.watch_lineage_tree(None, None);
    match tree_view.settled().await {
        FetchState::Loaded(lineage) => {
            assert_eq!(lineage.root_ids(), ["M1".to_string()]);
            assert_eq!(lineage.len(), 4);
        }
        other => panic!("unexpected state: {other:?}"),
    }

    let second_view = client.watch_lineage_tree(None, None);
    assert!(matches!(second_view.settled().await, FetchState::Loaded(_)));
    assert_eq!(client.cached_trees(), 1);

    let leaders = client.watch_leaders(1, 12);
    match leaders.settled().await {
        FetchState::Loaded(page) => assert_eq!(page.spiritual_parents.len(), 2),
        other => panic!("unexpected state: {other:?}"),
    }
}

#[tokio::test]
async fn view_fetch_retry_only_after_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_addr = listener.local_addr().unwrap();
    drop(listener);

    let offline = LineageClient::new(
        ClientConfig::new(format!("http://{closed_addr}")).with_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let mut fetch = offline.watch_leaders(1, 12);
    assert!(matches!(
        fetch.settled().await,
        FetchState::Failed {
            retryable: true,
            ..
        }
    ));
    assert!(fetch.retry());
    assert!(matches!(fetch.settled().await, FetchState::Failed { .. }));

    let server = start_server(scenario_rows()).await;
    let mut missing = server.client().watch_lineage_tree(Some("nobody".to_string()), None);
    assert!(matches!(
        missing.settled().await,
        FetchState::Failed {
            retryable: false,
            ..
        }
    ));
    assert!(!missing.retry());
}
