//! `GitHubGateway` against an in-process mock host.
//!
//! Every request is recorded and answered by a per-test responder so the
//! tests can assert on the exact wire traffic.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use repofuse_core::errors::{GatewayError, PushError};
use repofuse_core::models::{CommitPlan, CommitTarget, PendingFile, PushStrategy, RepoRef};
use repofuse_core::{CommitWriter, Credential, GitHubGateway, RepoGateway};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: String,
    auth: String,
    body: String,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

type Responder = Box<dyn Fn(&Recorded) -> (u16, String) + Send + Sync>;

struct MockHost {
    requests: Mutex<Vec<Recorded>>,
    respond: Responder,
}

impl MockHost {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn lines(&self) -> Vec<String> {
        self.requests().iter().map(Recorded::line).collect()
    }
}

async fn handle(
    State(host): State<Arc<MockHost>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let recorded = Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        auth: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        body,
    };
    let (status, body) = (host.respond)(&recorded);
    host.requests.lock().unwrap().push(recorded);

    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn spawn_host<F>(respond: F) -> (GitHubGateway, Arc<MockHost>)
where
    F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
{
    let host = Arc::new(MockHost {
        requests: Mutex::new(Vec::new()),
        respond: Box::new(respond),
    });
    let app = Router::new().fallback(handle).with_state(host.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let gateway = GitHubGateway::new(&format!("http://{}/", addr), "repofuse-test").unwrap();
    (gateway, host)
}

fn ok(body: Value) -> (u16, String) {
    (200, body.to_string())
}

fn cred() -> Credential {
    Credential::new("good")
}

fn app_repo() -> RepoRef {
    RepoRef::new("acme", "app", "main")
}

// ---------------------------------------------------------------------------
// Auth schemes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bearer_rejected_then_token_scheme_succeeds() {
    let (gateway, host) = spawn_host(|req| {
        if req.auth == "token good" {
            ok(json!({"login": "octo", "avatar_url": "https://avatars/octo"}))
        } else {
            (401, json!({"message": "Bad credentials"}).to_string())
        }
    })
    .await;

    let user = gateway.authenticated_user(&cred()).await.unwrap();
    assert_eq!(user.login, "octo");
    assert_eq!(user.avatar_url.as_deref(), Some("https://avatars/octo"));

    let auths: Vec<String> = host.requests().into_iter().map(|r| r.auth).collect();
    assert_eq!(auths, vec!["Bearer good", "token good"]);
}

#[tokio::test]
async fn test_bearer_accepted_first() {
    let (gateway, host) = spawn_host(|_| ok(json!([]))).await;
    let repos = gateway.list_repositories(&cred()).await.unwrap();
    assert!(repos.is_empty());

    let requests = host.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].auth, "Bearer good");
    assert_eq!(requests[0].path, "/user/repos");
    assert!(requests[0].query.contains("sort=updated"));
    assert!(requests[0].query.contains("per_page=100"));
}

#[tokio::test]
async fn test_unauthorized_under_every_scheme_is_credential_error() {
    let (gateway, host) =
        spawn_host(|_| (401, json!({"message": "Bad credentials"}).to_string())).await;

    let err = gateway.authenticated_user(&cred()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Credential));
    assert_eq!(err.status(), Some(401));
    assert_eq!(host.requests().len(), 2);
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_repositories_maps_default_branch() {
    let (gateway, _host) = spawn_host(|_| {
        ok(json!([
            {"name": "app", "owner": {"login": "acme"}, "default_branch": "develop"},
            {"name": "blank", "owner": {"login": "acme"}, "default_branch": null},
        ]))
    })
    .await;

    let repos = gateway.list_repositories(&cred()).await.unwrap();
    assert_eq!(repos[0], RepoRef::new("acme", "app", "develop"));
    assert_eq!(repos[1].default_branch, "main");
}

#[tokio::test]
async fn test_get_tree_keeps_blobs_and_trees() {
    let (gateway, host) = spawn_host(|_| {
        ok(json!({
            "sha": "t1",
            "truncated": false,
            "tree": [
                {"path": "src", "type": "tree", "sha": "s1"},
                {"path": "src/main.rs", "type": "blob", "sha": "h1", "size": 12},
                {"path": "vendor/sub", "type": "commit", "sha": "c9"},
            ]
        }))
    })
    .await;

    let entries = gateway.get_tree(&cred(), &app_repo(), None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].is_blob());
    assert_eq!(entries[1].content_hash, "h1");
    assert_eq!(entries[1].size_bytes, Some(12));

    let req = &host.requests()[0];
    assert_eq!(req.path, "/repos/acme/app/git/trees/main");
    assert_eq!(req.query, "recursive=1");
}

#[tokio::test]
async fn test_get_tree_of_empty_repository() {
    let (gateway, _host) = spawn_host(|_| {
        (409, json!({"message": "Git Repository is empty."}).to_string())
    })
    .await;

    let err = gateway.get_tree(&cred(), &app_repo(), None).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::EmptyRepository { ref branch, .. } if branch == "main"
    ));
}

#[tokio::test]
async fn test_get_file_content_decodes_and_reports_missing() {
    let (gateway, host) = spawn_host(|req| {
        if req.path.ends_with("/docs/readme.md") {
            // Wrapped the way the host wraps long base64 payloads.
            ok(json!({
                "type": "file",
                "encoding": "base64",
                "content": "aGVsbG8K\nd29ybGQ=\n",
            }))
        } else {
            (404, json!({"message": "Not Found"}).to_string())
        }
    })
    .await;

    let found = gateway
        .get_file_content(&cred(), &app_repo(), "docs/readme.md", Some("feature"))
        .await
        .unwrap();
    assert!(found.exists);
    assert_eq!(found.text(), Some("hello\nworld"));

    let missing = gateway
        .get_file_content(&cred(), &app_repo(), "nope.txt", None)
        .await
        .unwrap();
    assert!(!missing.exists);
    assert!(missing.content.is_none());

    let requests = host.requests();
    assert_eq!(requests[0].path, "/repos/acme/app/contents/docs/readme.md");
    assert_eq!(requests[0].query, "ref=feature");
    assert_eq!(requests[1].query, "ref=main");
}

#[tokio::test]
async fn test_get_file_content_returns_binary_bytes() {
    let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff];
    let encoded = BASE64.encode(png);
    let (gateway, _host) = spawn_host(move |_| {
        ok(json!({"type": "file", "encoding": "base64", "content": encoded}))
    })
    .await;

    let found = gateway
        .get_file_content(&cred(), &app_repo(), "assets/logo.png", None)
        .await
        .unwrap();
    assert!(found.exists);
    assert_eq!(found.content, Some(png.to_vec()));
    assert_eq!(found.text(), None);
}

#[tokio::test]
async fn test_truncated_tree_is_an_error() {
    let (gateway, _host) = spawn_host(|_| {
        ok(json!({
            "sha": "t1",
            "truncated": true,
            "tree": [{"path": "a.txt", "type": "blob", "sha": "h1"}]
        }))
    })
    .await;

    let err = gateway.get_tree(&cred(), &app_repo(), None).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::TruncatedTree { ref repo, ref git_ref } if repo == "acme/app" && git_ref == "main"
    ));
}

#[tokio::test]
async fn test_server_error_body_passes_through() {
    let (gateway, _host) = spawn_host(|_| (502, "upstream exploded".to_string())).await;

    let err = gateway.list_repositories(&cred()).await.unwrap_err();
    match err {
        GatewayError::Transient { status, ref message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected Transient, got {:?}", other),
    }
    assert!(err.is_transient());
}

// ---------------------------------------------------------------------------
// Repository creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_repository_sanitizes_name() {
    let (gateway, host) = spawn_host(|req| {
        let name = req.json()["name"].as_str().unwrap_or_default().to_string();
        (
            201,
            json!({"name": name, "owner": {"login": "octo"}, "default_branch": "main"}).to_string(),
        )
    })
    .await;

    let repo = gateway
        .create_repository(&cred(), "My Cool App!", "merged output", true)
        .await
        .unwrap();
    assert_eq!(repo.full_name(), "octo/My-Cool-App");

    let body = host.requests()[0].json();
    assert_eq!(body["name"], "My-Cool-App");
    assert_eq!(body["private"], true);
    assert_eq!(body["auto_init"], false);
}

#[tokio::test]
async fn test_create_repository_name_taken_and_validation() {
    let (gateway, _host) = spawn_host(|req| {
        let name = req.json()["name"].as_str().unwrap_or_default().to_string();
        let body = if name == "taken" {
            json!({
                "message": "Repository creation failed.",
                "errors": [{"resource": "Repository", "code": "custom", "field": "name",
                            "message": "name already exists on this account"}]
            })
        } else {
            json!({
                "message": "Validation Failed",
                "errors": [{"field": "description", "code": "too_long"}]
            })
        };
        (422, body.to_string())
    })
    .await;

    let err = gateway
        .create_repository(&cred(), "taken", "", true)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NameTaken { ref name } if name == "taken"));

    let err = gateway
        .create_repository(&cred(), "fresh", "x", true)
        .await
        .unwrap_err();
    match err {
        GatewayError::Validation { message } => {
            assert_eq!(message, "Validation Failed (description: too_long)");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Commit writer over HTTP
// ---------------------------------------------------------------------------

fn plan(files: &[(&str, &str)]) -> CommitPlan {
    CommitPlan::new(
        CommitTarget::new(app_repo(), None, "merge"),
        files.iter().map(|(p, c)| PendingFile::new(*p, *c)).collect(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_push_git_data_sequence() {
    let (gateway, host) = spawn_host(|req| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/repos/acme/app/git/ref/heads/main") => ok(json!({"object": {"sha": "c1"}})),
        ("GET", "/repos/acme/app/git/commits/c1") => ok(json!({"tree": {"sha": "t1"}})),
        ("POST", "/repos/acme/app/git/blobs") => {
            let encoded = req.json()["content"].as_str().unwrap_or_default().to_string();
            let content = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
            (201, json!({"sha": format!("blob-{}", content)}).to_string())
        }
        ("POST", "/repos/acme/app/git/trees") => (201, json!({"sha": "t2"}).to_string()),
        ("POST", "/repos/acme/app/git/commits") => (201, json!({"sha": "c2"}).to_string()),
        ("PATCH", "/repos/acme/app/git/refs/heads/main") => ok(json!({"object": {"sha": "c2"}})),
        _ => (404, json!({"message": "Not Found"}).to_string()),
    })
    .await;

    let cred = cred();
    let writer = CommitWriter::new(&gateway, &cred, 2);
    let outcome = writer
        .push(plan(&[("a.txt", "one"), ("dir/b.txt", "two")]))
        .await
        .unwrap();

    assert_eq!(outcome.commit_sha, "c2");
    assert_eq!(outcome.strategy, PushStrategy::GitData);
    assert_eq!(outcome.files_written, 2);

    let requests = host.requests();
    let tree = requests
        .iter()
        .find(|r| r.line() == "POST /repos/acme/app/git/trees")
        .unwrap()
        .json();
    assert_eq!(tree["base_tree"], "t1");
    assert_eq!(tree["tree"][0]["path"], "a.txt");
    assert_eq!(tree["tree"][0]["mode"], "100644");
    assert_eq!(tree["tree"][0]["sha"], "blob-one");
    assert_eq!(tree["tree"][1]["sha"], "blob-two");

    let commit = requests
        .iter()
        .find(|r| r.line() == "POST /repos/acme/app/git/commits")
        .unwrap()
        .json();
    assert_eq!(commit["parents"], json!(["c1"]));
    assert_eq!(commit["tree"], "t2");

    let lines = host.lines();
    assert_eq!(
        lines.last().map(String::as_str),
        Some("PATCH /repos/acme/app/git/refs/heads/main")
    );
    assert_eq!(lines.iter().filter(|l| l.starts_with("PATCH")).count(), 1);
}

#[tokio::test]
async fn test_push_into_empty_repository_uses_contents_api() {
    let (gateway, host) = spawn_host(|req| match req.method.as_str() {
        "GET" => (409, json!({"message": "Git Repository is empty."}).to_string()),
        "PUT" => {
            let path = req.path.trim_start_matches("/repos/acme/app/contents/").to_string();
            (
                201,
                json!({"content": {"path": path}, "commit": {"sha": format!("c-{}", path)}})
                    .to_string(),
            )
        }
        _ => (404, String::new()),
    })
    .await;

    let cred = cred();
    let writer = CommitWriter::new(&gateway, &cred, 2);
    let outcome = writer
        .push(plan(&[("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3")]))
        .await
        .unwrap();

    assert_eq!(outcome.strategy, PushStrategy::Contents);
    assert_eq!(outcome.commit_sha, "c-c.txt");
    assert_eq!(
        host.lines(),
        vec![
            "GET /repos/acme/app/git/ref/heads/main",
            "PUT /repos/acme/app/contents/a.txt",
            "PUT /repos/acme/app/contents/b.txt",
            "PUT /repos/acme/app/contents/c.txt",
        ]
    );
    let first = host.requests()[1].json();
    assert_eq!(first["branch"], "main");
    assert_eq!(first["content"], BASE64.encode("1"));
}

#[tokio::test]
async fn test_push_binary_blob_is_sent_verbatim() {
    let (gateway, host) = spawn_host(|req| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/repos/acme/app/git/ref/heads/main") => ok(json!({"object": {"sha": "c1"}})),
        ("GET", "/repos/acme/app/git/commits/c1") => ok(json!({"tree": {"sha": "t1"}})),
        ("POST", "/repos/acme/app/git/blobs") => (201, json!({"sha": "b1"}).to_string()),
        ("POST", "/repos/acme/app/git/trees") => (201, json!({"sha": "t2"}).to_string()),
        ("POST", "/repos/acme/app/git/commits") => (201, json!({"sha": "c2"}).to_string()),
        ("PATCH", _) => ok(json!({})),
        _ => (404, String::new()),
    })
    .await;

    let icon = vec![0x00, 0x00, 0x01, 0x00, 0xff, 0xfe];
    let plan = CommitPlan::new(
        CommitTarget::new(app_repo(), None, "merge"),
        vec![PendingFile::new("favicon.ico", icon.clone())],
    )
    .unwrap();
    let cred = cred();
    CommitWriter::new(&gateway, &cred, 1).push(plan).await.unwrap();

    let blob = host
        .requests()
        .into_iter()
        .find(|r| r.line() == "POST /repos/acme/app/git/blobs")
        .unwrap()
        .json();
    let sent = BASE64
        .decode(blob["content"].as_str().unwrap_or_default())
        .unwrap();
    assert_eq!(sent, icon);
    assert_eq!(blob["encoding"], "base64");
}

#[tokio::test]
async fn test_push_contents_partial_write() {
    let (gateway, _host) = spawn_host(|req| match req.method.as_str() {
        "GET" => (404, json!({"message": "Not Found"}).to_string()),
        "PUT" if req.path.ends_with("/b.txt") => {
            (500, json!({"message": "Server Error"}).to_string())
        }
        "PUT" => (201, json!({"commit": {"sha": "c-ok"}}).to_string()),
        _ => (404, String::new()),
    })
    .await;

    let cred = cred();
    let writer = CommitWriter::new(&gateway, &cred, 2);
    let err = writer
        .push(plan(&[("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3")]))
        .await
        .unwrap_err();

    match err {
        PushError::PartialWrite {
            committed,
            failed_path,
            source,
            ..
        } => {
            assert_eq!(committed, vec!["a.txt"]);
            assert_eq!(failed_path, "b.txt");
            assert!(matches!(source, GatewayError::Transient { status: 500, .. }));
        }
        other => panic!("expected PartialWrite, got {:?}", other),
    }
}
