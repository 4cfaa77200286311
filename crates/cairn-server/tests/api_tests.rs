//! HTTP tests for cairn-server

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use cairn::{PackageTree, TreeNode, hash_tree};
use cairn_registry::{MemoryStore, Registry};
use cairn_server::{AppState, config::ServerConfig, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const USER: &str = "test_user";
const PKG: &str = "pkg";

fn app(allow_anonymous_access: bool) -> Router {
    let config = ServerConfig {
        allow_anonymous_access,
        ..ServerConfig::default()
    };
    create_router(AppState::new(Registry::new(MemoryStore::new()), config))
}

fn contents(child: &str) -> TreeNode {
    TreeNode::group([(child, TreeNode::group(Vec::<(String, TreeNode)>::new()))])
}

fn hash_of(contents: &TreeNode) -> String {
    hash_tree(&PackageTree::from_nested(contents).unwrap())
        .unwrap()
        .to_string()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-cairn-user", user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn put_package(app: &Router, contents: &TreeNode) -> (StatusCode, Value) {
    send(
        app,
        Method::PUT,
        &format!("/api/package/{USER}/{PKG}/{}?tag_latest=true", hash_of(contents)),
        Some(USER),
        Some(json!({ "contents": contents })),
    )
    .await
}

/// Three pushes with one version each, as in the log workflow
async fn seed(app: &Router) -> Vec<TreeNode> {
    let contents_list = vec![contents("foo"), contents("bar"), contents("baz")];
    for contents in &contents_list {
        let (status, _) = put_package(app, contents).await;
        assert_eq!(status, StatusCode::OK);
    }

    for (contents, version) in contents_list.iter().zip(["1.0.0", "2.0.0", "3.0.0"]) {
        let (status, _) = send(
            app,
            Method::PUT,
            &format!("/api/version/{USER}/{PKG}/{version}"),
            Some(USER),
            Some(json!({ "hash": hash_of(contents) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    contents_list
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(false), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_log() {
    let app = app(false);
    let contents_list = seed(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/log/{USER}/{PKG}/"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);

    let tag_list = [Value::Null, Value::Null, json!(["latest"])];
    let version_list = [json!(["1.0.0"]), json!(["2.0.0"]), json!(["3.0.0"])];
    for (((log, contents), tags), versions) in logs
        .iter()
        .zip(&contents_list)
        .zip(&tag_list)
        .zip(&version_list)
    {
        assert_eq!(log["author"], USER);
        assert_eq!(log["hash"], hash_of(contents));
        assert_eq!(&log["tags"], tags);
        assert_eq!(&log["versions"], versions);
    }
}

#[tokio::test]
async fn test_access() {
    let app = app(true);
    seed(&app).await;
    let log_uri = format!("/api/log/{USER}/{PKG}/");
    let sharewith = "share_with";

    // Neither another user nor an anonymous caller can see it
    let (status, _) = send(&app, Method::GET, &log_uri, Some(sharewith), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, &log_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Share with one user
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/access/{USER}/{PKG}/{sharewith}"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &log_uri, Some(sharewith), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &log_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Share with everyone
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/access/{USER}/{PKG}/public"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &log_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/access/{USER}/{PKG}/"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.contains(&json!("public")));
    assert!(users.contains(&json!(sharewith)));
}

#[tokio::test]
async fn test_missing_package_matches_denied_body() {
    let app = app(false);
    let log_uri = format!("/api/log/{USER}/{PKG}/");

    let (missing_status, missing) = send(&app, Method::GET, &log_uri, Some("stranger"), None).await;
    seed(&app).await;
    let (denied_status, denied) = send(&app, Method::GET, &log_uri, Some("stranger"), None).await;

    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(denied_status, StatusCode::NOT_FOUND);
    assert_eq!(denied, missing);
}

#[tokio::test]
async fn test_anonymous_refused_without_flag() {
    let app = app(false);
    seed(&app).await;

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/log/{USER}/{PKG}/"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_push_validation() {
    let app = app(false);
    let foo = contents("foo");

    // Wrong hash in the path
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/package/{USER}/{PKG}/{}", hash_of(&contents("bar"))),
        Some(USER),
        Some(json!({ "contents": foo })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Somebody else's namespace
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/package/{USER}/{PKG}/{}", hash_of(&foo)),
        Some("intruder"),
        Some(json!({ "contents": foo })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No identity at all
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/package/{USER}/{PKG}/{}", hash_of(&foo)),
        None,
        Some(json!({ "contents": foo })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = put_package(&app, &foo).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sequence"], 1);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/package/{USER}/{PKG}/{}", hash_of(&foo)),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contents"], json!(foo));
}

#[tokio::test]
async fn test_tags_and_versions() {
    let app = app(false);
    let contents_list = seed(&app).await;
    let first = hash_of(&contents_list[0]);
    let second = hash_of(&contents_list[1]);

    // Versions are write-once
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/version/{USER}/{PKG}/1.0.0"),
        Some(USER),
        Some(json!({ "hash": second })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/version/{USER}/{PKG}/1.0.0"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hash"], first);

    // Tags move
    for hash in [&first, &second] {
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/tag/{USER}/{PKG}/stable"),
            Some(USER),
            Some(json!({ "hash": hash })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/tag/{USER}/{PKG}/stable"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(body["hash"], second);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/tag/{USER}/{PKG}/"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/tag/{USER}/{PKG}/stable"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/tag/{USER}/{PKG}/stable"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/version/{USER}/{PKG}/"),
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["versions"].as_array().unwrap().len(), 3);
}
