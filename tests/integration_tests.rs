//! Integration tests for sftp-image-server
//!
//! Note: SFTP itself needs a live server. These tests drive the index
//! walk and the HTTP API against an in-memory remote tree.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sftp_image_server::config::{load_env_file, CliArgs, ServerConfig};
use sftp_image_server::remote::{MemoryTree, RemoteTree};
use sftp_image_server::server::{build_router, AppState, WalkSummary, X_CREATION_DATE};
use sftp_image_server::walker::build_index;
use sftp_image_server::{ImageIndex, RandomImageService};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

fn sample_tree() -> Arc<MemoryTree> {
    let tree = Arc::new(MemoryTree::new());
    tree.add_file_with_mtime("/a/photo.JPG", vec![0xFF, 0xD8, 0xFF, 0xE0], Some(1_600_000_000))
        .add_file("/a/notes.txt", "shopping list")
        .add_file("/b/img.png", vec![0x89, b'P', b'N', b'G'])
        .add_dir("/c");
    tree
}

fn app(tree: &Arc<MemoryTree>, index: ImageIndex, seed: u64) -> Router {
    let remote: Arc<dyn RemoteTree> = Arc::clone(tree) as Arc<dyn RemoteTree>;
    let summary = WalkSummary::from_stats("/", &Default::default());
    let service = RandomImageService::with_seed(index, remote, seed);
    build_router(Arc::new(AppState::with_service(service, summary)))
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_cors(resp: &axum::response::Response) {
    let headers = resp.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
}

#[test]
fn test_index_of_sample_tree() {
    let tree = sample_tree();
    let (index, stats) = build_index(&*tree, "/");

    let dirs: HashSet<&str> = index.dirs().iter().map(String::as_str).collect();
    assert_eq!(dirs, HashSet::from(["/a", "/b"]));
    assert!(stats.completed);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_serves_image_with_headers() {
    let tree = sample_tree();
    let index = ImageIndex::from_dirs(vec!["/a".into()]);
    let router = app(&tree, index, 7);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_cors(&resp);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(resp.headers()[X_CREATION_DATE], "2020-09-13T12:26:40Z");

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], &[0xFF, 0xD8, 0xFF, 0xE0]);
}

#[tokio::test]
async fn test_both_directories_served_over_http() {
    let tree = sample_tree();
    let (index, _) = build_index(&*tree, "/");
    let router = app(&tree, index, 42);

    let mut types = HashSet::new();
    for _ in 0..200 {
        let resp = get(&router, "/getRandomImage").await;
        assert_eq!(resp.status(), StatusCode::OK);
        types.insert(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string());
    }
    assert_eq!(
        types,
        HashSet::from(["image/jpeg".to_string(), "image/png".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_accessor() {
    let tree = Arc::new(MemoryTree::new());
    for i in 0..20 {
        tree.add_file(&format!("/album{i}/shot.jpg"), vec![i as u8; 1024]);
    }
    let (index, _) = build_index(&*tree, "/");
    let router = app(&tree, index, 99);

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move {
                let resp = get(&router, "/getRandomImage").await;
                let status = resp.status();
                let bytes = resp.into_body().collect().await.unwrap().to_bytes();
                (status, bytes.len())
            })
        })
        .collect();

    for task in tasks {
        let (status, len) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(len, 1024);
    }
    assert_eq!(tree.open_calls(), 200);
}

#[tokio::test]
async fn test_missing_mtime_omits_creation_date() {
    let tree = Arc::new(MemoryTree::new());
    tree.add_file("/p/pic.webp", "w");
    let router = app(&tree, ImageIndex::from_dirs(vec!["/p".into()]), 1);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/webp");
    assert!(resp.headers().get(X_CREATION_DATE).is_none());
}

#[tokio::test]
async fn test_empty_index_is_404() {
    let tree = Arc::new(MemoryTree::new());
    let router = app(&tree, ImageIndex::default(), 1);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_cors(&resp);
    assert_eq!(
        json_body(resp).await,
        serde_json::json!({ "error": "No directories with images found" })
    );
    assert_eq!(tree.list_calls(), 0);
}

#[tokio::test]
async fn test_directory_emptied_after_index_is_404() {
    let tree = sample_tree();
    let (index, _) = build_index(&*tree, "/");
    tree.remove("/a/photo.JPG");
    tree.remove("/b/img.png");
    let router = app(&tree, index, 3);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("No images found in selected directory"));
}

#[tokio::test]
async fn test_file_deleted_before_open_is_500() {
    // Listed fine, gone by the time it is opened
    let tree = sample_tree();
    tree.fail_open("/b/img.png");
    let router = app(&tree, ImageIndex::from_dirs(vec!["/b".into()]), 5);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&resp);
    let body = json_body(resp).await;
    let msg = body["error"].as_str().unwrap();
    assert!(msg.contains("/b/img.png"), "{msg}");
}

#[tokio::test]
async fn test_directory_removed_after_index_is_500() {
    let tree = sample_tree();
    let (index, _) = build_index(&*tree, "/");
    tree.remove("/a");
    tree.remove("/b");
    let router = app(&tree, index, 8);

    let resp = get(&router, "/getRandomImage").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to read directory"));
}

#[tokio::test]
async fn test_options_preflight() {
    let tree = sample_tree();
    let router = app(&tree, ImageIndex::default(), 1);

    let resp = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/getRandomImage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_cors(&resp);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());
    assert_eq!(tree.list_calls(), 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let tree = sample_tree();
    let (index, _) = build_index(&*tree, "/");
    let router = app(&tree, index, 1);

    let resp = get(&router, "/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["indexed_directories"], 2);
    assert_eq!(body["walk"]["root"], "/");
}

#[test]
fn test_env_file_supplies_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# credentials for the photo share").unwrap();
    writeln!(file, "SSH_HOST=nas.example").unwrap();
    writeln!(file, "SSH_USER=photos").unwrap();
    writeln!(file, "SSH_PASSWORD=\"hunter 2\"").unwrap();
    writeln!(file, "SFTP_IMAGE_SERVER_IT_MARKER=loaded").unwrap();
    drop(file);

    // Parsed pairs, independent of whatever the runner already exports
    let pairs: HashMap<String, String> = dotenvy::from_path_iter(&path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(pairs["SSH_HOST"], "nas.example");
    assert_eq!(pairs["SSH_USER"], "photos");
    assert_eq!(pairs["SSH_PASSWORD"], "hunter 2");

    // Loading exports into the process; the marker is unique to this test
    assert!(load_env_file(&path).unwrap());
    assert_eq!(
        std::env::var("SFTP_IMAGE_SERVER_IT_MARKER").as_deref(),
        Ok("loaded")
    );
    assert!(!load_env_file(&dir.path().join("missing.env")).unwrap());

    let args = <CliArgs as clap::Parser>::try_parse_from([
        "sftp-image-server",
        "--ssh-host",
        pairs["SSH_HOST"].as_str(),
        "--ssh-user",
        pairs["SSH_USER"].as_str(),
        "--ssh-password",
        pairs["SSH_PASSWORD"].as_str(),
    ])
    .unwrap();
    let config = ServerConfig::from_args(args).unwrap();
    assert_eq!(config.target.host, "nas.example");
    assert_eq!(config.target.password, "hunter 2");
}
