//! HTTP API integration tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use quill_mi::config::IngestConfig;
use quill_mi::models::TaskStatus;
use quill_mi::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "qmi-test-boundary";

async fn test_app() -> (TempDir, Arc<AppState>, Router) {
    let dir = TempDir::new().unwrap();
    let config = IngestConfig {
        root_folder: dir.path().to_path_buf(),
        max_file_size: 4 * 1024 * 1024,
        ..IngestConfig::default()
    };
    let db = quill_mi::db::init_database_pool(&config.database_path())
        .await
        .unwrap();
    let state = Arc::new(AppState::new(config, db).await.unwrap());
    let app = build_router(Arc::clone(&state));
    (dir, state, app)
}

fn tiny_png() -> Vec<u8> {
    let mut buf = Vec::new();
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn multipart_body(filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(user_id: Uuid, filename: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("x-user-id", user_id.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, bytes)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Upload a file and wait for the task to reach a terminal state
async fn upload_and_wait(
    app: &Router,
    user_id: Uuid,
    filename: &str,
    bytes: &[u8],
) -> (Uuid, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(upload_request(user_id, filename, bytes))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let task = json_body(response).await;
    let task_id: Uuid = task["id"].as_str().unwrap().parse().unwrap();

    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/upload-progress/{task_id}"))
                    .header("x-user-id", user_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = json_body(response).await;
        let status = snapshot["status"].as_str().unwrap();
        if status != "queued" && status != "processing" {
            return (task_id, snapshot);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task never reached a terminal state");
}

#[tokio::test]
async fn test_health() {
    let (_dir, _state, app) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "quill-mi");
}

#[tokio::test]
async fn test_missing_user_header_is_validation_error() {
    let (_dir, _state, app) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/upload-progress/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (_dir, _state, app) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/upload-progress/{}", Uuid::new_v4()))
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_upload_completes_with_result() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();

    let (_task_id, snapshot) = upload_and_wait(&app, user, "photo.png", &tiny_png()).await;
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["progress"], 100);
    assert_eq!(snapshot["result"]["is_duplicate"], false);
    assert_eq!(snapshot["result"]["space_saved"], 0);
}

#[tokio::test]
async fn test_duplicate_upload_reports_savings() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();
    let png = tiny_png();

    let (_, first) = upload_and_wait(&app, user, "one.png", &png).await;
    let (_, second) = upload_and_wait(&app, user, "two.png", &png).await;

    assert_eq!(second["result"]["is_duplicate"], true);
    assert_eq!(second["result"]["space_saved"], png.len() as u64);
    assert_eq!(
        second["result"]["canonical_media_id"],
        first["result"]["media_id"]
    );
}

#[tokio::test]
async fn test_rejected_file_type_fails_task() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();

    let (_, snapshot) = upload_and_wait(&app, user, "notes.txt", b"plain text content").await;
    assert_eq!(snapshot["status"], "failed");
    assert!(snapshot["error"]
        .as_str()
        .unwrap()
        .contains("unsupported file type"));
}

#[tokio::test]
async fn test_oversized_upload_rejected_at_submission() {
    let dir = TempDir::new().unwrap();
    let config = IngestConfig {
        root_folder: dir.path().to_path_buf(),
        max_file_size: 64,
        ..IngestConfig::default()
    };
    let db = quill_mi::db::init_database_pool(&config.database_path())
        .await
        .unwrap();
    let state = Arc::new(AppState::new(config, db).await.unwrap());
    let app = build_router(state);

    let response = app
        .oneshot(upload_request(Uuid::new_v4(), "big.png", &[0u8; 4096]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn test_other_users_task_is_forbidden() {
    let (_dir, state, app) = test_app().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let (task_id, _) = upload_and_wait(&app, owner, "photo.png", &tiny_png()).await;

    // Snapshot, cancel, and stream are all rejected for a non-owner
    let requests = [
        Request::builder()
            .uri(format!("/upload-progress/{task_id}"))
            .header("x-user-id", stranger.to_string())
            .body(Body::empty())
            .unwrap(),
        Request::builder()
            .method("POST")
            .uri(format!("/upload-cancel/{task_id}"))
            .header("x-user-id", stranger.to_string())
            .body(Body::empty())
            .unwrap(),
        Request::builder()
            .uri(format!("/upload-stream/{task_id}"))
            .header("x-user-id", stranger.to_string())
            .body(Body::empty())
            .unwrap(),
    ];
    for request in requests {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    // The owner's task state is unaffected
    let snapshot = state.registry.snapshot(task_id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_cancel_completed_task_conflicts() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();
    let (task_id, _) = upload_and_wait(&app, user, "photo.png", &tiny_png()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/upload-cancel/{task_id}"))
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "TASK_COMPLETED");
}

#[tokio::test]
async fn test_cancel_queued_task_is_idempotent() {
    let (_dir, state, app) = test_app().await;
    let user = Uuid::new_v4();
    let task = state.registry.create(user, "pending.png".to_string(), 10).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/upload-cancel/{}", task.id))
                    .header("x-user-id", user.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "cancelled");
    }

    let snapshot = state.registry.snapshot(task.id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_event_stream_of_terminal_task_closes_after_status() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();
    let (task_id, _) = upload_and_wait(&app, user, "photo.png", &tiny_png()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/upload-stream/{task_id}"))
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The stream ends itself after the terminal snapshot, so the body
    // can be collected to completion
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: status"), "{text}");
    assert!(text.contains("\"completed\""), "{text}");
}

#[tokio::test]
async fn test_dedup_stats_empty_then_populated() {
    let (_dir, _state, app) = test_app().await;
    let user = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/deduplication-stats")
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total_unique_files"], 0);
    assert_eq!(body["deduplication_rate"], 0.0);

    let png = tiny_png();
    upload_and_wait(&app, user, "one.png", &png).await;
    upload_and_wait(&app, user, "two.png", &png).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/deduplication-stats")
                .header("x-user-id", user.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total_unique_files"], 1);
    assert_eq!(body["total_media_records"], 2);
    assert_eq!(body["duplicates_saved"], 1);
    assert_eq!(body["space_saved_bytes"], png.len() as u64);
}
