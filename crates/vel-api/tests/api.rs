use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use vel_api::{create_app, AppState};
use vel_core::{Row, Scope};
use vel_stages::Settings;

async fn app() -> (Router, AppState) {
    let state = AppState::from_settings(&Settings::default()).unwrap();
    let rows = vec![
        Row::new().with("id", 1).with("amt", 10),
        Row::new().with("id", 2).with("amt", 20),
    ];
    let accessor = state.coordinator.accessor();
    accessor
        .write_version(&Scope::new("p1", "orders"), "prod", rows.clone(), false)
        .await
        .unwrap();
    accessor
        .write_version(&Scope::new("p1", "orders"), "shadow", rows, false)
        .await
        .unwrap();
    (create_app(state.clone()), state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

fn post_run(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let (app, _) = app().await;
    for path in ["/health", "/api/health"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["version"], json!(vel_core::VEL_VERSION));
    }
}

#[tokio::test]
async fn run_returns_camel_case_result() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        post_run(
            "/api/run",
            json!({
                "stage": "Shadow Validator",
                "projectId": "p1",
                "dataset": "orders",
                "sourceVersion": "prod",
                "targetVersion": "shadow",
                "limit": 100
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["stage"], json!("ShadowValidator"));
    assert_eq!(body["status"], json!("Success"));
    assert_eq!(body["rowsProcessed"], json!(2));
    assert_eq!(body["discrepancies"], json!([]));
    assert!(body["runId"].is_string());
}

#[tokio::test]
async fn configuration_error_is_400() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        post_run(
            "/run",
            json!({
                "stage": "TranscriptValidator",
                "projectId": "p1",
                "dataset": "orders",
                "sourceVersion": "prod",
                "limit": 10
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("CONFIG/"));
}

#[tokio::test]
async fn unsupported_stage_is_422() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        post_run("/run", json!({ "stage": "Summarizer", "projectId": "p1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["message"].as_str().unwrap().contains("Summarizer"));
}

#[tokio::test]
async fn malformed_body_is_400() {
    let (app, _) = app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/run")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("message"));
}

#[tokio::test]
async fn storage_failures_are_200_with_failed_status() {
    let (app, state) = app().await;
    let (status, body) = send(
        app.clone(),
        post_run(
            "/run",
            json!({
                "stage": "SignalExtractor",
                "projectId": "p1",
                "dataset": "orders",
                "sourceVersion": "missing"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], json!("Failed"));

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, text) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains(r#"vel_runs_total{stage="SignalExtractor",status="failed"} 1"#), "{}", text);
    assert!(state.metrics.encode().unwrap().contains("vel_rows_written_total"));
}
