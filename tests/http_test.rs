mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use common::{build_app, test_config, Event, FakeEngine, PageScript, FAKE_PDF, FAKE_PNG};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn header<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> &'a str {
    headers.get(name).unwrap().to_str().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_generate_returns_pdf_with_job_headers() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;
    let router = app.router();

    let (status, headers, body) = send(
        &router,
        post_json(
            "/generate",
            json!({ "html": "<html><head></head><body>hi</body></html>", "css": "body { margin: 0 }" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, FAKE_PDF);
    assert_eq!(header(&headers, "content-type"), "application/pdf");
    assert_eq!(header(&headers, "x-color-space"), "RGB");
    assert_eq!(header(&headers, "x-pagination-engine"), "not-used");
    assert_eq!(header(&headers, "x-job-id").len(), 36);
}

#[tokio::test(start_paused = true)]
async fn test_preview_returns_png() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;

    let (status, headers, body) = send(
        &app.router(),
        post_json("/preview", json!({ "html": "<p>preview</p>", "viewport": { "width": 800, "height": 600 } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, FAKE_PNG);
    assert_eq!(header(&headers, "content-type"), "image/png");
    assert_eq!(header(&headers, "x-pagination-engine"), "skipped");
}

#[tokio::test(start_paused = true)]
async fn test_cover_without_dimensions_is_invalid_request() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;

    let (status, _, body) = send(
        &app.router(),
        post_json("/generate-cover", json!({ "html": "<p>cover</p>" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["jobId"].is_string());
    assert!(body["error"].as_str().unwrap().contains("cover"));
    assert_eq!(engine.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_has_no_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;

    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, _, body) = send(&app.router(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["jobId"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_maps_to_gateway_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_script(PageScript {
        load_hangs: true,
        ..PageScript::default()
    });
    let app = build_app(test_config(dir.path()), &engine).await;

    let (status, _, body) = send(
        &app.router(),
        post_json("/generate", json!({ "html": "<p>stuck</p>", "timeoutMs": 1000 })),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "TIMEOUT");
    assert!(body["jobId"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_components() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;
    let router = app.router();

    send(&router, post_json("/generate", json!({ "html": "<p>x</p>" }))).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accepting"], true);
    assert_eq!(body["renderer"]["phase"], "ready");
    assert_eq!(body["renderer"]["pagesServed"], 1);
    assert_eq!(body["gate"]["capacity"], 3);
    assert_eq!(body["gate"]["admitted"], 0);
    assert_eq!(body["conversion"]["enabled"], false);
    assert_eq!(body["metrics"]["requestsTotal"], 1);
    assert_eq!(body["metrics"]["jobsSucceeded"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_is_degraded_while_shutting_down() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new();
    let app = build_app(test_config(dir.path()), &engine).await;
    app.shutdown().await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (_, _, body) = send(&app.router(), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(body["status"], "degraded");
    assert_eq!(body["renderer"]["phase"], "closed");

    let (status, _, _) = send(&app.router(), post_json("/generate", json!({ "html": "<p>x</p>" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stop_fails_in_flight_request_instead_of_waiting_for_it() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::with_script(PageScript {
        load_hangs: true,
        ..PageScript::default()
    });
    let app = build_app(test_config(dir.path()), &engine).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app.serve_until(listener, async {
        let _ = stop_rx.await;
    }));

    let body = json!({ "html": "<p>stuck</p>", "timeoutMs": 300_000 }).to_string();
    let request = format!(
        "POST /generate HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\n\
         content-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    for _ in 0..500 {
        if engine.count(|e| matches!(e, Event::LoadStarted(_))) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.count(|e| matches!(e, Event::LoadStarted(_))), 1);

    stop_tx.send(()).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("服务应在任务截止前关闭");
    stopped.unwrap().unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 500"), "{}", response);
    assert!(response.contains("GENERATION_ERROR"));
    assert_eq!(engine.live_browsers(), 0);
}
