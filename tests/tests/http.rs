use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use tierwise_kernel::{ComplexityLabel, ModelTier};
use tierwise_testing::{GB, ProxyHarness, ScriptedClassifier};

const FRANCE: &str = "What is the capital of France?";

fn harness() -> ProxyHarness {
    ProxyHarness::new(Arc::new(ScriptedClassifier::new().with(
        FRANCE,
        &[(ComplexityLabel::Simple, 0.9), (ComplexityLabel::Medium, 0.1)],
    )))
}

fn post_generate(body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let app = harness().router(Some("secret"));
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn generate_returns_response_and_metrics() {
    let app = harness().router(None);
    let response = app
        .oneshot(post_generate(json!({ "prompt": FRANCE }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert!(body["response"].as_str().unwrap().contains(FRANCE));
    assert_eq!(body["model"], "small");
    let metrics = &body["metrics"];
    assert_eq!(metrics["taskComplexity"], "simple");
    assert_eq!(metrics["modelUsage"]["small"], 1);
    assert_eq!(metrics["memorySavings"].as_f64().unwrap(), 59.0);
    assert!(metrics["latency"].as_f64().unwrap() >= 0.0);
    assert!(metrics["memoryUsage"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn legacy_model_field_is_honoured() {
    let h = harness();

    let body = json_body(
        h.router(None)
            .oneshot(post_generate(json!({ "prompt": FRANCE, "model": "full" }), None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["model"], "small");

    let body = json_body(
        h.router(None)
            .oneshot(post_generate(json!({ "prompt": FRANCE, "model": "complex" }), None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["model"], "large");
    assert_eq!(body["metrics"]["taskComplexity"], "complex");
}

#[tokio::test]
async fn tier_mode_is_reported_as_override() {
    let app = harness().router(None);
    let body = json_body(
        app.oneshot(post_generate(json!({ "prompt": "hi", "mode": "tiny" }), None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["model"], "tiny");
    assert_eq!(body["metrics"]["taskComplexity"], "override");
}

#[tokio::test]
async fn wrong_or_missing_key_is_forbidden() {
    let h = harness();

    for key in [None, Some("nope")] {
        let response = h
            .router(Some("secret"))
            .oneshot(post_generate(json!({ "prompt": FRANCE }), key))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Could not validate credentials");

        let response = h.router(Some("secret")).oneshot(get("/stats", key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    assert_eq!(h.proxy.stats().total_requests, 0);

    let response = h
        .router(Some("secret"))
        .oneshot(post_generate(json!({ "prompt": FRANCE }), Some("secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_mode_is_bad_request() {
    let h = harness();
    let response = h
        .router(None)
        .oneshot(post_generate(json!({ "prompt": "hi", "mode": "gigantic" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "UnknownTier");
    assert_eq!(h.proxy.stats().total_requests, 0);
}

#[tokio::test]
async fn empty_prompt_is_bad_request() {
    let response = harness()
        .router(None)
        .oneshot(post_generate(json!({ "prompt": "   " }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn insufficient_memory_is_service_unavailable() {
    let h = harness();
    h.probe.set_available(GB);

    let response = h
        .router(None)
        .oneshot(post_generate(json!({ "prompt": FRANCE }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"]["code"], "InsufficientMemory");
    assert_eq!(h.proxy.stats().failed_requests, 1);
}

#[tokio::test]
async fn backend_load_failure_is_bad_gateway() {
    let h = harness();
    h.loader.fail_tier(ModelTier::Small, "model not pulled");

    let response = h
        .router(None)
        .oneshot(post_generate(json!({ "prompt": FRANCE }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BackendLoadError");
    assert!(body["error"]["message"].as_str().unwrap().contains("model not pulled"));
}

#[tokio::test]
async fn stats_reflect_traffic() {
    let h = harness();
    for body in [
        json!({ "prompt": FRANCE }),
        json!({ "prompt": "x", "mode": "large" }),
        json!({ "prompt": FRANCE }),
    ] {
        let response = h.router(None).oneshot(post_generate(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let body = json_body(h.router(None).oneshot(get("/stats", None)).await.unwrap()).await;
    assert_eq!(body["total_requests"], 3);
    assert_eq!(body["model_usage"]["small"], 2);
    assert_eq!(body["model_usage"]["large"], 1);
    assert_eq!(body["total_memory_saved"].as_f64().unwrap(), 118.0);
    assert_eq!(body["loaded_models"], json!(["small", "large"]));
    assert!(body["memory_usage"].as_f64().is_some());
}
