
use axum::http::StatusCode;
use serde_json::json;

use dispatch_lite::config::{NodeConfig, QueueConfig};
use test_harness::{
    get, post_json, register_edge, send, submit_edge, submit_trusted, test_app, test_config,
    with_bearer, TOKEN,
};

fn lease_trusted(worker_id: &str) -> axum::http::Request<axum::body::Body> {
    with_bearer(
        get(&format!("/api/worker/jobs/next?workerId={}", worker_id)),
        TOKEN,
    )
}

// =============================================================================
// Trusted queue
// =============================================================================

#[tokio::test]
async fn test_trusted_happy_path_and_double_completion() {
    let app = test_app(test_config());

    let (status, body) = send(
        &app,
        post_json(
            "/api/jobs",
            json!({ "kind": "image", "payload": { "prompt": "a cat" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "queued");
    assert_eq!(body["job"]["priority"], "normal");
    assert_eq!(body["job"]["attempts"], 0);
    let job_id = body["job"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, lease_trusted("gpu-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["id"], job_id.as_str());
    assert_eq!(body["job"]["status"], "leased");
    assert_eq!(body["job"]["workerId"], "gpu-1");
    assert_eq!(body["job"]["attempts"], 1);
    assert!(body["job"]["leaseExpiresAt"].is_string());
    assert_eq!(body["job"]["payload"]["prompt"], "a cat");

    // Nothing left
    let (status, body) = send(&app, lease_trusted("gpu-1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let complete_uri = format!("/api/worker/jobs/{}/complete", job_id);
    let (status, body) = send(
        &app,
        with_bearer(
            post_json(
                &complete_uri,
                json!({ "status": "completed", "result": { "url": "/img/1.png" } }),
            ),
            TOKEN,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "completed");
    assert_eq!(body["job"]["result"]["url"], "/img/1.png");
    assert!(body["job"]["completedAt"].is_string());

    let (status, body) = send(
        &app,
        with_bearer(post_json(&complete_uri, json!({ "status": "error" })), TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "job_not_in_progress");

    // The first report stands
    let (status, body) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "completed");
}

#[tokio::test]
async fn test_priority_order() {
    let app = test_app(test_config());
    let j1 = submit_trusted(&app, "j1", "normal").await;
    let j2 = submit_trusted(&app, "j2", "high").await;
    let j3 = submit_trusted(&app, "j3", "normal").await;

    let mut leased = Vec::new();
    for _ in 0..3 {
        let (status, body) = send(&app, lease_trusted("w")).await;
        assert_eq!(status, StatusCode::OK);
        leased.push(body["job"]["id"].as_str().unwrap().to_string());
    }
    assert_eq!(leased, vec![j2, j1, j3]);
}

#[tokio::test]
async fn test_unknown_priority_is_normal_and_tool_alias() {
    let app = test_app(test_config());
    let (status, body) = send(
        &app,
        post_json("/api/jobs", json!({ "tool": "llm", "priority": "urgent" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["kind"], "llm");
    assert_eq!(body["job"]["priority"], "normal");
}

#[tokio::test]
async fn test_trusted_worker_auth() {
    let app = test_app(test_config());
    submit_trusted(&app, "x", "normal").await;

    let (status, body) = send(&app, get("/api/worker/jobs/next?workerId=w")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_worker_token");

    let (status, body) = send(
        &app,
        with_bearer(get("/api/worker/jobs/next?workerId=w"), "wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_worker_token");

    let (status, body) = send(&app, with_bearer(get("/api/worker/jobs/next"), TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "worker_id_required");

    // Rejected calls leased nothing
    let (_, body) = send(&app, get("/api/stats")).await;
    assert_eq!(body["trusted"]["queued"], 1);
    assert_eq!(body["trusted"]["leased"], 0);
}

#[tokio::test]
async fn test_no_configured_token_is_provider_unavailable() {
    let config = NodeConfig::default().with_edge_enabled(true);
    let app = test_app(config);

    let (status, body) = send(
        &app,
        with_bearer(get("/api/worker/jobs/next?workerId=w"), "x"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "provider_unavailable");

    // Submission stays open
    submit_trusted(&app, "x", "normal").await;
}

#[tokio::test]
async fn test_queue_full_has_no_side_effect() {
    let mut config = test_config();
    config.trusted.queue = QueueConfig {
        max_pending: 2,
        ..QueueConfig::trusted()
    };
    let app = test_app(config);
    submit_trusted(&app, "a", "normal").await;
    submit_trusted(&app, "b", "normal").await;

    let (status, body) = send(&app, post_json("/api/jobs", json!({ "kind": "c" }))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "queue_full");

    let (_, body) = send(&app, get("/api/jobs")).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);

    // Leasing frees a pending slot
    let (status, _) = send(&app, lease_trusted("w")).await;
    assert_eq!(status, StatusCode::OK);
    submit_trusted(&app, "c", "normal").await;
}

#[tokio::test]
async fn test_lookup_errors() {
    let app = test_app(test_config());

    let (status, body) = send(&app, get(&format!("/api/jobs/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "job_not_found");

    let (status, body) = send(&app, get("/api/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "job_not_found");

    let (status, body) = send(
        &app,
        with_bearer(
            post_json(
                &format!("/api/worker/jobs/{}/complete", uuid::Uuid::new_v4()),
                json!({ "status": "completed" }),
            ),
            TOKEN,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "job_not_found");
}

#[tokio::test]
async fn test_completion_requires_status() {
    let app = test_app(test_config());
    let job_id = submit_trusted(&app, "x", "normal").await;
    send(&app, lease_trusted("w")).await;

    let (status, body) = send(
        &app,
        with_bearer(
            post_json(&format!("/api/worker/jobs/{}/complete", job_id), json!({})),
            TOKEN,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "status_required");

    let (_, body) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
    assert_eq!(body["job"]["status"], "leased");
}

#[tokio::test]
async fn test_completion_authorizes_before_reading_body() {
    let app = test_app(test_config());
    let job_id = submit_trusted(&app, "x", "normal").await;
    send(&app, lease_trusted("w")).await;
    let uri = format!("/api/worker/jobs/{}/complete", job_id);

    let malformed = || {
        axum::http::Request::builder()
            .method(axum::http::Method::POST)
            .uri(&uri)
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap()
    };

    let (status, body) = send(&app, malformed()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_worker_token");

    let (status, body) = send(&app, with_bearer(malformed(), "wrong")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_worker_token");

    // A worker holding the token still gets the body error
    let (status, body) = send(&app, with_bearer(malformed(), TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (_, body) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
    assert_eq!(body["job"]["status"], "leased");
}

#[tokio::test]
async fn test_non_completed_status_marks_failed() {
    let app = test_app(test_config());
    let job_id = submit_trusted(&app, "x", "normal").await;
    send(&app, lease_trusted("w")).await;

    let (status, body) = send(
        &app,
        with_bearer(
            post_json(
                &format!("/api/worker/jobs/{}/complete", job_id),
                json!({ "status": "error", "detail": { "message": "out of memory" } }),
            ),
            TOKEN,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "failed");
    assert_eq!(body["job"]["detail"]["message"], "out of memory");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let app = test_app(test_config());
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

// =============================================================================
// Edge queue
// =============================================================================

#[tokio::test]
async fn test_edge_skips_unsatisfied_job() {
    let app = test_app(test_config());
    let charging = submit_edge(&app, "embed", &["mobile", "charging"]).await;
    let mobile = submit_edge(&app, "embed", &["mobile"]).await;
    register_edge(&app, "phone-1", &["mobile"]).await;

    let (status, body) = send(&app, get("/api/edge/jobs/next?workerId=phone-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["id"], mobile.as_str());
    assert_eq!(body["job"]["workerId"], "phone-1");

    // The skipped job keeps its place
    let (_, body) = send(&app, get(&format!("/api/edge/jobs/{}", charging))).await;
    assert_eq!(body["job"]["status"], "queued");

    let (status, _) = send(&app, get("/api/edge/jobs/next?workerId=phone-1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Query tags override the registered set
    let (status, body) = send(
        &app,
        get("/api/edge/jobs/next?workerId=phone-1&tags=mobile,charging"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["id"], charging.as_str());
}

#[tokio::test]
async fn test_edge_submit_validation() {
    let app = test_app(test_config());

    let (status, body) = send(&app, post_json("/api/edge/jobs", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task_required");

    let (status, body) = send(
        &app,
        post_json("/api/edge/jobs", json!({ "task": "echo hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task_required");

    let (status, body) = send(
        &app,
        post_json("/api/edge/jobs", json!({ "task": { "input": [1, 2] } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task_kind_required");

    let (status, body) = send(
        &app,
        post_json(
            "/api/edge/jobs",
            json!({
                "task": { "kind": "embed", "text": "hello" },
                "requirements": ["WebGPU", " wasm "],
                "priority": "high",
                "metadata": { "session": "s1" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["kind"], "embed");
    assert_eq!(body["job"]["payload"]["text"], "hello");
    assert_eq!(body["job"]["requirements"], json!(["wasm", "webgpu"]));
    assert_eq!(body["job"]["priority"], "high");
    assert_eq!(body["job"]["metadata"]["session"], "s1");

    let (_, body) = send(&app, get("/api/edge/jobs")).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_edge_disabled_rejects_everything() {
    let config = NodeConfig::default().with_worker_token(test_harness::TOKEN);
    let app = test_app(config);

    let requests = vec![
        post_json("/api/edge/jobs", json!({ "task": { "kind": "x" } })),
        post_json("/api/edge/workers/register", json!({ "workerId": "w" })),
        post_json("/api/edge/workers/heartbeat", json!({ "workerId": "w" })),
        get("/api/edge/workers"),
        get("/api/edge/jobs/next?workerId=w"),
    ];
    for request in requests {
        let uri = request.uri().to_string();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["error"], "edge_jobs_disabled", "{}", uri);
    }

    // The trusted queue is unaffected
    submit_trusted(&app, "x", "normal").await;
}

#[tokio::test]
async fn test_edge_worker_registry() {
    let app = test_app(test_config());

    let (status, body) = send(
        &app,
        post_json(
            "/api/edge/workers/register",
            json!({
                "workerId": "laptop",
                "tags": ["WASM", "webgpu"],
                "battery": { "level": 0.8 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workerId"], "laptop");
    assert_eq!(body["leaseMs"], 30_000);
    assert_eq!(body["heartbeatIntervalMs"], 10_000);
    assert_eq!(body["tags"], json!(["wasm", "webgpu"]));

    let (status, body) = send(
        &app,
        post_json("/api/edge/workers/register", json!({ "tags": ["wasm"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "worker_id_required");

    let (status, body) = send(
        &app,
        post_json(
            "/api/edge/workers/heartbeat",
            json!({ "workerId": "laptop", "tags": ["wasm"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "tags": ["wasm"] }));

    let (status, body) = send(
        &app,
        post_json("/api/edge/workers/heartbeat", json!({ "workerId": "ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "worker_not_registered");

    let (status, body) = send(&app, get("/api/edge/workers")).await;
    assert_eq!(status, StatusCode::OK);
    let workers = body["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["workerId"], "laptop");
    assert_eq!(workers[0]["online"], true);
    assert_eq!(workers[0]["battery"]["level"], 0.8);
}

#[tokio::test]
async fn test_edge_lease_requires_registration() {
    let app = test_app(test_config());
    submit_edge(&app, "x", &[]).await;

    let (status, body) = send(&app, get("/api/edge/jobs/next?workerId=stranger")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "worker_not_registered");

    let (status, body) = send(&app, get("/api/edge/jobs/next")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "worker_id_required");
}

#[tokio::test]
async fn test_edge_completion_by_other_worker_is_rejected() {
    let app = test_app(test_config());
    let job_id = submit_edge(&app, "x", &[]).await;
    register_edge(&app, "a", &[]).await;
    send(&app, get("/api/edge/jobs/next?workerId=a")).await;

    let uri = format!("/api/edge/jobs/{}/complete", job_id);
    let (status, body) = send(
        &app,
        post_json(&uri, json!({ "workerId": "b", "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "job_not_in_progress");

    let (status, body) = send(
        &app,
        post_json(&uri, json!({ "workerId": "a", "status": "completed", "result": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "completed");
    assert_eq!(body["job"]["result"], 42);
}

// =============================================================================
// Service endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_stats() {
    let app = test_app(test_config());

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    submit_trusted(&app, "a", "normal").await;
    submit_trusted(&app, "b", "normal").await;
    send(&app, lease_trusted("w")).await;
    submit_edge(&app, "c", &[]).await;
    register_edge(&app, "e1", &[]).await;

    let (status, body) = send(&app, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["trusted"],
        json!({ "queued": 1, "leased": 1, "completed": 0, "failed": 0, "pending": 1, "workers": 0 })
    );
    assert_eq!(body["edge"]["queued"], 1);
    assert_eq!(body["edge"]["workers"], 1);
}
