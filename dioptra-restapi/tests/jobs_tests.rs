//! Job submission and status tracking

mod common;

use axum::http::StatusCode;
use common::{id_of, TestApp};
use serde_json::{json, Value};

struct Setup {
    app: TestApp,
    cookie: String,
    group: i64,
    queue: i64,
    experiment: i64,
}

async fn setup() -> Setup {
    let app = TestApp::new().await;
    let cookie = app.user("alice").await;
    let group = app.group(&cookie, "lab").await;
    let queue = app.named(&cookie, "/api/v1/queues", group, "gpu").await;
    let experiment = app.named(&cookie, "/api/v1/experiments", group, "mnist").await;
    Setup {
        app,
        cookie,
        group,
        queue,
        experiment,
    }
}

fn job(setup: &Setup, extra: Value) -> Value {
    let mut body = json!({
        "group": setup.group,
        "queueId": setup.queue,
        "experimentId": setup.experiment,
        "entryPoint": "train",
        "entryPointKwargs": {"epochs": "3"},
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body
}

#[tokio::test]
async fn test_submit_job() {
    let s = setup().await;

    let created = s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await;
    assert_eq!(created.status, StatusCode::OK, "{}", created.body);
    assert_eq!(created.body["status"], "queued");
    assert_eq!(created.body["timeout"], "24h");
    assert_eq!(created.body["entryPoint"], "train");
    assert_eq!(created.body["entryPointKwargs"], json!({"epochs": "3"}));
    assert_eq!(created.body["queue"]["id"], s.queue);
    assert_eq!(created.body["queue"]["name"], "gpu");
    assert_eq!(created.body["experiment"]["url"], format!("/api/v1/experiments/{}", s.experiment));
    assert!(created.body.get("snapshot").is_none());
    assert!(created.body.get("dependsOn").is_none());

    let id = id_of(&created);
    let fetched = s.app.get(&format!("/api/v1/jobs/{}", id), &s.cookie).await;
    assert_eq!(fetched.body, created.body);

    let listed = s.app.get("/api/v1/jobs", &s.cookie).await;
    assert_eq!(listed.body["totalNumResults"], 1);
}

#[tokio::test]
async fn test_job_validation() {
    let s = setup().await;

    let bad_timeout = s
        .app
        .post("/api/v1/jobs", &s.cookie, job(&s, json!({"timeout": "1d"})))
        .await;
    assert_eq!(bad_timeout.status, StatusCode::BAD_REQUEST);

    let no_entry_point = s
        .app
        .post("/api/v1/jobs", &s.cookie, job(&s, json!({"entryPoint": ""})))
        .await;
    assert_eq!(no_entry_point.status, StatusCode::BAD_REQUEST);

    let no_queue = s
        .app
        .post("/api/v1/jobs", &s.cookie, job(&s, json!({"queueId": 999})))
        .await;
    assert_eq!(no_queue.status, StatusCode::NOT_FOUND);

    let no_dependency = s
        .app
        .post("/api/v1/jobs", &s.cookie, job(&s, json!({"dependsOn": 999})))
        .await;
    assert_eq!(no_dependency.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_locked_queue_rejects_jobs() {
    let s = setup().await;
    let lock = format!("/api/v1/queues/{}/lock", s.queue);

    s.app.put(&lock, &s.cookie, json!({})).await;
    let rejected = s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);

    s.app.delete(&lock, &s.cookie).await;
    let accepted = s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await;
    assert_eq!(accepted.status, StatusCode::OK);
}

#[tokio::test]
async fn test_job_dependencies() {
    let s = setup().await;
    let first = id_of(&s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await);

    let second = s
        .app
        .post(
            "/api/v1/jobs",
            &s.cookie,
            job(&s, json!({"dependsOn": first, "timeout": "30m"})),
        )
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["dependsOn"], first);
    assert_eq!(second.body["timeout"], "30m");
}

#[tokio::test]
async fn test_job_status() {
    let s = setup().await;
    let id = id_of(&s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await);
    let url = format!("/api/v1/jobs/{}/status", id);

    let initial = s.app.get(&url, &s.cookie).await;
    assert_eq!(initial.body, json!({"id": id, "status": "queued"}));

    let started = s.app.put(&url, &s.cookie, json!({"status": "started"})).await;
    assert_eq!(started.status, StatusCode::OK);
    assert_eq!(started.body["status"], "started");

    let unknown = s.app.put(&url, &s.cookie, json!({"status": "exploded"})).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let job = s.app.get(&format!("/api/v1/jobs/{}", id), &s.cookie).await;
    assert_eq!(job.body["status"], "started");
}

#[tokio::test]
async fn test_delete_job() {
    let s = setup().await;
    let id = id_of(&s.app.post("/api/v1/jobs", &s.cookie, job(&s, json!({}))).await);
    let url = format!("/api/v1/jobs/{}", id);

    let deleted = s.app.delete(&url, &s.cookie).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(s.app.get(&url, &s.cookie).await.status, StatusCode::NOT_FOUND);
}
