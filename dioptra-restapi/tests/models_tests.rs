//! Models, their registered versions and artifacts

mod common;

use axum::http::StatusCode;
use common::{id_of, TestApp};
use serde_json::json;

async fn artifact(app: &TestApp, cookie: &str, group: i64, uri: &str) -> i64 {
    let response = app
        .post(
            "/api/v1/artifacts",
            cookie,
            json!({"group": group, "uri": uri, "description": "weights"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    id_of(&response)
}

#[tokio::test]
async fn test_artifacts() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let lab = app.group(&alice, "lab").await;

    let id = artifact(&app, &alice, lab, " s3://bucket/model.pt ").await;
    let url = format!("/api/v1/artifacts/{}", id);

    let fetched = app.get(&url, &alice).await;
    assert_eq!(fetched.body["uri"], "s3://bucket/model.pt");
    assert_eq!(fetched.body["description"], "weights");
    assert!(fetched.body["jobId"].is_null());

    let duplicate = app
        .post(
            "/api/v1/artifacts",
            &alice,
            json!({"group": lab, "uri": "s3://bucket/model.pt"}),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let modified = app
        .put(&url, &alice, json!({"description": "final weights"}))
        .await;
    assert_eq!(modified.status, StatusCode::OK);
    assert_eq!(modified.body["uri"], "s3://bucket/model.pt");
    assert_eq!(modified.body["description"], "final weights");

    let history = app.get(&format!("{}/snapshots", url), &alice).await;
    assert_eq!(history.body["totalNumResults"], 2);

    let missing_job = app
        .post(
            "/api/v1/artifacts",
            &alice,
            json!({"group": lab, "uri": "s3://other", "jobId": 999}),
        )
        .await;
    assert_eq!(missing_job.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_versions() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let lab = app.group(&alice, "lab").await;
    let first = artifact(&app, &alice, lab, "s3://bucket/v1.pt").await;
    let second = artifact(&app, &alice, lab, "s3://bucket/v2.pt").await;

    let model = app.named(&alice, "/api/v1/models", lab, "resnet").await;
    let url = format!("/api/v1/models/{}", model);

    let fresh = app.get(&url, &alice).await;
    assert!(fresh.body["lastVersion"].is_null());
    assert!(fresh.body.get("snapshot").is_none());

    let v1 = app
        .post(
            &format!("{}/versions", url),
            &alice,
            json!({"artifactId": first, "description": "baseline"}),
        )
        .await;
    assert_eq!(v1.status, StatusCode::OK);
    assert_eq!(v1.body["versionNumber"], 1);
    assert_eq!(v1.body["modelId"], model);
    assert_eq!(v1.body["artifact"]["uri"], "s3://bucket/v1.pt");

    let v2 = app
        .post(&format!("{}/versions", url), &alice, json!({"artifactId": second}))
        .await;
    assert_eq!(v2.body["versionNumber"], 2);

    let model_view = app.get(&url, &alice).await;
    assert_eq!(model_view.body["lastVersion"]["versionNumber"], 2);
    assert_eq!(model_view.body["lastVersion"]["artifact"]["id"], second);

    let versions = app.get(&format!("{}/versions", url), &alice).await;
    assert_eq!(versions.body["totalNumResults"], 2);
    assert_eq!(versions.body["data"][0]["versionNumber"], 1);

    let modified = app
        .put(
            &format!("{}/versions/1", url),
            &alice,
            json!({"description": "the baseline"}),
        )
        .await;
    assert_eq!(modified.status, StatusCode::OK);
    assert_eq!(modified.body["description"], "the baseline");
    assert_eq!(modified.body["artifact"]["id"], first);

    let missing = app.get(&format!("{}/versions/3", url), &alice).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let bad_artifact = app
        .post(&format!("{}/versions", url), &alice, json!({"artifactId": 999}))
        .await;
    assert_eq!(bad_artifact.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_rename_keeps_versions() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let lab = app.group(&alice, "lab").await;
    let weights = artifact(&app, &alice, lab, "s3://bucket/w.pt").await;
    let model = app.named(&alice, "/api/v1/models", lab, "resnet").await;
    let url = format!("/api/v1/models/{}", model);

    app.post(&format!("{}/versions", url), &alice, json!({"artifactId": weights}))
        .await;
    let renamed = app
        .put(&url, &alice, json!({"name": "resnet50", "description": "50 layers"}))
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["name"], "resnet50");
    assert_eq!(renamed.body["lastVersion"]["versionNumber"], 1);

    let deleted = app.delete(&url, &alice).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(app.get(&url, &alice).await.status, StatusCode::NOT_FOUND);
}
