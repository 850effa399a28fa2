//! Legacy task plugin package uploads

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{TestApp, TestResponse};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::io::Write;

const BOUNDARY: &str = "dioptra-test-boundary";

fn archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

fn form(name: &str, collection: &str, archive: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [("task_plugin_name", name), ("collection", collection)] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, field, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"task_plugin_file\"; filename=\"{}.tar\"\r\nContent-Type: application/x-tar\r\n\r\n",
            BOUNDARY, name
        )
        .as_bytes(),
    );
    body.extend_from_slice(archive);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &TestApp, name: &str, collection: &str, archive: &[u8]) -> TestResponse {
    app.send(
        Request::builder()
            .method(Method::POST)
            .uri("/api/taskPlugin")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form(name, collection, archive)))
            .unwrap(),
    )
    .await
}

async fn get(app: &TestApp, uri: &str) -> TestResponse {
    app.call(Method::GET, uri, None, None).await
}

fn package() -> Vec<u8> {
    archive(&[
        ("plugin/__init__.py", ""),
        ("plugin/tasks.py", "def run():\n    pass\n"),
        ("plugin/README.md", "docs"),
    ])
}

#[tokio::test]
async fn test_register_and_fetch() {
    let app = TestApp::new().await;

    let builtin = upload(&app, "builtin_plugin", "dioptra_builtins", &package()).await;
    assert_eq!(builtin.status, StatusCode::OK, "{}", builtin.body);
    assert_eq!(
        builtin.body,
        json!({
            "taskPluginName": "builtin_plugin",
            "collection": "dioptra_builtins",
            "modules": ["plugin/__init__.py", "plugin/tasks.py"],
        })
    );
    let custom = upload(&app, "custom_plugin", "dioptra_custom", &package()).await;
    assert_eq!(custom.status, StatusCode::OK);

    let fetched = get(&app, "/api/taskPlugin/dioptra_builtins/builtin_plugin").await;
    assert_eq!(fetched.body, builtin.body);
    let fetched = get(&app, "/api/taskPlugin/dioptra_custom/custom_plugin").await;
    assert_eq!(fetched.body, custom.body);

    let builtins = get(&app, "/api/taskPlugin/dioptra_builtins").await;
    assert_eq!(builtins.body, json!([builtin.body]));
    let customs = get(&app, "/api/taskPlugin/dioptra_custom").await;
    assert_eq!(customs.body, json!([custom.body]));
    let all = get(&app, "/api/taskPlugin").await;
    assert_eq!(all.body, json!([builtin.body, custom.body]));
}

#[tokio::test]
async fn test_gzipped_package_registered() {
    let app = TestApp::new().await;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&package()).unwrap();
    let gzipped = encoder.finish().unwrap();

    let uploaded = upload(&app, "zipped_plugin", "dioptra_builtins", &gzipped).await;
    assert_eq!(uploaded.status, StatusCode::OK, "{}", uploaded.body);
    assert_eq!(
        uploaded.body["modules"],
        json!(["plugin/__init__.py", "plugin/tasks.py"])
    );
}

#[tokio::test]
async fn test_existing_name_rejected() {
    let app = TestApp::new().await;
    upload(&app, "plugin", "dioptra_custom", &package()).await;

    let again = upload(&app, "plugin", "dioptra_custom", &package()).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);

    // The other collection has its own namespace
    let builtin = upload(&app, "plugin", "dioptra_builtins", &package()).await;
    assert_eq!(builtin.status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_uploads_rejected() {
    let app = TestApp::new().await;

    let bad_collection = upload(&app, "plugin", "elsewhere", &package()).await;
    assert_eq!(bad_collection.status, StatusCode::BAD_REQUEST);

    let bad_name = upload(&app, "not-an-identifier", "dioptra_custom", &package()).await;
    assert_eq!(bad_name.status, StatusCode::BAD_REQUEST);

    let no_modules = upload(&app, "plugin", "dioptra_custom", &archive(&[("a.txt", "x")])).await;
    assert_eq!(no_modules.status, StatusCode::BAD_REQUEST);

    assert_eq!(get(&app, "/api/taskPlugin").await.body, json!([]));
}

#[tokio::test]
async fn test_delete_custom_only() {
    let app = TestApp::new().await;
    upload(&app, "builtin_plugin", "dioptra_builtins", &package()).await;
    upload(&app, "custom_plugin", "dioptra_custom", &package()).await;

    let deleted = app
        .call(Method::DELETE, "/api/taskPlugin/dioptra_custom/custom_plugin", None, None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(
        get(&app, "/api/taskPlugin/dioptra_custom/custom_plugin").await.status,
        StatusCode::NOT_FOUND
    );

    let missing = app
        .call(Method::DELETE, "/api/taskPlugin/dioptra_custom/custom_plugin", None, None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let builtin = app
        .call(Method::DELETE, "/api/taskPlugin/dioptra_builtins/builtin_plugin", None, None)
        .await;
    assert_eq!(builtin.status, StatusCode::METHOD_NOT_ALLOWED);
}
