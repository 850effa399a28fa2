//! Groups, memberships and manager roles

mod common;

use axum::http::StatusCode;
use common::TestApp;
use dioptra_restapi::db::groups;
use serde_json::json;

async fn user_id(app: &TestApp, cookie: &str) -> i64 {
    app.get("/api/v1/users/current", cookie).await.body["id"]
        .as_i64()
        .unwrap()
}

#[tokio::test]
async fn test_create_group_makes_creator_owner() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;

    let created = app.post("/api/v1/groups", &alice, json!({"name": "lab"})).await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["name"], "lab");
    assert_eq!(created.body["members"][0]["user"]["username"], "alice");
    assert_eq!(created.body["members"][0]["shareWrite"], true);
    assert_eq!(created.body["managers"][0]["owner"], true);

    let duplicate = app.post("/api/v1/groups", &alice, json!({"name": "lab"})).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_shows_memberships_only() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    app.group(&alice, "alice-lab").await;
    app.group(&bob, "bob-lab").await;

    let listed = app.get("/api/v1/groups", &alice).await;
    let names: Vec<&str> = listed.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["public", "alice-lab"]);

    let search = app.get("/api/v1/groups?search=lab", &alice).await;
    assert_eq!(search.body["totalNumResults"], 1);
}

#[tokio::test]
async fn test_non_members_cannot_see_group() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let lab = app.group(&alice, "lab").await;

    let response = app.get(&format!("/api/v1/groups/{}", lab), &bob).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let missing = app.get("/api/v1/groups/999", &bob).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_member_management() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let bob_id = user_id(&app, &bob).await;
    let lab = app.group(&alice, "lab").await;
    let members = format!("/api/v1/groups/{}/members", lab);
    let bob_member = format!("{}/{}", members, bob_id);

    let added = app.post(&members, &alice, json!({"id": bob_id})).await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["read"], true);
    assert_eq!(added.body["write"], false);

    let again = app.post(&members, &alice, json!({"id": bob_id})).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    // Plain members cannot manage membership
    let by_bob = app.put(&bob_member, &bob, json!({"write": true})).await;
    assert_eq!(by_bob.status, StatusCode::FORBIDDEN);

    let modified = app.put(&bob_member, &alice, json!({"write": true})).await;
    assert_eq!(modified.status, StatusCode::OK);
    assert_eq!(modified.body["read"], true);
    assert_eq!(modified.body["write"], true);

    let fetched = app.get(&bob_member, &bob).await;
    assert_eq!(fetched.body["write"], true);

    let removed = app.delete(&bob_member, &alice).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body, json!({"status": "Success", "id": [bob_id]}));
    assert_eq!(app.get(&bob_member, &alice).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_member_with_explicit_permissions() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let bob_id = user_id(&app, &bob).await;
    let lab = app.group(&alice, "lab").await;

    let added = app
        .post(
            &format!("/api/v1/groups/{}/members/{}", lab, bob_id),
            &alice,
            json!({"write": true, "shareRead": true}),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["read"], true);
    assert_eq!(added.body["write"], true);
    assert_eq!(added.body["shareRead"], true);
    assert_eq!(added.body["shareWrite"], false);
}

#[tokio::test]
async fn test_managers_and_last_owner() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let alice_id = user_id(&app, &alice).await;
    let bob = app.user("bob").await;
    let bob_id = user_id(&app, &bob).await;
    let lab = app.group(&alice, "lab").await;
    let managers = format!("/api/v1/groups/{}/managers", lab);

    let added = app.post(&managers, &alice, json!({"id": bob_id})).await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.body["owner"], false);
    assert_eq!(added.body["admin"], true);

    // New managers become full members
    let member = app
        .get(&format!("/api/v1/groups/{}/members/{}", lab, bob_id), &bob)
        .await;
    assert_eq!(member.status, StatusCode::OK);
    assert_eq!(member.body["write"], true);

    // Managers have to lose the role before they can leave
    let remove_member = app
        .delete(&format!("/api/v1/groups/{}/members/{}", lab, bob_id), &alice)
        .await;
    assert_eq!(remove_member.status, StatusCode::BAD_REQUEST);

    // Admins are not owners
    let by_admin = app
        .delete(&format!("{}/{}", managers, alice_id), &bob)
        .await;
    assert_eq!(by_admin.status, StatusCode::FORBIDDEN);

    let demote_last = app
        .put(&format!("{}/{}", managers, alice_id), &alice, json!({"owner": false}))
        .await;
    assert_eq!(demote_last.status, StatusCode::BAD_REQUEST);
    let remove_last = app.delete(&format!("{}/{}", managers, alice_id), &alice).await;
    assert_eq!(remove_last.status, StatusCode::BAD_REQUEST);

    // With a second owner the first may step down
    let promoted = app
        .put(&format!("{}/{}", managers, bob_id), &alice, json!({"owner": true}))
        .await;
    assert_eq!(promoted.body["owner"], true);
    let stepped_down = app.delete(&format!("{}/{}", managers, alice_id), &alice).await;
    assert_eq!(stepped_down.status, StatusCode::OK);

    let listed = app.get(&managers, &bob).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);
    assert_eq!(listed.body[0]["user"]["username"], "bob");
}

#[tokio::test]
async fn test_concurrent_demotions_keep_an_owner() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let alice_id = user_id(&app, &alice).await;
    let bob = app.user("bob").await;
    let bob_id = user_id(&app, &bob).await;
    let lab = app.group(&alice, "lab").await;
    let managers = format!("/api/v1/groups/{}/managers", lab);

    let added = app
        .post(&format!("{}/{}", managers, bob_id), &alice, json!({"owner": true}))
        .await;
    assert_eq!(added.status, StatusCode::OK, "{}", added.body);
    assert_eq!(groups::count_owners(&app.db, lab).await.unwrap(), 2);

    let alice_url = format!("{}/{}", managers, alice_id);
    let bob_url = format!("{}/{}", managers, bob_id);
    let (bob_demoted, alice_demoted) = tokio::join!(
        app.put(&bob_url, &alice, json!({"owner": false})),
        app.put(&alice_url, &bob, json!({"owner": false})),
    );

    // Whichever lands second is refused: either its caller is no longer an
    // owner, or the target is the last one
    let statuses = [bob_demoted.status, alice_demoted.status];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "{:?}",
        statuses
    );
    assert_eq!(groups::count_owners(&app.db, lab).await.unwrap(), 1);

    // The remaining owner cannot be removed either
    let (owner_url, owner_cookie) = if bob_demoted.status == StatusCode::OK {
        (&alice_url, &alice)
    } else {
        (&bob_url, &bob)
    };
    let removed = app.delete(owner_url, owner_cookie).await;
    assert_eq!(removed.status, StatusCode::BAD_REQUEST);
    assert_eq!(groups::count_owners(&app.db, lab).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rename_and_delete_group() {
    let app = TestApp::new().await;
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let bob_id = user_id(&app, &bob).await;
    let lab = app.group(&alice, "lab").await;
    let url = format!("/api/v1/groups/{}", lab);

    app.post(&format!("{}/managers", url), &alice, json!({"id": bob_id}))
        .await;

    let renamed = app.put(&url, &bob, json!({"name": "laboratory"})).await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["name"], "laboratory");

    // Only owners delete
    assert_eq!(app.delete(&url, &bob).await.status, StatusCode::FORBIDDEN);

    let deleted = app.delete(&url, &alice).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["id"], json!([lab]));
    assert_eq!(app.get(&url, &alice).await.status, StatusCode::NOT_FOUND);
}
