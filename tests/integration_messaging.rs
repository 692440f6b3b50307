#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, missing_debug_implementations, unreachable_pub)]
mod common;

use common::{TestApp, id_of};
use serde_json::{Value, json};
use uuid::Uuid;

fn ids(page: &Value) -> Vec<Uuid> {
    page.as_array().unwrap().iter().map(id_of).collect()
}

#[tokio::test]
async fn test_direct_conversation_pointer_follows_send_and_delete() {
    let app = TestApp::spawn().await;
    let bob = app.create_advisor("bob").await;
    let alice = app.create_user_with_roles("alice", false, false, Some(bob.id)).await;

    let hi = app.send_direct(&alice, bob.id, "hi").await;
    assert_eq!(hi["message"], "hi");
    assert_eq!(app.conversation_pointer(alice.id, bob.id).await, Some(id_of(&hi)));

    let resp = app.react(&bob, id_of(&hi), "👍").await;
    assert_eq!(resp.status(), 200);

    let (status, page) = app.get_json(&alice, &format!("/conversations/users/{}/messages", bob.id)).await;
    assert_eq!(status, 200);
    assert_eq!(page[0]["reactions"], json!({ "👍": [{ "id": bob.id, "name": bob.name }] }));

    let resp = app.delete_message(&alice, id_of(&hi)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], Value::Null);
    assert_eq!(app.conversation_pointer(alice.id, bob.id).await, None);

    let hello = app.send_direct(&alice, bob.id, "hello").await;
    assert_eq!(app.conversation_pointer(alice.id, bob.id).await, Some(id_of(&hello)));
}

#[tokio::test]
async fn test_deleting_group_last_message_recomputes_pointer() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("owner").await;
    let member = app.create_user("member").await;
    let group = app.create_group(&owner, "study group", &[&member]).await;

    let m1 = app.send_group(&owner, group, "first").await;
    let m2 = app.send_group(&member, group, "second").await;
    assert_eq!(app.group_pointer(group).await, Some(id_of(&m2)));

    let resp = app.delete_message(&member, id_of(&m2)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(id_of(&body["message"]), id_of(&m1));
    assert_eq!(app.group_pointer(group).await, Some(id_of(&m1)));

    // Deleting an older message leaves the pointer alone.
    let m3 = app.send_group(&member, group, "third").await;
    app.delete_message(&owner, id_of(&m1)).await;
    assert_eq!(app.group_pointer(group).await, Some(id_of(&m3)));
}

#[tokio::test]
async fn test_concurrent_send_survives_recompute() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("owner").await;
    let member = app.create_user("member").await;
    let group = app.create_group(&owner, "racy", &[&member]).await;

    for round in 0..20 {
        let last = id_of(&app.send_group(&owner, group, &format!("to delete {round}")).await);

        let text = format!("concurrent {round}");
        let (sent, deleted) = tokio::join!(app.send_group(&member, group, &text), app.delete_message(&owner, last));
        assert_eq!(deleted.status(), 200);

        let newest: Uuid = sqlx::query_scalar(
            "SELECT id FROM messages WHERE group_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(group)
        .fetch_one(&app.pool)
        .await
        .unwrap();
        assert_eq!(newest, id_of(&sent), "round {round}");
        assert_eq!(app.group_pointer(group).await, Some(newest), "round {round}");
    }
}

#[tokio::test]
async fn test_only_sender_may_delete() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;

    let hi = app.send_direct(&alice, bob.id, "hi").await;

    let resp = app.delete_message(&bob, id_of(&hi)).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(app.conversation_pointer(alice.id, bob.id).await, Some(id_of(&hi)));

    let resp = app.delete_message(&alice, Uuid::now_v7()).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_load_older_is_strict_and_scoped() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("owner").await;
    let group = app.create_group(&owner, "pages", &[]).await;
    let other_group = app.create_group(&owner, "elsewhere", &[]).await;

    let mut sent = Vec::new();
    for i in 0..4 {
        sent.push(id_of(&app.send_group(&owner, group, &format!("m{i}")).await));
        app.send_group(&owner, other_group, &format!("noise{i}")).await;
    }

    let (status, page) = app.get_json(&owner, &format!("/messages/{}/older", sent[2])).await;
    assert_eq!(status, 200);
    assert_eq!(ids(&page), [sent[1], sent[0]]);

    let (_, page) = app.get_json(&owner, &format!("/messages/{}/older", sent[0])).await;
    assert!(ids(&page).is_empty());

    let (_, latest) = app.get_json(&owner, &format!("/conversations/groups/{group}/messages")).await;
    assert_eq!(ids(&latest), [sent[3], sent[2], sent[1], sent[0]]);
}

#[tokio::test]
async fn test_load_older_requires_visibility() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let eve = app.create_user("eve").await;

    let hi = app.send_direct(&alice, bob.id, "hi").await;

    let (status, _) = app.get_json(&eve, &format!("/messages/{}/older", id_of(&hi))).await;
    assert_eq!(status, 403);
    let (status, _) = app.get_json(&bob, &format!("/messages/{}/older", id_of(&hi))).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_send_validation() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let owner = app.create_user("owner").await;
    let group = app.create_group(&owner, "closed", &[]).await;

    let post = |body: Value| {
        app.client.post(format!("{}/messages", app.server_url)).bearer_auth(&alice.token).json(&body).send()
    };

    let resp = post(json!({ "receiverId": bob.id, "groupId": group, "message": "both" })).await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = post(json!({ "receiverId": bob.id, "message": "   " })).await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = post(json!({ "receiverId": alice.id, "message": "me" })).await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = post(json!({ "groupId": group, "message": "let me in" })).await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = post(json!({ "groupId": Uuid::now_v7(), "message": "nobody home" })).await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app.client.post(format!("{}/messages", app.server_url)).json(&json!({ "receiverId": bob.id })).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_send_with_attachments_and_reply() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let hi = app.send_direct(&alice, bob.id, "hi").await;

    let resp = app
        .client
        .post(format!("{}/messages", app.server_url))
        .bearer_auth(&bob.token)
        .json(&json!({
            "receiverId": alice.id,
            "replyToId": id_of(&hi),
            "attachments": [{ "name": "notes.pdf", "mime": "application/pdf", "size": 2048, "path": "attachments/notes.pdf" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["replyToId"], json!(id_of(&hi)));
    assert_eq!(body["message"], Value::Null);
    assert_eq!(body["attachments"][0]["name"], "notes.pdf");
    assert_eq!(body["attachments"][0]["messageId"], body["id"]);
}

#[tokio::test]
async fn test_latest_direct_page_requires_role() {
    let app = TestApp::spawn().await;
    let advisor = app.create_advisor("advisor").await;
    let student = app.create_user_with_roles("student", false, false, Some(advisor.id)).await;
    let classmate = app.create_user("classmate").await;

    app.send_direct(&student, advisor.id, "question").await;

    let (status, page) = app.get_json(&student, &format!("/conversations/users/{}/messages", advisor.id)).await;
    assert_eq!(status, 200);
    assert_eq!(page.as_array().unwrap().len(), 1);

    let (status, _) = app.get_json(&student, &format!("/conversations/users/{}/messages", classmate.id)).await;
    assert_eq!(status, 403);

    let (status, _) = app.get_json(&advisor, &format!("/conversations/users/{}/messages", classmate.id)).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_conversation_list_orders_by_activity() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let group = app.create_group(&alice, "book club", &[&bob]).await;
    let quiet = app.create_group(&alice, "quiet", &[]).await;

    app.send_direct(&bob, alice.id, "older").await;
    app.send_group(&bob, group, "newer").await;

    let (status, list) = app.get_json(&alice, "/conversations").await;
    assert_eq!(status, 200);
    let list = list.as_array().unwrap();

    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["kind"], "group");
    assert_eq!(id_of(&list[0]), group);
    assert_eq!(list[0]["lastMessage"], "newer");
    assert_eq!(list[1]["kind"], "user");
    assert_eq!(id_of(&list[1]), bob.id);
    assert_eq!(id_of(&list[2]), quiet);
    assert_eq!(list[2]["lastMessageDate"], Value::Null);
}

#[tokio::test]
async fn test_owner_deletes_group_with_its_messages() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("owner").await;
    let member = app.create_user("member").await;
    let group = app.create_group(&owner, "short lived", &[&member]).await;
    let said = app.send_group(&member, group, "soon gone").await;
    app.react(&owner, id_of(&said), "👋").await;

    assert_eq!(app.delete_group(&member, group).await.status(), 403);
    assert_eq!(app.delete_group(&owner, Uuid::now_v7()).await.status(), 404);

    assert_eq!(app.delete_group(&owner, group).await.status(), 204);
    assert_eq!(app.delete_group(&owner, group).await.status(), 404);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE group_id = $1")
        .bind(group)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    let (status, _) = app.get_json(&member, &format!("/conversations/groups/{group}/messages")).await;
    assert_eq!(status, 404);
    let (_, list) = app.get_json(&member, "/conversations").await;
    assert!(list.as_array().unwrap().iter().all(|entry| id_of(entry) != group));
}
