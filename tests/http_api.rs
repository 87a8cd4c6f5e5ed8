//! HTTP adapter tests against a server bound to an ephemeral port.

mod support;

use serde_json::{json, Value};
use support::{test_config, Harness};

async fn spawn_server(h: &Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = ragdesk::server::router(h.app.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_document_to_answer_over_http() {
    let h = Harness::new(test_config());
    let base = spawn_server(&h).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["generation"], 0);

    let added: Value = client
        .post(format!("{}/admin/documents", base))
        .json(&json!({ "topic": "cinema-x", "title": "hours", "text": "Open 10:00-22:00 daily." }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(added["rows"], 1);
    assert_eq!(added["rebuild"]["status"], "rebuilt");
    assert_eq!(added["rebuild"]["generation"], 1);

    let topics: Value = client
        .get(format!("{}/topics", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(topics["topics"], json!(["cinema-x"]));

    let rejected: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "user_id": 5, "text": "When do you open?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected["route"]["route"], "rejected");
    assert_eq!(rejected["route"]["detail"], "no_topic_selected");

    let selected: Value = client
        .post(format!("{}/topics/select", base))
        .json(&json!({ "user_id": 5, "topic": "cinema-x" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(selected["state"], "active");
    assert_eq!(selected["topic"], "cinema-x");

    let answered: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "user_id": 5, "text": "When do you open?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answered["route"]["route"], "answer");
    assert!(answered["reply"].as_str().unwrap().contains("10:00-22:00"));

    let photo: Value = client
        .post(format!("{}/messages", base))
        .json(&json!({ "user_id": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(photo["route"]["detail"], "unsupported_message");

    let stats: Value = client
        .get(format!("{}/admin/index", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["generation"], 1);
    assert_eq!(stats["topics"][0]["topic"], "cinema-x");
}

#[tokio::test]
async fn test_admin_errors_use_error_body() {
    let h = Harness::new(test_config());
    let base = spawn_server(&h).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/admin/documents", base))
        .json(&json!({ "topic": "  ", "text": "something" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let response = client
        .post(format!("{}/admin/rebuild", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["generation"], 1);

    let deleted: Value = client
        .delete(format!("{}/admin/topics/unknown", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["rows"], 0);
}
