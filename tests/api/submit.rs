use std::time;

use chrono::Utc;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{valid_payload, InMemoryStore, TestApp};

#[tokio::test]
async fn submit_returns_a_200_and_stores_valid_data() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;

    let before = Utc::now();
    let response = app.post_submit(&valid_payload()).await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "Message saved successfully" }));

    let records = app.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Ada");
    assert_eq!(records[0].email, "ada@example.com");
    assert_eq!(records[0].message, "Hello");
    assert!(records[0].created_at >= before);
}

#[tokio::test]
async fn submit_ignores_client_supplied_timestamps() {
    let app = TestApp::spawn().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;

    let before = Utc::now();
    let response = app
        .post_submit(&serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "message": "Hello",
            "createdAt": "1999-01-01T00:00:00Z",
            "receivedAt": "1999-01-01T00:00:00Z",
        }))
        .await;

    assert_eq!(response.status(), 200);
    let records = app.store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].created_at >= before);
}

#[tokio::test]
async fn submit_sends_one_notification_for_valid_data() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_submit(&valid_payload()).await;
    assert_eq!(response.status(), 200);

    let requests = app.wait_for_email_requests(1).await;
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["Subject"], "New Contact Form Submission");
    assert_eq!(body["From"], "contact@example.com");
    assert_eq!(body["To"], "owner@example.com");
    assert!(body["TextBody"].as_str().unwrap().contains("ada@example.com"));
    assert!(body["HtmlBody"].as_str().unwrap().contains("Hello"));
}

#[tokio::test]
async fn submit_sends_one_notification_per_stored_submission() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&app.email_server)
        .await;

    // Duplicates are stored as distinct records
    for _ in 0..3 {
        let response = app.post_submit(&valid_payload()).await;
        assert_eq!(response.status(), 200);
    }

    assert_eq!(app.store.records().len(), 3);
    assert_eq!(app.wait_for_email_requests(3).await.len(), 3);
}

#[tokio::test]
async fn submit_escapes_user_input_in_the_html_notification() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;

    let response = app
        .post_submit(&serde_json::json!({
            "name": "<b>Ada</b>",
            "email": "ada@example.com",
            "message": "<script>alert('pwned')</script>\nFish & chips",
        }))
        .await;
    assert_eq!(response.status(), 200);

    let requests = app.wait_for_email_requests(1).await;
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let html = body["HtmlBody"].as_str().unwrap();
    assert!(!html.contains("<script>"));
    assert!(!html.contains("<b>Ada</b>"));
    assert!(!html.contains("Fish & chips"));
    assert!(html.contains("&lt;script&gt;"));
    assert!(html.contains("Fish &amp; chips"));

    // The stored record keeps the unescaped text
    assert_eq!(app.store.records()[0].name, "<b>Ada</b>");
}

#[tokio::test]
async fn submit_returns_a_400_when_data_is_missing() {
    let app = TestApp::spawn().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;
    let test_cases = vec![
        (
            serde_json::json!({ "email": "ada@example.com", "message": "Hello" }),
            "name is required",
        ),
        (
            serde_json::json!({ "name": "Ada", "message": "Hello" }),
            "email is required",
        ),
        (
            serde_json::json!({ "name": "Ada", "email": "ada@example.com" }),
            "message is required",
        ),
        (serde_json::json!({}), "name is required"),
    ];

    for (body, expected) in test_cases {
        let response = app.post_submit(&body).await;

        assert_eq!(
            response.status(),
            400,
            "The API did not fail with 400 Bad Request when the payload was {body}"
        );
        let error: serde_json::Value = response.json().await.unwrap();
        assert_eq!(error["error"], expected);
    }

    assert_eq!(app.store.attempts(), 0);
    app.assert_no_email_requests().await;
}

#[tokio::test]
async fn submit_returns_a_400_when_fields_are_present_but_invalid() {
    let app = TestApp::spawn().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;
    let test_cases = vec![
        (
            serde_json::json!({ "name": "", "email": "ada@example.com", "message": "Hello" }),
            "empty name",
        ),
        (
            serde_json::json!({ "name": "Ada", "email": "", "message": "Hello" }),
            "empty email",
        ),
        (
            serde_json::json!({ "name": "Ada", "email": "ada@example.com", "message": "  " }),
            "blank message",
        ),
        (
            serde_json::json!({ "name": "Ada", "email": "definitely-not-an-email", "message": "Hello" }),
            "invalid email",
        ),
        (
            serde_json::json!({ "name": "Ada", "email": "ada@localhost", "message": "Hello" }),
            "email without a dotted domain",
        ),
        (
            serde_json::json!({ "name": 42, "email": "ada@example.com", "message": "Hello" }),
            "non-string name",
        ),
    ];

    for (body, description) in test_cases {
        let response = app.post_submit(&body).await;

        assert_eq!(
            response.status(),
            400,
            "The API did not return a 400 Bad Request when the payload was {description}"
        );
        let error: serde_json::Value = response.json().await.unwrap();
        assert!(error["error"].is_string(), "No error reason for {description}");
    }

    assert_eq!(app.store.attempts(), 0);
    app.assert_no_email_requests().await;
}

#[tokio::test]
async fn submit_returns_a_400_for_malformed_json() {
    let app = TestApp::spawn().await;

    let response = app
        .post_submit_raw(r#"{"name": "Ada", "email": "#, "application/json")
        .await;

    assert_eq!(response.status(), 400);
    let error: serde_json::Value = response.json().await.unwrap();
    assert!(error["error"].is_string());
    assert_eq!(app.store.attempts(), 0);
}

#[tokio::test]
async fn submit_returns_a_400_for_oversized_bodies() {
    let app = TestApp::spawn_with(InMemoryStore::default(), |c| {
        c.application.max_body_bytes = 256;
    })
    .await;

    let response = app
        .post_submit(&serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "message": "x".repeat(1024),
        }))
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(app.store.attempts(), 0);
}

#[tokio::test]
async fn submit_accepts_json_sent_as_plain_text() {
    let app = TestApp::spawn().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;

    let response = app
        .post_submit_raw(
            r#"{"name": "Ada", "email": "ada@example.com", "message": "Hello"}"#,
            "text/plain",
        )
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(app.store.records().len(), 1);
}

#[tokio::test]
async fn submit_returns_a_500_when_the_store_misses_its_deadline() {
    let app = TestApp::spawn_with(InMemoryStore::slow(time::Duration::from_secs(3)), |c| {
        c.database.insert_timeout_millis = 200;
    })
    .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let started = time::Instant::now();
    let response = app.post_submit(&valid_payload()).await;

    assert!(started.elapsed() < time::Duration::from_secs(2));
    assert_eq!(response.status(), 500);
    let error: serde_json::Value = response.json().await.unwrap();
    assert_eq!(error, serde_json::json!({ "error": "Failed to save message" }));
    assert_eq!(app.store.attempts(), 1);
    assert!(app.store.records().is_empty());
    app.assert_no_email_requests().await;
}

#[tokio::test]
async fn submit_returns_a_500_when_the_store_is_unreachable() {
    let app = TestApp::spawn_with(InMemoryStore::unreachable(), |_| {}).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.post_submit(&valid_payload()).await;

    assert_eq!(response.status(), 500);
    let error: serde_json::Value = response.json().await.unwrap();
    assert_eq!(error, serde_json::json!({ "error": "Failed to save message" }));
    app.assert_no_email_requests().await;
}

#[tokio::test]
async fn submit_succeeds_even_if_the_email_api_fails() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_submit(&valid_payload()).await;

    assert_eq!(response.status(), 200);
    assert_eq!(app.store.records().len(), 1);

    // Exactly one attempt, no retry
    assert_eq!(app.wait_for_email_requests(1).await.len(), 1);
    tokio::time::sleep(time::Duration::from_millis(300)).await;
    assert_eq!(app.email_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn submit_does_not_wait_for_a_slow_email_api() {
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(time::Duration::from_secs(10)))
        .mount(&app.email_server)
        .await;

    let started = time::Instant::now();
    let response = app.post_submit(&valid_payload()).await;

    assert_eq!(response.status(), 200);
    assert!(
        started.elapsed() < time::Duration::from_secs(3),
        "The response waited {:?} for the notification",
        started.elapsed()
    );

    // The notification was still attempted in the background
    assert_eq!(app.wait_for_email_requests(1).await.len(), 1);
}

#[tokio::test]
async fn submit_succeeds_when_the_mail_transport_is_misconfigured() {
    let app = TestApp::spawn_with(InMemoryStore::default(), |c| {
        c.email_client.authorization_token = None;
    })
    .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let response = app.post_submit(&valid_payload()).await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "Message saved successfully");
    assert_eq!(app.store.records().len(), 1);
    app.assert_no_email_requests().await;
}

#[tokio::test]
async fn submit_does_not_reflect_an_invalid_email_back() {
    let app = TestApp::spawn().await;
    let email = format!("<img src=x>{}", "a".repeat(2000));

    let response = app
        .post_submit(&serde_json::json!({
            "name": "Ada",
            "email": email,
            "message": "Hello",
        }))
        .await;

    assert_eq!(response.status(), 400);
    let error: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        error,
        serde_json::json!({ "error": "email is not a valid email address" })
    );
    assert_eq!(app.store.attempts(), 0);
}
