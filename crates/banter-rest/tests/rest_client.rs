//! REST client behavior against a mock API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use banter_model::MessageSend;
use banter_ratelimit::RateLimiter;
use banter_rest::{RestClient, RestError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> RestClient {
    RestClient::with_base_url("test_token", Arc::new(RateLimiter::new()), &server.uri()).unwrap()
}

#[tokio::test]
async fn sends_bot_authorization_and_user_agent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .and(header("Authorization", "Bot test_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "123",
            "username": "banter-bot",
            "bot": true
        })))
        .mount(&server)
        .await;

    let user = client_for(&server).current_user().await.unwrap();
    assert_eq!(user.id, "123");
    assert!(user.bot);
}

#[tokio::test]
async fn bot_prefix_is_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .and(header("Authorization", "Bot raw_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1", "username": "b", "bot": true
        })))
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(
        "Bot raw_token",
        Arc::new(RateLimiter::new()),
        &server.uri(),
    )
    .unwrap();
    assert!(client.current_user().await.is_ok());
}

#[tokio::test]
async fn rate_limit_retry_sleeps_and_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/42/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "bucket": "abc",
            "message": "You are being rate limited.",
            "retry_after": 0.35
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/channels/42/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "9", "channel_id": "42", "content": "hello"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let events = Arc::new(AtomicU32::new(0));
    {
        let events = Arc::clone(&events);
        client.set_rate_limit_hook(Arc::new(move |event| {
            assert_eq!(event.response.bucket, "abc");
            assert!((event.response.retry_after - 0.35).abs() < f64::EPSILON);
            events.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let start = Instant::now();
    let message = client
        .channel_message_send(
            "42",
            &MessageSend {
                content: Some("hello".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(message.id, "9");
    assert!(start.elapsed() >= Duration::from_millis(340));
    assert_eq!(events.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_without_retries_surfaces_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "bucket": "u",
            "message": "slow down",
            "retry_after": 3.0
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_on_rate_limit(false);
    let err = client.current_user().await.unwrap_err();
    assert!(matches!(err, RestError::RateLimited { retry_after, .. } if retry_after == 3.0));
}

#[tokio::test]
async fn api_error_envelope_is_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": 10003,
            "message": "Unknown Channel"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).channel("404").await.unwrap_err();
    match err {
        RestError::Api {
            status,
            api_code,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(api_code, 10003);
            assert_eq!(message, "Unknown Channel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1", "username": "b", "bot": true
        })))
        .mount(&server)
        .await;

    assert!(client_for(&server).current_user().await.is_ok());
}

#[tokio::test]
async fn bucketed_concurrency_paces_second_call() {
    let server = MockServer::start().await;

    // First response exhausts the bucket for one second.
    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset-after", "1.000")
                .set_body_json(serde_json::json!({
                    "id": "1", "channel_id": "7", "content": "a"
                })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "2", "channel_id": "7", "content": "b"
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    let start = Instant::now();

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .channel_message_send(
                    "7",
                    &MessageSend {
                        content: Some("a".into()),
                        ..Default::default()
                    },
                )
                .await
        })
    };
    let second = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .channel_message_send(
                    "7",
                    &MessageSend {
                        content: Some("b".into()),
                        ..Default::default()
                    },
                )
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // The second call had to wait out the one second window.
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn multipart_upload_sends_payload_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/5/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1", "channel_id": "5", "content": "with file"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let message = client_for(&server)
        .channel_message_send(
            "5",
            &MessageSend {
                content: Some("with file".into()),
                files: vec![banter_model::File {
                    name: "notes.txt".into(),
                    content_type: "text/plain".into(),
                    data: b"hello".to_vec(),
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(message.content, "with file");

    // The recorded request must be multipart with both parts present.
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("payload_json"));
    assert!(body.contains("files[0]"));
    assert!(body.contains("notes.txt"));
}
