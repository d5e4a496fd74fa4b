//! Gateway lifecycle against an in-process WebSocket server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use banter::{Connect, Event, Session, SessionConfig};

type ServerWs = WebSocketStream<TcpStream>;

async fn gateway_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept_ws(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut ServerWs) -> serde_json::Value {
    loop {
        match timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the stream")
            .expect("websocket error")
        {
            Message::Text(text) => return serde_json::from_str(text.as_ref()).unwrap(),
            Message::Close(_) => panic!("client closed during handshake"),
            _ => {}
        }
    }
}

async fn send_json(ws: &mut ServerWs, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

fn test_session(gateway_url: &str) -> Session {
    let mut config = SessionConfig::new("test-token");
    config.gateway_url = Some(gateway_url.to_owned());
    config.sync_events = true;
    Session::with_config(config).unwrap()
}

#[tokio::test]
async fn hello_identify_ready_and_heartbeats() {
    let (listener, url) = gateway_listener().await;
    let session = test_session(&url);

    let connects = Arc::new(AtomicU32::new(0));
    {
        let connects = Arc::clone(&connects);
        session.add_handler(move |_s: Session, _c: Connect| {
            let connects = Arc::clone(&connects);
            async move {
                connects.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;

        send_json(&mut ws, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 150}})).await;

        // The fresh session must identify, not resume.
        let identify = next_json(&mut ws).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "test-token");
        assert_eq!(identify["d"]["compress"], true);
        assert_eq!(identify["d"]["large_threshold"], 250);
        assert!(identify["d"]["shard"].is_null());
        assert!(identify["d"]["properties"]["$browser"]
            .as_str()
            .unwrap()
            .contains("banter"));

        send_json(
            &mut ws,
            serde_json::json!({
                "op": 0,
                "s": 1,
                "t": "READY",
                "d": {
                    "v": 10,
                    "session_id": "sess-1",
                    "user": {"id": "bot-user", "username": "banter-bot"}
                }
            }),
        )
        .await;

        // Heartbeats arrive on the hello interval, carrying the sequence.
        let mut heartbeats = 0;
        while heartbeats < 2 {
            let frame = next_json(&mut ws).await;
            if frame["op"] == 1 {
                assert_eq!(frame["d"], 1);
                heartbeats += 1;
                // Ack so the connection is not declared dead.
                send_json(&mut ws, serde_json::json!({"op": 11})).await;
            }
        }
    });

    session.open().await.unwrap();

    // Connect fired during open, and the session state is seeded.
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(session.state().user().id, "bot-user");
    assert_eq!(session.state().session_id(), "sess-1");
    assert_eq!(session.sequence(), 1);

    // A second open on a live session must fail.
    assert!(matches!(
        session.open().await,
        Err(banter::Error::WsAlreadyOpen)
    ));

    server.await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn resume_after_transport_drop_replays_sequence() {
    let (listener, url) = gateway_listener().await;
    let session = test_session(&url);

    let server = tokio::spawn(async move {
        // First connection: identify, READY, one dispatch, then drop.
        let mut ws = accept_ws(&listener).await;
        send_json(&mut ws, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 60000}})).await;

        let identify = next_json(&mut ws).await;
        assert_eq!(identify["op"], 2);

        send_json(
            &mut ws,
            serde_json::json!({
                "op": 0,
                "s": 1,
                "t": "READY",
                "d": {"v": 10, "session_id": "s1", "user": {"id": "bot", "username": "b"}}
            }),
        )
        .await;
        send_json(
            &mut ws,
            serde_json::json!({
                "op": 0,
                "s": 42,
                "t": "TYPING_START",
                "d": {"user_id": "u", "channel_id": "c"}
            }),
        )
        .await;

        // Give the client a moment to store the sequence, then die.
        sleep(Duration::from_millis(200)).await;
        drop(ws);

        // Second connection: the client must resume with the stored
        // session and sequence.
        let mut ws = accept_ws(&listener).await;
        send_json(&mut ws, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 60000}})).await;

        let resume = next_json(&mut ws).await;
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["token"], "test-token");
        assert_eq!(resume["d"]["session_id"], "s1");
        assert_eq!(resume["d"]["seq"], 42);

        send_json(
            &mut ws,
            serde_json::json!({"op": 0, "s": 43, "t": "RESUMED", "d": {}}),
        )
        .await;
        for seq in [44u64, 45] {
            send_json(
                &mut ws,
                serde_json::json!({
                    "op": 0,
                    "s": seq,
                    "t": "TYPING_START",
                    "d": {"user_id": "u", "channel_id": "c"}
                }),
            )
            .await;
        }

        // Keep the socket alive until the client finishes asserting.
        sleep(Duration::from_secs(2)).await;
    });

    session.open().await.unwrap();

    // The replayed dispatches advance the stored sequence to 45.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while session.sequence() != 45 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "sequence stuck at {}",
            session.sequence()
        );
        sleep(Duration::from_millis(25)).await;
    }

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn missed_heartbeat_acks_trigger_reconnect() {
    let (listener, url) = gateway_listener().await;
    let session = test_session(&url);

    let server = tokio::spawn(async move {
        // First connection never acks heartbeats.
        let mut ws = accept_ws(&listener).await;
        send_json(&mut ws, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 100}})).await;
        let identify = next_json(&mut ws).await;
        assert_eq!(identify["op"], 2);
        send_json(
            &mut ws,
            serde_json::json!({
                "op": 0,
                "s": 1,
                "t": "READY",
                "d": {"v": 10, "session_id": "s1", "user": {"id": "bot", "username": "b"}}
            }),
        )
        .await;

        // Swallow heartbeats without acking until the client gives up.
        let reconnected = async {
            // The client declares the connection zombied after five
            // unacked intervals and dials again.
            let mut ws2 = accept_ws(&listener).await;
            send_json(&mut ws2, serde_json::json!({"op": 10, "d": {"heartbeat_interval": 60000}}))
                .await;
            let resume = next_json(&mut ws2).await;
            assert_eq!(resume["op"], 6);
            send_json(
                &mut ws2,
                serde_json::json!({"op": 0, "s": 2, "t": "RESUMED", "d": {}}),
            )
            .await;
            sleep(Duration::from_millis(300)).await;
        };
        // Swallow frames on the first connection (including its close)
        // while waiting for the second dial.
        let drain = async {
            while let Some(Ok(_)) = ws.next().await {}
            futures_util::future::pending::<()>().await;
        };

        tokio::select! {
            () = reconnected => {}
            () = drain => {}
        }
    });

    session.open().await.unwrap();

    timeout(Duration::from_secs(10), server)
        .await
        .expect("client never reconnected after missed acks")
        .unwrap();

    session.close().await;

    // The disconnect path emitted events rather than panicking.
    let _ = Event::decode("__DISCONNECT__", serde_json::Value::Null);
}
