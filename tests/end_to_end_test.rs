//! End-to-end session test against an in-process server that speaks the
//! polling bootstrap, the probe/upgrade sequence, and the event layer.
//!
//! Covers the full path: socketconfig lookup → handshake → joinChannel
//! (no password-required response) → login ack → receive/dispatch in
//! handler order → a permission-gated action failing locally without
//! touching the wire.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use cytube_client::{Bot, Config, CytubeError};

/// Serve the polling bootstrap and socketconfig lookup over raw HTTP.
async fn handle_http(mut stream: TcpStream, head: &str, base: &str) {
    // Drain the request head before responding.
    let mut buf = vec![0u8; 4096];
    let mut request = Vec::new();
    loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let body = if head.contains("/socketconfig/") {
        format!("{{\"servers\":[{{\"url\":\"{base}\",\"secure\":false}}]}}")
    } else {
        "96:0{\"sid\":\"testsid\",\"pingInterval\":25000,\"pingTimeout\":5000}".to_string()
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// How the scripted server answers login requests.
#[derive(Clone, Copy)]
enum ServerMode {
    /// Accept the first login and push a chat message.
    Accept,
    /// Rate-limit the first login, reject the second outright.
    RateLimitThenReject,
}

/// Accept the WebSocket upgrade and play the server side of the session.
async fn handle_websocket(
    stream: TcpStream,
    frames_tx: mpsc::UnboundedSender<String>,
    mode: ServerMode,
) {
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket accept");
    let mut logins = 0u32;
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let text = text.to_string();
        if text == "2probe" {
            ws.send(Message::Text("3probe".into())).await.expect("send");
        } else if text == "5" {
            ws.send(Message::Text("40".into())).await.expect("send");
        } else if let Some(suffix) = text.strip_prefix('2') {
            ws.send(Message::Text(format!("3{suffix}")))
                .await
                .expect("send");
        } else if let Some(payload) = text.strip_prefix("42") {
            let parsed: Value = serde_json::from_str(payload).expect("event json");
            let event = parsed[0].as_str().unwrap_or_default().to_string();
            frames_tx.send(text.clone()).expect("record frame");
            match event.as_str() {
                "joinChannel" => {
                    // No needPassword response: the join is accepted.
                    ws.send(Message::Text(
                        "42[\"setPermissions\",{\"chat\":3.0}]".into(),
                    ))
                    .await
                    .expect("send");
                    ws.send(Message::Text("42[\"rank\",0]".into()))
                        .await
                        .expect("send");
                }
                "login" => {
                    logins += 1;
                    let ack = match (mode, logins) {
                        (ServerMode::Accept, _) => {
                            "42[\"login\",{\"success\":true}]".to_string()
                        }
                        (ServerMode::RateLimitThenReject, 1) => {
                            "42[\"login\",{\"success\":false,\"error\":\"guest logins are limited. try again in 0 seconds.\"}]".to_string()
                        }
                        (ServerMode::RateLimitThenReject, _) => {
                            "42[\"login\",{\"success\":false,\"error\":\"invalid password\"}]".to_string()
                        }
                    };
                    ws.send(Message::Text(ack)).await.expect("send");
                    if matches!(mode, ServerMode::Accept) {
                        ws.send(Message::Text(
                            "42[\"chatMsg\",{\"username\":\"alice\",\"msg\":\"hi\"}]".into(),
                        ))
                        .await
                        .expect("send");
                    }
                }
                _ => {}
            }
        }
    }
}

/// Bind a listener and route connections by transport query parameter.
async fn start_server(mode: ServerMode) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let base = format!("http://{addr}");
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let server_base = base.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let frames_tx = frames_tx.clone();
            let base = server_base.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 2048];
                let Ok(n) = stream.peek(&mut buf).await else {
                    return;
                };
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                if head.contains("transport=websocket") {
                    handle_websocket(stream, frames_tx, mode).await;
                } else {
                    handle_http(stream, &head, &base).await;
                }
            });
        }
    });

    (base, frames_rx)
}

fn test_config(base: &str) -> Config {
    Config {
        domain: base.to_string(),
        channel: "testchan".into(),
        channel_password: None,
        user: Some("testbot".into()),
        user_password: None,
        retry: 0,
        retry_delay: 0.1,
        response_timeout: 0.2,
        restart_delay: None,
        proxy: None,
        log_level: "info".into(),
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

#[tokio::test]
async fn test_guest_rate_limit_retries_once_then_raises() {
    let (base, mut frames_rx) = start_server(ServerMode::RateLimitThenReject).await;
    let bot = Bot::new(&test_config(&base)).expect("bot");

    let started = std::time::Instant::now();
    let err = bot.login().await.expect_err("second rejection raises");
    let elapsed = started.elapsed();

    assert!(matches!(&err, CytubeError::Login(msg) if msg == "invalid password"));
    // The rate-limit sleep is floored at one second.
    assert!(elapsed >= Duration::from_secs(1), "slept only {elapsed:?}");

    let mut sent = Vec::new();
    while let Ok(frame) = frames_rx.try_recv() {
        sent.push(frame);
    }
    let login_attempts = sent.iter().filter(|f| f.contains("\"login\"")).count();
    assert_eq!(login_attempts, 2, "expected one retry, frames: {sent:?}");

    bot.disconnect().await;
}

#[tokio::test]
async fn test_join_login_dispatch_order_and_permission_gate() {
    let (base, mut frames_rx) = start_server(ServerMode::Accept).await;
    let bot = Bot::new(&test_config(&base)).expect("bot");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<String>();

    // First handler records the event; the second attempts a chat that must
    // fail the local permission check (chat requires rank 3, the bot has 0).
    {
        let events_tx = events_tx.clone();
        bot.on("chatMsg", "record", move |_, data| {
            let events_tx = events_tx.clone();
            Box::pin(async move {
                let from = data["username"].as_str().unwrap_or_default().to_string();
                events_tx.send(format!("chatMsg:{from}")).expect("send");
                Ok(false)
            })
        });
    }
    {
        let events_tx = events_tx.clone();
        let handle = bot.clone();
        bot.on("chatMsg", "reply", move |_, _| {
            let events_tx = events_tx.clone();
            let bot = handle.clone();
            Box::pin(async move {
                match bot.chat("hello", None).await {
                    Err(CytubeError::Permission(_)) => {
                        events_tx.send("chat-denied".into()).expect("send");
                    }
                    other => {
                        events_tx.send(format!("unexpected:{other:?}")).expect("send");
                    }
                }
                Ok(false)
            })
        });
    }

    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    // Handlers fire in registration order.
    assert_eq!(next_event(&mut events_rx).await, "chatMsg:alice");
    assert_eq!(next_event(&mut events_rx).await, "chat-denied");

    // The server saw the join and login requests, and the denied chat
    // never reached the wire.
    let mut sent = Vec::new();
    while let Ok(frame) = frames_rx.try_recv() {
        sent.push(frame);
    }
    assert!(sent.iter().any(|f| f.contains("\"joinChannel\"")));
    assert!(sent.iter().any(|f| f.contains("\"login\"")));
    assert!(!sent.iter().any(|f| f.contains("\"chatMsg\"")));

    // State mirrored from the inbound stream.
    {
        let channel = bot.channel();
        let channel = channel.lock().await;
        assert_eq!(channel.permissions.get("chat"), Some(&3.0));
    }

    bot.shutdown();
    let result = runner.await.expect("runner join");
    assert!(result.is_ok(), "run exited with {result:?}");
}
