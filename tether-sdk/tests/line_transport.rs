//! LineTransport against an in-process gateway.

use std::time::Duration;

use tether_sdk::client::LineTransport;
use tether_sdk::event::{self, Event, EventReceiver, SessionEvent, SessionId};
use tether_sdk::transport::{ConnectTarget, SessionHandle, Transport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn gateway() -> (TcpListener, ConnectTarget) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let target = ConnectTarget {
        host: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    };
    (listener, target)
}

async fn accept(listener: &TcpListener) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let (stream, _) = timeout(TIMEOUT, listener.accept()).await.unwrap().unwrap();
    let (r, w) = stream.into_split();
    (BufReader::new(r).lines(), w)
}

async fn read_json(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> serde_json::Value {
    let line = timeout(TIMEOUT, lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .expect("client closed the connection");
    serde_json::from_str(&line).unwrap()
}

async fn next_event(rx: &mut EventReceiver) -> SessionEvent {
    match timeout(TIMEOUT, rx.recv()).await.expect("timed out waiting for event") {
        Some(Event::Session { id, event }) => {
            assert_eq!(id, SessionId(7));
            event
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn login_spawn_chat_and_quit() {
    let (listener, target) = gateway().await;
    let (tx, mut rx) = event::channel();
    let session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    let (mut lines, mut w) = accept(&listener).await;
    let login = read_json(&mut lines).await;
    assert_eq!(login["op"], "login");
    assert_eq!(login["username"], "bot");
    assert_eq!(login["version"], "1.21.11");

    w.write_all(b"{\"event\":\"login\"}\n{\"event\":\"spawn\"}\n{\"event\":\"message\",\"text\":\"<alex> hi\"}\n")
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, SessionEvent::LoggedIn));
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Spawned));
    match next_event(&mut rx).await {
        SessionEvent::Message { text } => assert_eq!(text, "<alex> hi"),
        other => panic!("unexpected {other:?}"),
    }

    session.send("hello there");
    let chat = read_json(&mut lines).await;
    assert_eq!(chat, serde_json::json!({"op": "chat", "text": "hello there"}));

    session.quit();
    assert_eq!(read_json(&mut lines).await["op"], "quit");
    assert!(timeout(TIMEOUT, lines.next_line()).await.unwrap().unwrap().is_none());

    match next_event(&mut rx).await {
        SessionEvent::Ended { reason } => assert_eq!(reason, "quit"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn kick_then_close() {
    let (listener, target) = gateway().await;
    let (tx, mut rx) = event::channel();
    let _session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    let (mut lines, mut w) = accept(&listener).await;
    read_json(&mut lines).await;
    w.write_all(b"{\"event\":\"kick\",\"reason\":{\"text\":\"Server restarting\"}}\n")
        .await
        .unwrap();
    drop(w);
    drop(lines);

    match next_event(&mut rx).await {
        SessionEvent::Kicked { reason } => assert_eq!(reason["text"], "Server restarting"),
        other => panic!("unexpected {other:?}"),
    }
    match next_event(&mut rx).await {
        SessionEvent::Ended { reason } => assert_eq!(reason, "connection closed"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_and_unknown_lines_are_skipped() {
    let (listener, target) = gateway().await;
    let (tx, mut rx) = event::channel();
    let _session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    let (mut lines, mut w) = accept(&listener).await;
    read_json(&mut lines).await;
    w.write_all(b"not json\n\n{\"event\":\"keep_alive\",\"id\":1}\n{\"event\":\"spawn\"}\n")
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Spawned));
}

#[tokio::test]
async fn refused_connection_reports_error_then_end() {
    let (listener, target) = gateway().await;
    drop(listener);

    let (tx, mut rx) = event::channel();
    let _session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    match next_event(&mut rx).await {
        SessionEvent::Error { message } => assert!(message.contains("TCP connect"), "{message}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Ended { .. }));
}

#[tokio::test]
async fn force_end_drops_the_connection() {
    let (listener, target) = gateway().await;
    let (tx, mut rx) = event::channel();
    let session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    let (mut lines, _w) = accept(&listener).await;
    read_json(&mut lines).await;

    session.force_end("Simulated kick");
    match next_event(&mut rx).await {
        SessionEvent::Ended { reason } => assert_eq!(reason, "Simulated kick"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(timeout(TIMEOUT, lines.next_line()).await.unwrap().unwrap_or(None).is_none());
}

#[tokio::test]
async fn silent_server_times_out() {
    let (listener, mut target) = gateway().await;
    target.idle_timeout = Duration::from_millis(200);
    let (tx, mut rx) = event::channel();
    let _session = LineTransport::new().open(&target, SessionId(7), tx).unwrap();

    let (mut lines, _w) = accept(&listener).await;
    read_json(&mut lines).await;

    match next_event(&mut rx).await {
        SessionEvent::Error { message } => assert!(message.contains("no traffic"), "{message}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Ended { .. }));
}
