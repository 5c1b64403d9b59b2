use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use onlinex_client::chat::{
    CloseReason, ConnectionManager, ConnectionStatus, ConnectionTarget, ConnectorError, Role,
    SessionEvent, SessionHandlers,
};
use onlinex_client::session::SessionCredential;
use onlinex_client::transport::websocket::{EndpointConfig, WebSocketDialer};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Clone)]
struct Backend {
    received: mpsc::UnboundedSender<String>,
}

async fn room_socket(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(backend): State<Backend>,
) -> Response {
    match params.get("token").map(String::as_str) {
        Some("forbidden") => StatusCode::FORBIDDEN.into_response(),
        _ => ws
            .on_upgrade(move |socket| serve_room(socket, code, params, backend))
            .into_response(),
    }
}

async fn serve_room(
    mut socket: WebSocket,
    code: String,
    params: HashMap<String, String>,
    backend: Backend,
) {
    let authorized = params.get("token").map(String::as_str) == Some("t1")
        && params.get("token_type").map(String::as_str) == Some("bearer");
    if !authorized {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: "unauthorized".into(),
            })))
            .await;
        return;
    }
    if code == "BYE" {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1000,
                reason: "".into(),
            })))
            .await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                let _ = backend.received.send(text);
                if socket.send(Message::Text("hi there".into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => {
                let _ = backend.received.send("<close>".into());
                break;
            }
            _ => {}
        }
    }
}

async fn assistant_socket(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    State(backend): State<Backend>,
) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        while let Some(Ok(Message::Text(text))) = socket.recv().await {
            let _ = backend.received.send(text.clone());
            let reply = format!("[{conversation_id}] you said: {text}");
            if socket.send(Message::Text(reply)).await.is_err() {
                break;
            }
        }
    })
}

async fn spawn_backend() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/ws/chat/:code", get(room_socket))
        .route("/ai/ws/chat/:conversation_id", get(assistant_socket))
        .with_state(Backend {
            received: received_tx,
        });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received_rx)
}

fn manager_for(addr: SocketAddr) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(WebSocketDialer::new()),
        EndpointConfig::new().api_base_url(format!("http://{addr}")),
    )
}

fn credential(token: &str) -> SessionCredential {
    SessionCredential::new(token, "bearer").unwrap()
}

async fn next_status(manager: &mut ConnectionManager) -> ConnectionStatus {
    loop {
        match manager.next_event().await {
            Some(SessionEvent::Status(status)) => return status,
            Some(_) => continue,
            None => panic!("connection ended without a status change"),
        }
    }
}

async fn next_message(manager: &mut ConnectionManager) -> String {
    loop {
        match manager.next_event().await {
            Some(SessionEvent::Message(entry)) => return entry.text,
            Some(_) => continue,
            None => panic!("connection ended before a message arrived"),
        }
    }
}

#[test_timeout::tokio_timeout_test(20)]
async fn room_chat_round_trip() {
    let (addr, mut received) = spawn_backend().await;
    let mut manager = manager_for(addr);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let handlers = SessionHandlers::new().on_status_change(move |status| sink.lock().push(*status));

    manager
        .connect(ConnectionTarget::room("ABC-123"), &credential("t1"), handlers)
        .unwrap();
    assert_eq!(next_status(&mut manager).await, ConnectionStatus::Open);

    manager.send("hello").unwrap();
    assert_eq!(received.recv().await.as_deref(), Some("hello"));
    assert_eq!(next_message(&mut manager).await, "hi there");

    let log: Vec<_> = manager
        .messages()
        .iter()
        .map(|entry| (entry.role, entry.text.as_str()))
        .collect();
    assert_eq!(log, vec![(Role::Local, "hello"), (Role::Remote, "hi there")]);
    assert_eq!(
        *statuses.lock(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Open]
    );

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Idle);
    assert_eq!(received.recv().await.as_deref(), Some("<close>"));
}

#[test_timeout::tokio_timeout_test(20)]
async fn assistant_conversation_uses_ai_path() {
    let (addr, mut received) = spawn_backend().await;
    let mut manager = manager_for(addr);
    manager
        .connect(
            ConnectionTarget::assistant("conv-9"),
            &credential("t1"),
            SessionHandlers::new(),
        )
        .unwrap();
    assert_eq!(next_status(&mut manager).await, ConnectionStatus::Open);

    manager.send("hola").unwrap();
    assert_eq!(received.recv().await.as_deref(), Some("hola"));
    assert_eq!(next_message(&mut manager).await, "[conv-9] you said: hola");
}

#[test_timeout::tokio_timeout_test(20)]
async fn policy_close_marks_session_unauthorized() {
    let (addr, _received) = spawn_backend().await;
    let mut manager = manager_for(addr);
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let handlers = SessionHandlers::new().on_unauthorized(move || *counter.lock() += 1);

    manager
        .connect(ConnectionTarget::room("ABC-123"), &credential("expired"), handlers)
        .unwrap();
    assert_eq!(next_status(&mut manager).await, ConnectionStatus::Open);
    assert_eq!(
        next_status(&mut manager).await,
        ConnectionStatus::Closed(CloseReason::Unauthorized)
    );
    assert!(manager.next_event().await.is_none());
    assert_eq!(*calls.lock(), 1);
    assert_eq!(manager.send("too late"), Err(ConnectorError::NotReady));
}

#[test_timeout::tokio_timeout_test(20)]
async fn rejected_upgrade_is_unauthorized() {
    let (addr, _received) = spawn_backend().await;
    let mut manager = manager_for(addr);
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let handlers = SessionHandlers::new().on_unauthorized(move || *counter.lock() += 1);

    manager
        .connect(ConnectionTarget::room("ABC-123"), &credential("forbidden"), handlers)
        .unwrap();
    let event = manager.next_event().await;
    assert!(matches!(event, Some(SessionEvent::Error(ConnectorError::Transport(_)))));
    assert_eq!(
        next_status(&mut manager).await,
        ConnectionStatus::Closed(CloseReason::Unauthorized)
    );
    assert_eq!(*calls.lock(), 1);
}

#[test_timeout::tokio_timeout_test(20)]
async fn clean_server_close_is_normal() {
    let (addr, _received) = spawn_backend().await;
    let mut manager = manager_for(addr);
    manager
        .connect(ConnectionTarget::room("BYE"), &credential("t1"), SessionHandlers::new())
        .unwrap();
    assert_eq!(next_status(&mut manager).await, ConnectionStatus::Open);
    assert_eq!(
        next_status(&mut manager).await,
        ConnectionStatus::Closed(CloseReason::Normal)
    );
}

#[test_timeout::tokio_timeout_test(20)]
async fn unreachable_server_closes_abnormally() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut manager = manager_for(addr);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = SessionHandlers::new().on_error(move |err| sink.lock().push(err.clone()));
    manager
        .connect(ConnectionTarget::room("ABC-123"), &credential("t1"), handlers)
        .unwrap();

    assert_eq!(
        next_status(&mut manager).await,
        ConnectionStatus::Closed(CloseReason::Abnormal)
    );
    assert_eq!(errors.lock().len(), 1);
    assert!(manager.messages().is_empty());
}

#[test_timeout::tokio_timeout_test(20)]
async fn disconnect_during_handshake_releases_socket() {
    // accepts the TCP connection but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut manager = manager_for(addr);
    manager
        .connect(ConnectionTarget::room("ABC-123"), &credential("t1"), SessionHandlers::new())
        .unwrap();
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = socket.read(&mut buf).await.unwrap();
        assert!(read > 0, "client hung up before sending the upgrade");
        request.extend_from_slice(&buf[..read]);
    }

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Idle);
    assert!(manager.next_event().await.is_none());

    let read = socket.read(&mut buf).await.unwrap_or(0);
    assert_eq!(read, 0, "client socket still open after disconnect");
}
