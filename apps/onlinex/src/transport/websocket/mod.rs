use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{
    CLOSE_NO_STATUS, CLOSE_POLICY_VIOLATION, CloseInfo, Dialer, LinkEndpoint, Outbound,
    TransportEvent, TransportLink, redacted,
};

pub mod endpoint;

pub use endpoint::{EndpointConfig, PageOrigin, resolve};

/// Dials real sockets with tokio-tungstenite. Needs a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WebSocketDialer;

impl WebSocketDialer {
    pub fn new() -> Self {
        Self
    }
}

impl Dialer for WebSocketDialer {
    fn dial(&self, url: &Url) -> TransportLink {
        let (link, endpoint) = TransportLink::pair();
        let url = url.clone();
        let task = tokio::spawn(async move {
            drive(url, endpoint).await;
        });
        link.with_task(task)
    }
}

async fn drive(url: Url, endpoint: LinkEndpoint) {
    let target = redacted(&url);
    tracing::debug!(target: "onlinex::transport", url = %target, "opening websocket");

    let handshake = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = endpoint.events.closed() => {
            tracing::debug!(target: "onlinex::transport", url = %target, "handshake abandoned");
            return;
        }
    };

    let stream = match handshake {
        Ok((stream, _)) => stream,
        Err(err) => {
            let close = handshake_close(&err);
            tracing::warn!(
                target: "onlinex::transport",
                url = %target,
                code = close.code,
                error = %err,
                "websocket handshake failed"
            );
            endpoint.emit(TransportEvent::Error(err.to_string()));
            endpoint.emit(TransportEvent::Closed(close));
            return;
        }
    };

    if !endpoint.emit(TransportEvent::Open) {
        let mut stream = stream;
        let _ = stream.close(None).await;
        return;
    }
    pump(stream, endpoint).await;
    tracing::debug!(target: "onlinex::transport", url = %target, "websocket finished");
}

/// Native clients see a refused upgrade as an HTTP status, not a close frame.
fn handshake_close(err: &tungstenite::Error) -> CloseInfo {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            CloseInfo::new(
                CLOSE_POLICY_VIOLATION,
                format!("upgrade rejected with {}", response.status()),
            )
        }
        other => CloseInfo::abnormal(other.to_string()),
    }
}

async fn pump(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, endpoint: LinkEndpoint) {
    let LinkEndpoint {
        events,
        mut outbound,
    } = endpoint;
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        let _ = events.send(TransportEvent::Error(err.to_string()));
                        let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal(err.to_string())));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    return;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    let _ = events.send(TransportEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    let close = match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.into_owned()),
                        None => CloseInfo::new(CLOSE_NO_STATUS, ""),
                    };
                    tracing::debug!(
                        target: "onlinex::transport",
                        code = close.code,
                        reason = %close.reason,
                        "server closed websocket"
                    );
                    let _ = sink.close().await;
                    let _ = events.send(TransportEvent::Closed(close));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = events.send(TransportEvent::Error(err.to_string()));
                    let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal(err.to_string())));
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed(CloseInfo::abnormal("stream ended")));
                    return;
                }
            },
        }
    }
}
