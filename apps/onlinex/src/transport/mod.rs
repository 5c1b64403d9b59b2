use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

pub mod mock;
pub mod websocket;

/// Close code sent by the backend when the session is not authorized.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_NORMAL: u16 = 1000;
/// Reserved code for a connection that dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Reserved code for a close frame that carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }
}

/// Signals a transport reports back to whoever owns the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Closed(CloseInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is gone")]
    Gone,
}

/// Owner side of one socket: outbound frames in, events out.
///
/// Dropping the link drops the event receiver, so nothing the transport
/// emits afterwards can reach the previous owner.
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

/// Transport side of a [`TransportLink`].
pub struct LinkEndpoint {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl LinkEndpoint {
    /// Returns false once the owner has dropped the link.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

impl TransportLink {
    pub fn pair() -> (TransportLink, LinkEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                outbound: outbound_tx,
                events: events_rx,
                task: None,
            },
            LinkEndpoint {
                events: events_tx,
                outbound: outbound_rx,
            },
        )
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Gone)
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Ask the transport to close and stop listening to it.
    pub fn close(mut self) {
        let _ = self.outbound.send(Outbound::Close);
        self.events.close();
        // the driver finishes the close handshake, or drops an unfinished
        // opening handshake, on its own
        self.task.take();
    }
}

/// Opens transports. Dialing never blocks: progress arrives as events.
pub trait Dialer: Send + Sync {
    fn dial(&self, url: &Url) -> TransportLink;
}

/// `url` without its query string, safe to log.
pub fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}
