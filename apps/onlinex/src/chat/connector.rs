use std::fmt;
use std::sync::Arc;

use crate::chat::error::ConnectorError;
use crate::chat::log::{ChatEntry, MessageLog, Role};
use crate::chat::target::ConnectionTarget;
use crate::session::SessionCredential;
use crate::transport::websocket::EndpointConfig;
use crate::transport::{
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CloseInfo, Dialer, TransportEvent, TransportLink,
    redacted,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Clean 1000 close.
    Normal,
    /// Close code 1008: the backend refused or expired the session.
    Unauthorized,
    Abnormal,
    /// No usable endpoint; the socket was never opened.
    NoEndpoint,
}

impl CloseReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            CLOSE_NORMAL => CloseReason::Normal,
            CLOSE_POLICY_VIOLATION => CloseReason::Unauthorized,
            _ => CloseReason::Abnormal,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CloseReason::Normal => "normal",
            CloseReason::Unauthorized => "unauthorized",
            CloseReason::Abnormal => "abnormal",
            CloseReason::NoEndpoint => "no-endpoint",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Open,
    Closed(CloseReason),
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionStatus::Open)
    }

    fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Open)
    }
}

type StatusHandler = Box<dyn FnMut(&ConnectionStatus) + Send>;
type MessageHandler = Box<dyn FnMut(&ChatEntry) + Send>;
type UnauthorizedHandler = Box<dyn FnMut() + Send>;
type ErrorHandler = Box<dyn FnMut(&ConnectorError) + Send>;

/// Callbacks for one connection. They run on the task that drives the
/// connector and are dropped when it disconnects.
#[derive(Default)]
pub struct SessionHandlers {
    on_status_change: Option<StatusHandler>,
    on_message: Option<MessageHandler>,
    on_unauthorized: Option<UnauthorizedHandler>,
    on_error: Option<ErrorHandler>,
}

impl SessionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status_change(
        mut self,
        handler: impl FnMut(&ConnectionStatus) + Send + 'static,
    ) -> Self {
        self.on_status_change = Some(Box::new(handler));
        self
    }

    /// Called for every remote entry appended to the log.
    pub fn on_message(mut self, handler: impl FnMut(&ChatEntry) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    pub fn on_unauthorized(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_unauthorized = Some(Box::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl FnMut(&ConnectorError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    fn status(&mut self, status: &ConnectionStatus) {
        if let Some(handler) = self.on_status_change.as_mut() {
            handler(status);
        }
    }

    fn message(&mut self, entry: &ChatEntry) {
        if let Some(handler) = self.on_message.as_mut() {
            handler(entry);
        }
    }

    fn unauthorized(&mut self) {
        if let Some(handler) = self.on_unauthorized.as_mut() {
            handler();
        }
    }

    fn error(&mut self, err: &ConnectorError) {
        if let Some(handler) = self.on_error.as_mut() {
            handler(err);
        }
    }
}

/// What applying one transport event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    Message(ChatEntry),
    Error(ConnectorError),
}

/// Owns at most one realtime connection to a room or AI conversation.
///
/// All state changes happen on the caller's task: `connect` and `send`
/// return immediately, and transport progress is applied by awaiting
/// [`ConnectionManager::next_event`]. There is no automatic reconnect.
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    endpoint: EndpointConfig,
    status: ConnectionStatus,
    target: Option<ConnectionTarget>,
    log: MessageLog,
    link: Option<TransportLink>,
    handlers: SessionHandlers,
    last_error: Option<ConnectorError>,
}

impl ConnectionManager {
    pub fn new(dialer: Arc<dyn Dialer>, endpoint: EndpointConfig) -> Self {
        Self {
            dialer,
            endpoint,
            status: ConnectionStatus::Idle,
            target: None,
            log: MessageLog::new(),
            link: None,
            handlers: SessionHandlers::default(),
            last_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn target(&self) -> Option<&ConnectionTarget> {
        self.target.as_ref()
    }

    pub fn messages(&self) -> &[ChatEntry] {
        self.log.all()
    }

    pub fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    /// Start connecting to `target`. Valid from `Idle` or `Closed`.
    ///
    /// The credential is only read, once, to build the socket URL. When no
    /// endpoint resolves the status goes straight to
    /// `Closed(NoEndpoint)` and no socket is opened.
    pub fn connect(
        &mut self,
        target: ConnectionTarget,
        credential: &SessionCredential,
        handlers: SessionHandlers,
    ) -> Result<(), ConnectorError> {
        if self.status.is_active() {
            return Err(ConnectorError::AlreadyActive);
        }
        if target.resource_id().trim().is_empty() {
            return Err(ConnectorError::EmptyResource);
        }

        if let Some(stale) = self.link.take() {
            stale.close();
        }
        self.handlers = handlers;
        self.log.clear();
        self.last_error = None;
        self.target = Some(target.clone());

        let base = self.endpoint.resolve();
        let url = if base.is_empty() {
            Err(ConnectorError::EndpointResolution)
        } else {
            target.url(&base, credential)
        };
        let url = match url {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(
                    target: "onlinex::connector",
                    resource = target.resource_id(),
                    error = %err,
                    "cannot resolve websocket endpoint"
                );
                self.fail(err.clone());
                // fresh handlers always hear the outcome, even a repeated one
                self.status = ConnectionStatus::Closed(CloseReason::NoEndpoint);
                self.handlers.status(&self.status);
                return Err(err);
            }
        };

        tracing::info!(
            target: "onlinex::connector",
            kind = ?target.kind(),
            resource = target.resource_id(),
            url = %redacted(&url),
            "connecting"
        );
        self.link = Some(self.dialer.dial(&url));
        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// Echo `text` into the log and forward it as one plain text frame.
    ///
    /// Only valid while `Open`; otherwise nothing is logged or sent. If the
    /// transport ended just before this call, the local entry is still
    /// logged but no frame goes out; the pending close event follows.
    pub fn send(&mut self, text: &str) -> Result<(), ConnectorError> {
        let link = match (&self.status, self.link.as_ref()) {
            (ConnectionStatus::Open, Some(link)) => link,
            _ => return Err(ConnectorError::NotReady),
        };
        self.log.append(ChatEntry::new(Role::Local, text));
        if let Err(err) = link.send_text(text.to_string()) {
            // the close event is already queued behind this call
            tracing::warn!(target: "onlinex::connector", error = %err, "send after transport ended");
        }
        Ok(())
    }

    /// Close the transport, if any, and return to `Idle`.
    ///
    /// No callback of the torn down connection runs after this returns.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!(
                target: "onlinex::connector",
                resource = self.target.as_ref().map(ConnectionTarget::resource_id),
                "disconnecting"
            );
            link.close();
        }
        self.handlers = SessionHandlers::default();
        self.target = None;
        self.status = ConnectionStatus::Idle;
    }

    /// Wait for the next transport event and apply it.
    ///
    /// Returns `None` once there is no transport left to listen to.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let link = self.link.as_mut()?;
        let event = match link.next_event().await {
            Some(event) => event,
            None => TransportEvent::Closed(CloseInfo::abnormal("transport dropped")),
        };
        Some(self.apply(event))
    }

    fn apply(&mut self, event: TransportEvent) -> SessionEvent {
        match event {
            TransportEvent::Open => {
                self.last_error = None;
                tracing::info!(target: "onlinex::connector", "connection open");
                self.set_status(ConnectionStatus::Open);
                SessionEvent::Status(self.status)
            }
            TransportEvent::Message(text) => {
                let entry = self.log.append(ChatEntry::new(Role::Remote, text)).clone();
                self.handlers.message(&entry);
                SessionEvent::Message(entry)
            }
            TransportEvent::Error(detail) => {
                tracing::warn!(target: "onlinex::connector", error = %detail, "transport error");
                let err = ConnectorError::Transport(detail);
                self.fail(err.clone());
                SessionEvent::Error(err)
            }
            TransportEvent::Closed(close) => {
                self.link = None;
                let reason = CloseReason::from_code(close.code);
                tracing::info!(
                    target: "onlinex::connector",
                    code = close.code,
                    reason = %reason,
                    "connection closed"
                );
                self.set_status(ConnectionStatus::Closed(reason));
                if reason == CloseReason::Unauthorized {
                    self.last_error = Some(ConnectorError::Unauthorized);
                    self.handlers.unauthorized();
                }
                SessionEvent::Status(self.status)
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.handlers.status(&status);
    }

    fn fail(&mut self, err: ConnectorError) {
        self.handlers.error(&err);
        self.last_error = Some(err);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
