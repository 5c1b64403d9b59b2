use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    #[error("no websocket endpoint configured; set ONLINEX_WS_URL or ONLINEX_API_URL")]
    EndpointResolution,
    #[error("invalid websocket endpoint `{url}`: {detail}")]
    InvalidEndpoint { url: String, detail: String },
    #[error("connection error: {0}")]
    Transport(String),
    #[error("session expired or not authorized for this channel")]
    Unauthorized,
    #[error("connection not ready")]
    NotReady,
    #[error("a connection is already active")]
    AlreadyActive,
    #[error("resource id must not be empty")]
    EmptyResource,
}
