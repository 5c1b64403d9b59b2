use std::env;
use std::path::PathBuf;

use crate::session::{SessionError, SessionStore};
use crate::transport::websocket::{EndpointConfig, PageOrigin};

pub const DEFAULT_LOG_FILTER: &str = "info";

/// OnLinex client configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP API base, e.g. `https://api.onlinex.app`
    pub api_base_url: Option<String>,
    /// Explicit WebSocket base; wins over anything derived
    pub ws_base_url: Option<String>,
    /// Origin the client acts on behalf of, used as a last resort for sockets
    pub origin: Option<PageOrigin>,
    pub session_file: Option<PathBuf>,
    pub log_filter: String,
}

fn non_blank(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let origin = non_blank("ONLINEX_ORIGIN").and_then(|raw| {
            let parsed = PageOrigin::parse(&raw);
            if parsed.is_none() {
                tracing::warn!(target: "onlinex::config", origin = %raw, "ignoring unparsable ONLINEX_ORIGIN");
            }
            parsed
        });

        Self {
            api_base_url: non_blank("ONLINEX_API_URL"),
            ws_base_url: non_blank("ONLINEX_WS_URL"),
            origin,
            session_file: non_blank("ONLINEX_SESSION_FILE").map(PathBuf::from),
            log_filter: non_blank("ONLINEX_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            api_base_url: self.api_base_url.clone(),
            ws_base_url: self.ws_base_url.clone(),
            origin: self.origin.clone(),
        }
    }

    pub fn session_store(&self) -> Result<SessionStore, SessionError> {
        let path = match &self.session_file {
            Some(path) => path.clone(),
            None => SessionStore::default_path()?,
        };
        Ok(SessionStore::new(path))
    }
}
