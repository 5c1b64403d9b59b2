//! Session credentials issued by the OnLinex auth API and their on-disk store.

pub mod error;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

pub use error::SessionError;
pub use store::{SessionStore, StoredSession};

pub const DEFAULT_TOKEN_TYPE: &str = "bearer";

/// Bearer credential carried by every authenticated request and socket.
///
/// The connector only ever reads it: the token lands in the socket URL as
/// `token`/`token_type` query parameters (browsers offer no header channel
/// for WebSockets, and the backend follows that convention), while HTTP
/// calls use an `Authorization` header.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    token: String,
    token_type: String,
}

impl SessionCredential {
    pub fn new(
        token: impl Into<String>,
        token_type: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        let token_type = token_type.into();
        let token_type = if token_type.trim().is_empty() {
            DEFAULT_TOKEN_TYPE.to_string()
        } else {
            token_type
        };
        Ok(Self { token, token_type })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Append `token` and `token_type` to the query string of `url`.
    pub fn append_query(&self, url: &mut Url) {
        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .append_pair("token_type", &self.token_type);
    }

    /// Value for the HTTP `Authorization` header, e.g. `bearer abc`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}
