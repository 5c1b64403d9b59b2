use url::Url;

use crate::chat::error::ConnectorError;
use crate::session::SessionCredential;

/// Which backend socket family a resource id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Shared room chat, keyed by room code.
    Room,
    /// One-on-one conversation with an AI agent, keyed by conversation id.
    Assistant,
}

impl ChannelKind {
    fn path_segments(self) -> &'static [&'static str] {
        match self {
            ChannelKind::Room => &["ws", "chat"],
            ChannelKind::Assistant => &["ai", "ws", "chat"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    kind: ChannelKind,
    resource_id: String,
}

impl ConnectionTarget {
    pub fn new(kind: ChannelKind, resource_id: impl Into<String>) -> Self {
        Self {
            kind,
            resource_id: resource_id.into(),
        }
    }

    pub fn room(code: impl Into<String>) -> Self {
        Self::new(ChannelKind::Room, code)
    }

    pub fn assistant(conversation_id: impl Into<String>) -> Self {
        Self::new(ChannelKind::Assistant, conversation_id)
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Socket URL for this target under `base`, with the credential attached.
    pub fn url(&self, base: &str, credential: &SessionCredential) -> Result<Url, ConnectorError> {
        let invalid = |detail: String| ConnectorError::InvalidEndpoint {
            url: base.to_string(),
            detail,
        };
        let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| invalid("base url cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.extend(self.kind.path_segments());
            segments.push(&self.resource_id);
        }
        credential.append_query(&mut url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> SessionCredential {
        SessionCredential::new("t1", "bearer").unwrap()
    }

    #[test_timeout::timeout]
    fn room_url_carries_code_and_credential() {
        let url = ConnectionTarget::room("ABC-123")
            .url("ws://127.0.0.1:8000", &credential())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:8000/ws/chat/ABC-123?token=t1&token_type=bearer"
        );
    }

    #[test_timeout::timeout]
    fn assistant_url_uses_ai_prefix() {
        let url = ConnectionTarget::assistant("5f0c")
            .url("wss://api.x.com/", &credential())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.x.com/ai/ws/chat/5f0c?token=t1&token_type=bearer"
        );
    }

    #[test_timeout::timeout]
    fn base_path_is_kept() {
        let url = ConnectionTarget::room("R1")
            .url("wss://x.com/backend/", &credential())
            .unwrap();
        assert_eq!(url.path(), "/backend/ws/chat/R1");
    }

    #[test_timeout::timeout]
    fn unparsable_base_is_invalid_endpoint() {
        let err = ConnectionTarget::room("R1")
            .url("api.x.com", &credential())
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidEndpoint { .. }));
    }
}
