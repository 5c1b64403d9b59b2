use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use super::{CloseInfo, Dialer, LinkEndpoint, Outbound, TransportEvent, TransportLink};

/// Dialer that hands every link to the test instead of a network.
#[derive(Clone, Default)]
pub struct MockDialer {
    remotes: Arc<Mutex<Vec<MockRemote>>>,
    dialed: Arc<Mutex<Vec<Url>>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs dialed so far, oldest first.
    pub fn dialed(&self) -> Vec<Url> {
        self.dialed.lock().clone()
    }

    /// Take the remote end of the oldest link not yet taken.
    pub fn take_remote(&self) -> Option<MockRemote> {
        let mut remotes = self.remotes.lock();
        if remotes.is_empty() {
            None
        } else {
            Some(remotes.remove(0))
        }
    }
}

impl Dialer for MockDialer {
    fn dial(&self, url: &Url) -> TransportLink {
        let (link, endpoint) = TransportLink::pair();
        self.dialed.lock().push(url.clone());
        self.remotes.lock().push(MockRemote {
            url: url.clone(),
            endpoint,
            frames: Vec::new(),
            close_requested: false,
        });
        link
    }
}

/// Scripted peer for one dialed link.
pub struct MockRemote {
    url: Url,
    endpoint: LinkEndpoint,
    frames: Vec<String>,
    close_requested: bool,
}

impl MockRemote {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn open(&self) {
        self.endpoint.emit(TransportEvent::Open);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.endpoint.emit(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.endpoint.emit(TransportEvent::Error(detail.into()));
    }

    pub fn close(&self, code: u16) {
        self.endpoint
            .emit(TransportEvent::Closed(CloseInfo::new(code, "")));
    }

    /// Whether the owner still listens to this link.
    pub fn is_attached(&self) -> bool {
        !self.endpoint.events.is_closed()
    }

    fn drain(&mut self) {
        while let Ok(frame) = self.endpoint.outbound.try_recv() {
            match frame {
                Outbound::Text(text) => self.frames.push(text),
                Outbound::Close => self.close_requested = true,
            }
        }
    }

    /// Every text frame the owner has sent over this link, in order.
    pub fn sent(&mut self) -> Vec<String> {
        self.drain();
        self.frames.clone()
    }

    pub fn close_requested(&mut self) -> bool {
        self.drain();
        self.close_requested
    }
}
