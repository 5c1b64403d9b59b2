use url::Url;

/// Scheme and host of the page the client was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    /// Includes the trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Host with optional port, e.g. `x.com:8443`.
    pub host: String,
}

impl PageOrigin {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
        }
    }

    /// Parse an origin such as `https://x.com:8443`.
    pub fn parse(origin: &str) -> Option<Self> {
        let url = Url::parse(origin.trim()).ok()?;
        let host = url.host_str()?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Some(Self::new(format!("{}:", url.scheme()), host))
    }
}

fn configured(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Work out the WebSocket base URL.
///
/// An explicit override wins, then the HTTP API base with its scheme
/// swapped, then the page origin. An empty string means there is nowhere
/// to connect.
pub fn resolve(
    http_base_url: Option<&str>,
    ws_base_url_override: Option<&str>,
    origin: Option<&PageOrigin>,
) -> String {
    if let Some(ws_base) = configured(ws_base_url_override) {
        return ws_base.to_string();
    }

    if let Some(http_base) = configured(http_base_url) {
        if let Some(rest) = strip_prefix_ignore_case(http_base, "https") {
            return format!("wss{rest}");
        }
        if let Some(rest) = strip_prefix_ignore_case(http_base, "http") {
            return format!("ws{rest}");
        }
        return http_base.to_string();
    }

    if let Some(origin) = origin.filter(|origin| !origin.host.trim().is_empty()) {
        let scheme = if origin.protocol == "https:" {
            "wss"
        } else {
            "ws"
        };
        return format!("{scheme}://{}", origin.host);
    }

    String::new()
}

/// The three inputs [`resolve`] looks at, as configured for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub api_base_url: Option<String>,
    pub ws_base_url: Option<String>,
    pub origin: Option<PageOrigin>,
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = Some(url.into());
        self
    }

    pub fn origin(mut self, origin: PageOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn resolve(&self) -> String {
        resolve(
            self.api_base_url.as_deref(),
            self.ws_base_url.as_deref(),
            self.origin.as_ref(),
        )
    }
}
