use shared::protocol::{ws_path, DEFAULT_BRIDGE_USER};
use url::Url;

use crate::error::BridgeError;

/// The parts of the hosting page's address the bridge cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Scheme with its trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Host with an optional port, e.g. `example.com:8080`.
    pub host: String,
    /// Raw query string without the leading `?`.
    pub query: String,
}

impl PageLocation {
    pub fn parse(page_url: &str) -> Result<Self, BridgeError> {
        Self::from_url(&Url::parse(page_url)?)
    }

    pub fn from_url(url: &Url) -> Result<Self, BridgeError> {
        let host = url.host_str().ok_or(BridgeError::MissingHost)?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            protocol: format!("{}:", url.scheme()),
            host,
            query: url.query().unwrap_or_default().to_string(),
        })
    }

    /// The `user` query parameter, if present and non-empty.
    pub fn requested_user(&self) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key == "user")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// Socket address for this page: same host, `wss:` when the page is
    /// served over `https:`.
    pub fn socket_url(&self, default_user: &str) -> Result<Url, BridgeError> {
        let scheme = match self.protocol.as_str() {
            "https:" | "wss:" => "wss",
            "http:" | "ws:" => "ws",
            other => return Err(BridgeError::UnsupportedProtocol(other.to_string())),
        };
        let user = self
            .requested_user()
            .unwrap_or_else(|| default_user.to_string());
        Ok(Url::parse(&format!(
            "{scheme}://{}{}",
            self.host,
            ws_path(&user)
        ))?)
    }

    pub fn default_socket_url(&self) -> Result<Url, BridgeError> {
        self.socket_url(DEFAULT_BRIDGE_USER)
    }
}

#[cfg(test)]
#[path = "tests/location_tests.rs"]
mod tests;
