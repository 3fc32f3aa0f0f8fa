//! Client configuration and its fluent builder.

use std::time::Duration;

use crate::error::ClientError;
use crate::jobs::PollInterval;
use crate::reconnect::ReconnectPolicy;

/// Environment variable holding the middleware host.
pub const ENV_HOST: &str = "TRUENAS_HOST";
/// Environment variable holding the API key.
pub const ENV_TOKEN: &str = "TRUENAS_TOKEN";

/// Everything a [`Client`](crate::Client) needs to connect and behave.
#[derive(Clone)]
pub struct ClientConfig {
    /// Host name (`nas01.example.com`) or a full WebSocket URL
    /// (`wss://nas01.example.com/websocket`). A bare host dials
    /// `wss://{host}/websocket`.
    pub host: String,
    /// Bearer API key. Redacted from `Debug` output, never logged.
    pub token: String,
    /// Per-call deadline for one request/response exchange.
    pub call_timeout: Duration,
    /// Budget for dial + handshake + authentication.
    pub connect_timeout: Duration,
    /// Job-status polling cadence.
    pub poll: PollInterval,
    /// Policy for caller-invoked [`Client::reconnect`](crate::Client::reconnect).
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Start a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Read host and token from `TRUENAS_HOST` / `TRUENAS_TOKEN`.
    pub fn from_env() -> Result<Self, ClientError> {
        let host = std::env::var(ENV_HOST)
            .map_err(|_| ClientError::Config(format!("{ENV_HOST} is not set")))?;
        let token = std::env::var(ENV_TOKEN)
            .map_err(|_| ClientError::Config(format!("{ENV_TOKEN} is not set")))?;
        ClientBuilder::new().host(host).token(token).build()
    }

    /// The WebSocket URL to dial.
    pub(crate) fn endpoint(&self) -> String {
        if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("wss://{}/websocket", self.host)
        }
    }

    /// Base URL for the HTTP upload endpoint, derived from `host`.
    pub(crate) fn http_base(&self) -> String {
        let bare = self
            .host
            .trim_start_matches("wss://")
            .trim_start_matches("ws://")
            .trim_end_matches("/websocket");
        format!("https://{bare}")
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".into()));
        }
        if self.token.is_empty() {
            return Err(ClientError::Config("token must not be empty".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(ClientError::Config("call_timeout must be positive".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config("connect_timeout must be positive".into()));
        }
        self.poll.validate()?;
        Ok(())
    }
}

// Keeps the API key out of logs and panic messages.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("call_timeout", &self.call_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("poll", &self.poll)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

/// Fluent builder for [`ClientConfig`].
///
/// ```rust,no_run
/// # use tn_client::ClientConfig;
/// let config = ClientConfig::builder()
///     .host("nas01.example.com")
///     .token("1-abcdef")
///     .call_timeout(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig {
                host: String::new(),
                token: String::new(),
                call_timeout: Duration::from_secs(30),
                connect_timeout: Duration::from_secs(30),
                poll: PollInterval::default(),
                reconnect: ReconnectPolicy::default(),
            },
        }
    }

    /// Middleware host name or full `ws(s)://` URL. Required.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Bearer API key. Required.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into();
        self
    }

    /// Per-call deadline (default 30s).
    pub fn call_timeout(mut self, d: Duration) -> Self {
        self.config.call_timeout = d;
        self
    }

    /// Dial/handshake/auth budget (default 30s).
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.config.connect_timeout = d;
        self
    }

    /// Job-status polling cadence.
    pub fn poll(mut self, poll: PollInterval) -> Self {
        self.config.poll = poll;
        self
    }

    /// Reconnect policy for the explicit [`Client::reconnect`](crate::Client::reconnect) path.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Validate and produce the config.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClientBuilder {
        ClientBuilder::new().host("nas01").token("secret")
    }

    #[test]
    fn build_requires_host_and_token() {
        assert!(ClientBuilder::new().token("t").build().is_err());
        assert!(ClientBuilder::new().host("h").build().is_err());
        assert!(valid().build().is_ok());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let err = valid().call_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn bare_host_dials_wss_websocket() {
        let cfg = valid().build().unwrap();
        assert_eq!(cfg.endpoint(), "wss://nas01/websocket");
        assert_eq!(cfg.http_base(), "https://nas01");
    }

    #[test]
    fn full_url_used_verbatim() {
        let cfg = valid().host("ws://127.0.0.1:9001/websocket").build().unwrap();
        assert_eq!(cfg.endpoint(), "ws://127.0.0.1:9001/websocket");
        assert_eq!(cfg.http_base(), "https://127.0.0.1:9001");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = valid().token("super-secret").build().unwrap();
        let dump = format!("{cfg:?}");
        assert!(!dump.contains("super-secret"));
        assert!(dump.contains("<redacted>"));
    }
}
