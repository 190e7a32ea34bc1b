//! Feed client and transport configuration

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::FeedError;

/// Client-side deadline used when no server-side timeout is configured
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(190);

/// Margin added on top of the scaled server-side timeout
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_millis(1000);

/// Source of the current instant, used only for latency measurement
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Request body compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Compress bodies larger than the auto-compression threshold
    #[default]
    Auto,
    /// Never compress
    None,
    /// Always compress
    Gzip,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Auto => "auto",
            Compression::None => "none",
            Compression::Gzip => "gzip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Compression::Auto),
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            _ => Err(FeedError::Config(format!(
                "invalid compression '{}': expected auto, none or gzip",
                s
            ))),
        }
    }
}

/// Options for a [`FeedClient`](crate::FeedClient)
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use docfeed_http::{ClientOptions, Compression};
///
/// let options = ClientOptions::new("http://localhost:8080")
///     .timeout(Duration::from_secs(10))
///     .route("default")
///     .compression(Compression::Gzip);
///
/// assert_eq!(options.client_timeout(), Duration::from_secs(12));
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL of the document API (e.g., "http://localhost:8080")
    pub base_url: String,

    /// Server-side timeout; zero leaves the server default in place
    pub timeout: Duration,

    /// Route to send documents through
    pub route: String,

    /// Trace level requested from the server
    pub trace_level: u32,

    /// Request body compression mode
    pub compression: Compression,

    /// Clock used to measure per-call latency
    pub now: Clock,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::ZERO,
            route: String::new(),
            trace_level: 0,
            compression: Compression::Auto,
            now: Arc::new(Instant::now),
        }
    }
}

impl ClientOptions {
    /// Create options for the given base URL with default values
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the server-side timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the server-side timeout from seconds.
    ///
    /// Negative and NaN values leave the server default in place; values
    /// too large for a `Duration` saturate.
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        };
        self
    }

    /// Set the route
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Set the trace level
    pub fn trace_level(mut self, level: u32) -> Self {
        self.trace_level = level;
        self
    }

    /// Set the compression mode
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Replace the clock used for latency measurement
    pub fn clock(mut self, now: impl Fn() -> Instant + Send + Sync + 'static) -> Self {
        self.now = Arc::new(now);
        self
    }

    /// Deadline for a single transport call.
    ///
    /// Must exceed the server-side timeout so the server's own timeout
    /// response arrives before the client gives up. Saturates at
    /// `Duration::MAX`.
    pub fn client_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            return DEFAULT_CLIENT_TIMEOUT;
        }
        self.timeout
            .checked_mul(11)
            .map(|scaled| scaled / 10)
            .and_then(|scaled| scaled.checked_add(CLIENT_TIMEOUT_MARGIN))
            .unwrap_or(Duration::MAX)
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("route", &self.route)
            .field("trace_level", &self.trace_level)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

/// Configuration for the reqwest-backed [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout
    pub pool_idle_timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,

    /// Speak HTTP/2 without negotiation (h2c or TLS without ALPN)
    pub http2_prior_knowledge: bool,

    /// Whether to accept invalid certificates (for testing only)
    pub danger_accept_invalid_certs: bool,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("docfeed-http/{}", env!("CARGO_PKG_VERSION")),
            http2_prior_knowledge: false,
            danger_accept_invalid_certs: false,
        }
    }
}

impl HttpTransportConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set max idle connections per host
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Set idle connection timeout
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use HTTP/2 without protocol negotiation
    pub fn http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.http2_prior_knowledge = enabled;
        self
    }

    /// Accept invalid certificates (DANGER - testing only)
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }
}
