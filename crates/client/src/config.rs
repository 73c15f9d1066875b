//! Client configuration from environment variables.

use std::fmt;
use std::time::Duration;

use jobfair_shared::{NOTIFICATIONS_PATH, QUERY_COMPANY_TOKEN, QUERY_TOKEN};
use url::Url;

use crate::error::ClientError;

/// Used when neither `JOBFAIR_WS_URL` nor `JOBFAIR_API_URL` is set.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/notifications/";

pub const ENV_WS_URL: &str = "JOBFAIR_WS_URL";
pub const ENV_API_URL: &str = "JOBFAIR_API_URL";
pub const ENV_PING_INTERVAL: &str = "JOBFAIR_PING_INTERVAL_SECS";

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of scheduled retries before the connection is `Failed`
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(u64::from(self.delay_for_attempt(attempt)))
    }
}

/// Credentials embedded in the connection URI.
///
/// Student and admin sessions carry a bearer JWT, company dashboards carry an
/// opaque per-company access token. Only one is expected per deployment mode.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bearer: Option<String>,
    pub access: Option<String>,
}

impl Credentials {
    pub fn new(bearer: Option<String>, access: Option<String>) -> Self {
        Self { bearer, access }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            access: None,
        }
    }

    pub fn company(token: impl Into<String>) -> Self {
        Self {
            bearer: None,
            access: Some(token.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.bearer.is_none() && self.access.is_none()
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("bearer", &mask(&self.bearer))
            .field("access", &mask(&self.access))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Socket endpoint without credentials.
    pub endpoint: Url,
    pub reconnect: ReconnectConfig,
    /// Keep-alive ping period; `None` disables the ping task.
    pub ping_interval: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectConfig::default(),
            ping_interval: None,
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `JOBFAIR_WS_URL`: explicit socket URL (highest priority)
    /// - `JOBFAIR_API_URL`: HTTP API base the socket URL is derived from
    /// - `JOBFAIR_PING_INTERVAL_SECS`: keep-alive period (default: disabled)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = resolve_endpoint(
            non_empty(ENV_WS_URL).as_deref(),
            non_empty(ENV_API_URL).as_deref(),
        )?;

        let ping_interval = match non_empty(ENV_PING_INTERVAL) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ClientError::InvalidSetting {
                    key: ENV_PING_INTERVAL,
                    value: raw.clone(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            endpoint,
            reconnect: ReconnectConfig::default(),
            ping_interval,
        })
    }

    /// The endpoint with `token` / `company_token` query parameters appended.
    pub fn url_for(&self, credentials: &Credentials) -> Url {
        let mut url = self.endpoint.clone();
        if !credentials.is_anonymous() {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &credentials.bearer {
                query.append_pair(QUERY_TOKEN, token);
            }
            if let Some(token) = &credentials.access {
                query.append_pair(QUERY_COMPANY_TOKEN, token);
            }
        }
        url
    }
}

/// Resolve the socket URL: explicit override, else derived from the HTTP API
/// base, else [`DEFAULT_WS_URL`].
pub fn resolve_endpoint(ws_url: Option<&str>, api_url: Option<&str>) -> Result<Url, ClientError> {
    if let Some(raw) = ws_url {
        let url = parse_url(raw)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidEndpoint {
                url: raw.to_string(),
                reason: "scheme must be ws or wss".to_string(),
            });
        }
        return Ok(url);
    }

    if let Some(api) = api_url {
        return parse_url(&derive_ws_url(api)?);
    }

    parse_url(DEFAULT_WS_URL)
}

/// `https://host/api` -> `wss://host/ws/notifications/`
fn derive_ws_url(api_url: &str) -> Result<String, ClientError> {
    let api_url = api_url.trim();
    let (scheme, rest) = if let Some(rest) = api_url.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        ("ws", rest)
    } else {
        return Err(ClientError::InvalidEndpoint {
            url: api_url.to_string(),
            reason: "API URL must be absolute http(s) to derive a socket URL".to_string(),
        });
    };

    let host = rest.trim_end_matches('/');
    let host = host.strip_suffix("/api").unwrap_or(host);
    Ok(format!("{scheme}://{host}{NOTIFICATIONS_PATH}"))
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|e| ClientError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
