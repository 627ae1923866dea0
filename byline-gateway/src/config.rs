//! Gateway connection settings.

use std::time::Duration;

/// Default per-request timeout. The only time bound in the client; the
/// cache and store above it never add their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`RestGateway`](crate::RestGateway).
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Backend origin, e.g. `http://localhost:8000`. A trailing slash is
    /// tolerated and stripped.
    pub base_url: String,
    /// JWT access token, sent as `Authorization: Bearer ...` when set.
    pub auth_token: Option<String>,
    /// Applied once at `reqwest::Client` construction.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new("http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_builders() {
        let config = GatewayConfig::new("http://localhost:8000")
            .with_auth_token("jwt")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(config.auth_token.as_deref(), Some("jwt"));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }
}
