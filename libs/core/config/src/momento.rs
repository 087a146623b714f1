use crate::{env_or_default, env_required, ConfigError, FromEnv};
use std::fmt;

/// Endpoints and auth token for the Momento service
#[derive(Clone)]
pub struct MomentoCredentials {
    pub cache_endpoint: String,
    pub control_endpoint: String,
    auth_token: String,
}

impl MomentoCredentials {
    /// Bare hosts are treated as TLS endpoints on port 443.
    pub fn new(
        cache_endpoint: impl AsRef<str>,
        control_endpoint: impl AsRef<str>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            cache_endpoint: normalize_endpoint(cache_endpoint.as_ref()),
            control_endpoint: normalize_endpoint(control_endpoint.as_ref()),
            auth_token: auth_token.into(),
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn is_cache_endpoint_secure(&self) -> bool {
        self.cache_endpoint.starts_with("https://")
    }
}

impl fmt::Debug for MomentoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MomentoCredentials")
            .field("cache_endpoint", &self.cache_endpoint)
            .field("control_endpoint", &self.control_endpoint)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl FromEnv for MomentoCredentials {
    /// Reads from environment variables:
    /// - MOMENTO_AUTH_TOKEN: required
    /// - MOMENTO_CACHE_ENDPOINT: required
    /// - MOMENTO_CONTROL_ENDPOINT: defaults to the cache endpoint
    fn from_env() -> Result<Self, ConfigError> {
        let auth_token = env_required("MOMENTO_AUTH_TOKEN")?;
        let cache_endpoint = env_required("MOMENTO_CACHE_ENDPOINT")?;
        let control_endpoint = env_or_default("MOMENTO_CONTROL_ENDPOINT", &cache_endpoint);

        if auth_token.trim().is_empty() {
            return Err(ConfigError::ParseError {
                key: "MOMENTO_AUTH_TOKEN".to_string(),
                details: "token cannot be empty".to_string(),
            });
        }

        Ok(Self::new(cache_endpoint, control_endpoint, auth_token))
    }
}

fn normalize_endpoint(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.contains("://") {
        return raw.to_string();
    }
    if raw.contains(':') {
        format!("https://{raw}")
    } else {
        format!("https://{raw}:443")
    }
}
