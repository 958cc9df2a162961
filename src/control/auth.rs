//! Control API Authentication
//!
//! The control plane stands in for the original deployment's restricted
//! local endpoint: bound to loopback, with an API key (or basic auth) as a
//! second fence. Either credential grants access; `/health` bypasses this
//! layer entirely.

use super::types::ApiAuthConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

/// Checks request credentials against the configured auth methods.
pub struct ApiAuth {
    config: ApiAuthConfig,
}

impl ApiAuth {
    pub fn new(config: ApiAuthConfig) -> Self {
        Self { config }
    }

    fn api_key_matches(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.config.api_key else {
            return false;
        };
        headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|provided| provided == expected)
    }

    fn basic_auth_matches(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.config.basic_auth else {
            return false;
        };
        let Some(encoded) = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = general_purpose::STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((username, password)) => {
                username == expected.username && password == expected.password
            }
            None => false,
        }
    }

    /// Decide whether a request may pass. Any one configured method
    /// matching is enough.
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        if !self.config.enabled {
            return true;
        }

        if self.api_key_matches(headers) {
            debug!("request authenticated via API key");
            return true;
        }
        if self.basic_auth_matches(headers) {
            debug!("request authenticated via basic auth");
            return true;
        }

        warn!("control API request rejected, no valid credentials");
        false
    }
}

/// Authentication middleware for the protected route group.
pub async fn auth_middleware(
    State(auth): State<Arc<ApiAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.authenticate(request.headers()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::types::BasicAuthConfig;
    use axum::http::HeaderValue;

    #[test]
    fn test_disabled_auth_admits_everything() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: false,
            api_key: Some("unused".to_string()),
            basic_auth: None,
        });
        assert!(auth.authenticate(&HeaderMap::new()));
    }

    #[test]
    fn test_api_key_must_match_exactly() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: Some("test-key".to_string()),
            basic_auth: None,
        });

        let mut headers = HeaderMap::new();
        assert!(!auth.authenticate(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("wrong-key"));
        assert!(!auth.authenticate(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("test-key"));
        assert!(auth.authenticate(&headers));
    }

    #[test]
    fn test_basic_auth_checks_both_parts() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: None,
            basic_auth: Some(BasicAuthConfig {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
        });

        let mut headers = HeaderMap::new();
        assert!(!auth.authenticate(&headers));

        for credentials in ["admin:secret", "admin:wrong", "other:secret", "admin"] {
            let encoded = general_purpose::STANDARD.encode(credentials);
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
            );
            assert_eq!(auth.authenticate(&headers), credentials == "admin:secret");
        }
    }

    #[test]
    fn test_garbage_authorization_header_is_rejected() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: None,
            basic_auth: Some(BasicAuthConfig {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Basic not-base64!!"),
        );
        assert!(!auth.authenticate(&headers));
    }
}
