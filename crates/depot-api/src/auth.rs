//! Static token authorization.
//!
//! Tokens come from `DEPOT_ACCESS_TOKENS`. Clients present one either as a
//! bearer token or as the password of HTTP basic credentials, which is what
//! Maven and Gradle send.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::Engine;
use depot_core::config::AccessTokenConfig;
use depot_core::{AccessChecker, CallerIdentity, Capability, Config};
use subtle::ConstantTimeEq;

pub struct StaticTokenAccess {
    tokens: Vec<AccessTokenConfig>,
}

impl StaticTokenAccess {
    pub fn new(tokens: Vec<AccessTokenConfig>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.access_tokens.is_empty() {
            tracing::warn!("No access tokens configured; deploys and private reads are disabled");
        }
        Self::new(config.access_tokens.clone())
    }
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl AccessChecker for StaticTokenAccess {
    async fn check_access(
        &self,
        identity: &CallerIdentity,
        repository: &str,
        capability: Capability,
    ) -> bool {
        self.tokens.iter().any(|token| {
            secure_compare(&token.token, identity.as_str())
                && (token.repositories.is_empty()
                    || token.repositories.iter().any(|name| name == repository))
                && (capability == Capability::Read || token.can_write)
        })
    }
}

/// Identity presented in the `Authorization` header, if any.
pub fn caller_identity(headers: &HeaderMap) -> Option<CallerIdentity> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, credentials) = value.split_once(' ')?;
    let credentials = credentials.trim();

    if scheme.eq_ignore_ascii_case("bearer") {
        return (!credentials.is_empty()).then(|| CallerIdentity::new(credentials));
    }

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(credentials)
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
        let token = if password.is_empty() { user } else { password };
        return (!token.is_empty()).then(|| CallerIdentity::new(token));
    }

    None
}
