use std::time::{Duration, Instant};

use crate::transport::TokenGrant;

/// Refresh this long before the vendor's stated expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Bearer token context handed to every authorized call.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    expires_at: Option<Instant>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: Option<Instant>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn from_grant(grant: TokenGrant, issued_at: Instant) -> Self {
        let expires_at = grant
            .expires_in
            .map(|secs| Duration::from_secs(secs).saturating_sub(EXPIRY_SKEW))
            .and_then(|lifetime| issued_at.checked_add(lifetime));
        Self::new(grant.access_token, expires_at)
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }

    /// Tokens without a stated lifetime live for the whole dashboard session.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}
