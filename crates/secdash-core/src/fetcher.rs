use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::clock::Clock;
use crate::config::Credentials;
use crate::error::{FetchError, TransportError};
use crate::session::Session;
use crate::transport::{ApiRequest, HttpTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

pub struct Fetcher<T: HttpTransport> {
    transport: T,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    timeout: Duration,
    cache: ResponseCache,
}

impl<T: HttpTransport> Fetcher<T> {
    pub fn new(
        transport: T,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            timeout,
            cache: ResponseCache::new(cache_ttl),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn fetch(
        &mut self,
        request: &ApiRequest,
        session: &Session,
    ) -> Result<Value, FetchError> {
        if let Some(payload) = self.cache.get(request, self.clock.instant()) {
            debug!(url = %request.url, "response cache hit");
            return Ok(payload);
        }

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match self
                .transport
                .get_json(request, session.bearer(), self.timeout)
                .await
            {
                Ok(payload) => {
                    self.cache
                        .insert(request.clone(), payload.clone(), self.clock.instant());
                    return Ok(payload);
                }
                Err(err) => {
                    warn!(url = %request.url, attempt, max_attempts = self.retry.max_attempts, error = %err, "request attempt failed");
                    if err.is_unauthorized() || attempt >= self.retry.max_attempts {
                        return Err(FetchError::Exhausted {
                            url: request.url.clone(),
                            attempts: attempt,
                            cause: err,
                        });
                    }
                    self.clock.sleep(self.retry.delay_after(attempt)).await;
                }
            }
        }
    }

    pub async fn authorize(
        &self,
        token_url: &str,
        credentials: &Credentials,
    ) -> Result<Session, FetchError> {
        let grant = self
            .transport
            .issue_token(token_url, credentials, self.timeout)
            .await
            .map_err(FetchError::Auth)?;
        if grant.access_token.is_empty() {
            return Err(FetchError::Auth(TransportError::Body(
                "token response carried an empty access_token".to_owned(),
            )));
        }
        Ok(Session::from_grant(grant, self.clock.instant()))
    }
}
