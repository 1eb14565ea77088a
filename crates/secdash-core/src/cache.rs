use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::transport::ApiRequest;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    expires_at: Instant,
}

/// Time-bounded, process-local cache of successful responses.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: HashMap<ApiRequest, CacheEntry>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, request: &ApiRequest, now: Instant) -> Option<Value> {
        match self.entries.get(request) {
            Some(entry) if entry.expires_at > now => Some(entry.payload.clone()),
            Some(_) => {
                self.entries.remove(request);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, request: ApiRequest, payload: Value, now: Instant) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.retain(|_, entry| entry.expires_at > now);
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);
        self.entries.insert(
            request,
            CacheEntry {
                payload,
                expires_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
