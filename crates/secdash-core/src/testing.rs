use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::config::Credentials;
use crate::error::TransportError;
use crate::model::ZtnaActivityEntry;
use crate::transport::{ApiRequest, HttpTransport, TokenGrant};

pub fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("secdash-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

pub fn cdmx() -> FixedOffset {
    FixedOffset::west_opt(6 * 3600).expect("valid offset")
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    cdmx()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid date")
}

pub fn credentials() -> Credentials {
    Credentials {
        api_key: "key".into(),
        api_secret: "secret".into(),
    }
}

pub fn entry(ts: i64, label: &str) -> ZtnaActivityEntry {
    serde_json::from_value(json!({
        "timestamp": ts,
        "allapplications": [{"type": "PRIVATE", "label": label}]
    }))
    .expect("entry")
}

pub struct FakeClock {
    now: Mutex<DateTime<FixedOffset>>,
    instant: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new(now: DateTime<FixedOffset>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            instant: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.instant.lock().expect("lock") += by;
        let mut now = self.now.lock().expect("lock");
        *now += chrono::Duration::from_std(by).expect("duration");
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().expect("lock")
    }

    fn instant(&self) -> Instant {
        *self.instant.lock().expect("lock")
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("lock").push(duration);
        *self.instant.lock().expect("lock") += duration;
    }
}

type Handler = Box<dyn FnMut(&ApiRequest, &str) -> Result<Value, TransportError> + Send>;

#[derive(Default)]
struct FakeState {
    handlers: Vec<(String, Handler)>,
    calls: Vec<(ApiRequest, String)>,
    tokens_issued: usize,
    token_failure: bool,
}

/// Routes requests to per-path handlers; the latest route for a path wins. Every GET is recorded.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &self,
        path: &str,
        handler: impl FnMut(&ApiRequest, &str) -> Result<Value, TransportError> + Send + 'static,
    ) -> &Self {
        self.state
            .lock()
            .expect("lock")
            .handlers
            .push((path.to_string(), Box::new(handler)));
        self
    }

    pub fn fail_token(&self) {
        self.state.lock().expect("lock").token_failure = true;
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.state
            .lock()
            .expect("lock")
            .calls
            .iter()
            .map(|(req, _)| req.clone())
            .collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|req| req.url.ends_with(path)).count()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("lock")
            .calls
            .iter()
            .map(|(_, bearer)| bearer.clone())
            .collect()
    }

    pub fn tokens_issued(&self) -> usize {
        self.state.lock().expect("lock").tokens_issued
    }
}

pub fn param<'a>(request: &'a ApiRequest, key: &str) -> Option<&'a str> {
    request
        .params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn status(code: u16) -> TransportError {
    TransportError::Status {
        status: code,
        body: String::new(),
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get_json(
        &self,
        request: &ApiRequest,
        bearer: &str,
        _timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().expect("lock");
        state.calls.push((request.clone(), bearer.to_string()));
        let handler = state
            .handlers
            .iter_mut()
            .rev()
            .find(|(path, _)| request.url.ends_with(path.as_str()));
        match handler {
            Some((_, handler)) => handler(request, bearer),
            None => Err(status(404)),
        }
    }

    async fn issue_token(
        &self,
        _url: &str,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<TokenGrant, TransportError> {
        let mut state = self.state.lock().expect("lock");
        if state.token_failure {
            return Err(status(401));
        }
        state.tokens_issued += 1;
        Ok(TokenGrant {
            access_token: format!("token-{}", state.tokens_issued),
            expires_in: Some(3600),
        })
    }
}
