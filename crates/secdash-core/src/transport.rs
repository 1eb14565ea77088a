use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Credentials;
use crate::error::TransportError;

/// Identity of a GET request. Also the response-cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(
        &self,
        request: &ApiRequest,
        bearer: &str,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    async fn issue_token(
        &self,
        url: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<TokenGrant, TransportError>;
}

pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(
        &self,
        request: &ApiRequest,
        bearer: &str,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let response = self
            .http_client
            .get(&request.url)
            .query(&request.params)
            .bearer_auth(bearer)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::read_json(response).await
    }

    async fn issue_token(
        &self,
        url: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<TokenGrant, TransportError> {
        let response = self
            .http_client
            .post(url)
            .basic_auth(&credentials.api_key, Some(&credentials.api_secret))
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::read_json(response).await
    }
}
