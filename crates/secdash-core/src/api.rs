use std::collections::BTreeSet;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::ingest::{TimeWindow, ZtnaSource};
use crate::model::{EnrollmentSummary, Identity, PrivateResource, VpnConnection, ZtnaActivityEntry};
use crate::pagination::{Page, PageSource, Paginated, Paginator, StopPolicy};
use crate::session::Session;
use crate::transport::{ApiRequest, HttpTransport};

pub const TOKEN_PATH: &str = "/auth/v2/token";
pub const IDENTITIES_PATH: &str = "/reports/v2/identities";
pub const USER_SUMMARIES_PATH: &str = "/admin/v2/ztna/userSummaries";
pub const VPN_CONNECTIONS_PATH: &str = "/admin/v2/vpn/userConnections";
pub const PRIVATE_RESOURCES_PATH: &str = "/policies/v2/privateResources";
pub const ZTNA_ACTIVITY_PATH: &str = "/reports/v2/activity/ztna";

/// Typed access to the vendor API. Owns the session and re-authorizes on expiry or 401.
pub struct SseClient<T: HttpTransport> {
    fetcher: Fetcher<T>,
    credentials: Credentials,
    base_url: String,
    session: Option<Session>,
}

impl<T: HttpTransport> SseClient<T> {
    pub fn new(fetcher: Fetcher<T>, credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn session(&mut self) -> Result<Session, FetchError> {
        let now = self.fetcher.clock().instant();
        if let Some(session) = self.session.as_ref().filter(|s| !s.is_expired(now)) {
            return Ok(session.clone());
        }
        let token_url = self.url(TOKEN_PATH);
        let session = self.fetcher.authorize(&token_url, &self.credentials).await?;
        info!("obtained bearer token");
        self.session = Some(session.clone());
        Ok(session)
    }

    pub async fn get(&mut self, request: &ApiRequest) -> Result<Value, FetchError> {
        let session = self.session().await?;
        match self.fetcher.fetch(request, &session).await {
            Err(err) if err.is_unauthorized() => {
                info!(url = %request.url, "bearer token rejected, re-authorizing");
                self.session = None;
                let session = self.session().await?;
                self.fetcher.fetch(request, &session).await
            }
            other => other,
        }
    }

    pub async fn fetch_identities(&mut self, limit: u32) -> Result<Vec<Identity>, FetchError> {
        let url = self.url(IDENTITIES_PATH);
        let request = ApiRequest::new(url.clone())
            .param("limit", limit)
            .param("offset", 0)
            .param("identitytypes", "directory_user");
        let mut body = self.get(&request).await?;
        let identities: Vec<Identity> = take_items(&url, &mut body, "data")?;
        info!(count = identities.len(), "fetched directory identities");
        Ok(identities)
    }

    pub async fn fetch_user_summaries(
        &mut self,
        user_ids: &[i64],
        chunk_size: usize,
    ) -> Result<Vec<EnrollmentSummary>, FetchError> {
        let url = self.url(USER_SUMMARIES_PATH);
        let mut summaries = Vec::new();
        for chunk in user_ids.chunks(chunk_size.max(1)) {
            let ids = chunk
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let request = ApiRequest::new(url.clone()).param("userIds", ids);
            let mut body = self.get(&request).await?;
            let batch: Vec<EnrollmentSummary> = take_items(&url, &mut body, "users")?;
            debug!(requested = chunk.len(), returned = batch.len(), "user summary chunk");
            summaries.extend(batch);
        }
        Ok(summaries)
    }

    pub async fn fetch_vpn_connections(
        &mut self,
        page_size: u64,
    ) -> Result<Paginated<VpnConnection>, FetchError> {
        let url = self.url(VPN_CONNECTIONS_PATH);
        let mut pages = EndpointPages::<T, VpnConnection>::new(self, url, "data");
        Paginator::new(page_size, StopPolicy::ShortPage)
            .collect(&mut pages)
            .await
    }

    pub async fn fetch_private_resources(
        &mut self,
        page_size: u64,
    ) -> Result<BTreeSet<String>, FetchError> {
        let url = self.url(PRIVATE_RESOURCES_PATH);
        let mut pages = EndpointPages::<T, PrivateResource>::new(self, url, "items");
        let resources = Paginator::new(page_size, StopPolicy::ReachedTotal)
            .collect(&mut pages)
            .await?;
        Ok(resources.items.into_iter().map(|r| r.name).collect())
    }
}

#[async_trait]
impl<T: HttpTransport> ZtnaSource for SseClient<T> {
    async fn activity_page(
        &mut self,
        window: TimeWindow,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ZtnaActivityEntry>, FetchError> {
        let url = self.url(ZTNA_ACTIVITY_PATH);
        let request = ApiRequest::new(url.clone())
            .param("from", window.from_ms)
            .param("to", window.to_ms)
            .param("limit", limit)
            .param("offset", offset);
        let mut body = self.get(&request).await?;
        take_items(&url, &mut body, "data")
    }
}

/// Offset-paged endpoint whose body is `{<items_key>: [...], total?}`.
struct EndpointPages<'a, T: HttpTransport, I> {
    client: &'a mut SseClient<T>,
    url: String,
    items_key: &'static str,
    _item: PhantomData<fn() -> I>,
}

impl<'a, T: HttpTransport, I> EndpointPages<'a, T, I> {
    fn new(client: &'a mut SseClient<T>, url: String, items_key: &'static str) -> Self {
        Self {
            client,
            url,
            items_key,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<'a, T: HttpTransport, I: DeserializeOwned + Send> PageSource for EndpointPages<'a, T, I> {
    type Item = I;

    async fn fetch_page(&mut self, offset: u64, limit: u64) -> Result<Page<I>, FetchError> {
        let request = ApiRequest::new(self.url.clone())
            .param("limit", limit)
            .param("offset", offset);
        let mut body = self.client.get(&request).await?;
        let items = take_items(&self.url, &mut body, self.items_key)?;
        let total = body.get("total").and_then(Value::as_u64);
        Ok(Page { items, total })
    }
}

/// An absent or null list reads as empty.
fn take_items<I: DeserializeOwned>(url: &str, body: &mut Value, key: &str) -> Result<Vec<I>, FetchError> {
    match body.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => serde_json::from_value(items).map_err(|err| FetchError::Decode {
            url: url.to_string(),
            reason: format!("field {key:?}: {err}"),
        }),
    }
}
