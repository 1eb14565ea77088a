use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{info, warn};

use crate::api::SseClient;
use crate::clock::Clock;
use crate::config::{Credentials, DashboardConfig};
use crate::fetcher::Fetcher;
use crate::ingest::ZtnaIngester;
use crate::reconcile::{reconcile, IdentifierMap};
use crate::report::{enrollment_report, vpn_report, ztna_report, EnrollmentReport, VpnReport, ZtnaReport};
use crate::transport::HttpTransport;

/// Everything one refresh cycle produced. A section is `None` when its data could not be fetched.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub ts: DateTime<FixedOffset>,
    pub refresh_ms: u128,
    pub enrollment: Option<EnrollmentReport>,
    pub vpn: Option<VpnReport>,
    pub ztna: Option<ZtnaReport>,
    pub failures: Vec<String>,
}

pub struct Dashboard<T: HttpTransport> {
    client: SseClient<T>,
    ingester: ZtnaIngester,
    clock: Arc<dyn Clock>,
    config: DashboardConfig,
    refreshes: u64,
}

impl<T: HttpTransport> Dashboard<T> {
    pub fn new(
        transport: T,
        clock: Arc<dyn Clock>,
        credentials: Credentials,
        config: DashboardConfig,
    ) -> Self {
        let fetcher = Fetcher::new(
            transport,
            clock.clone(),
            config.retry,
            config.request_timeout,
            config.cache_ttl,
        );
        let client = SseClient::new(fetcher, credentials, config.base_url.clone());
        let ingester = ZtnaIngester::new(config.ztna.clone());
        Self {
            client,
            ingester,
            clock,
            config,
            refreshes: 0,
        }
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn ingester(&self) -> &ZtnaIngester {
        &self.ingester
    }

    pub async fn refresh(&mut self) -> DashboardSnapshot {
        let started = Instant::now();
        let mut failures = Vec::new();
        self.refreshes += 1;

        if let Err(err) = self.client.session().await {
            warn!(error = %err, "cannot authorize against the vendor api");
            failures.push(format!("auth: {err}"));
            return DashboardSnapshot {
                ts: self.clock.now(),
                refresh_ms: started.elapsed().as_millis(),
                enrollment: None,
                vpn: None,
                ztna: None,
                failures,
            };
        }

        let (enrollment, identifiers) = match self.enrollment_section().await {
            Ok((report, identifiers)) => (Some(report), identifiers),
            Err(err) => {
                warn!(error = %err, "enrollment section unavailable");
                failures.push(format!("enrollment: {err}"));
                (None, IdentifierMap::default())
            }
        };

        let vpn = match self
            .client
            .fetch_vpn_connections(self.config.vpn_page_size)
            .await
        {
            Ok(paged) => {
                info!(connections = paged.items.len(), total = ?paged.reported_total, "fetched machine tunnel connections");
                Some(vpn_report(
                    &paged.items,
                    &identifiers,
                    paged.reported_total,
                    self.clock.now(),
                ))
            }
            Err(err) => {
                warn!(error = %err, "vpn section unavailable");
                failures.push(format!("vpn: {err}"));
                None
            }
        };

        let now = self.clock.now();
        let outcome = self.ingester.run_cycle(&mut self.client, now).await;
        let catalog = match self
            .client
            .fetch_private_resources(self.config.resources_page_size)
            .await
        {
            Ok(catalog) => Some(catalog),
            Err(err) => {
                warn!(error = %err, "private resource catalog unavailable");
                failures.push(format!("private resources: {err}"));
                None
            }
        };
        let ztna = ztna_report(outcome, catalog.as_ref(), now);

        DashboardSnapshot {
            ts: self.clock.now(),
            refresh_ms: started.elapsed().as_millis(),
            enrollment,
            vpn,
            ztna: Some(ztna),
            failures,
        }
    }

    async fn enrollment_section(
        &mut self,
    ) -> Result<(EnrollmentReport, IdentifierMap), crate::error::FetchError> {
        let identities = self
            .client
            .fetch_identities(self.config.identities_limit)
            .await?;
        let ids: Vec<i64> = identities.iter().map(|identity| identity.id).collect();
        let summaries = self
            .client
            .fetch_user_summaries(&ids, self.config.summary_chunk_size)
            .await?;

        let reconciled = reconcile(&identities, &summaries);
        if !reconciled.malformed.is_empty() {
            warn!(count = reconciled.malformed.len(), "identities with malformed labels were excluded");
        }
        let identifiers = IdentifierMap::from_rows(&reconciled.enrolled);
        if identifiers.is_empty() && !reconciled.enrolled.is_empty() {
            warn!("no enrolled user email carries a device code, vpn sessions will show as unknown");
        }
        info!(
            enrolled = reconciled.enrolled.len(),
            unenrolled = reconciled.unenrolled.len(),
            identifiers = identifiers.len(),
            "reconciled identities"
        );
        Ok((enrollment_report(identities.len(), reconciled), identifiers))
    }
}
