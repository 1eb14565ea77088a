pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod model;
pub mod pagination;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod transport;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod ingest_tests;

pub use api::SseClient;
pub use clock::{Clock, SystemClock};
pub use config::{Branding, Credentials, DashboardConfig, ZtnaConfig};
pub use dashboard::{Dashboard, DashboardSnapshot};
pub use error::{FetchError, ParseError, SnapshotError, TransportError};
pub use fetcher::{Fetcher, RetryPolicy};
pub use ingest::{IngestOutcome, IngestState, TimeWindow, ZtnaIngester, ZtnaSource};
pub use snapshot::{BucketInfo, BucketWritePolicy, LoadedDay, SnapshotStore};
pub use transport::{ApiRequest, HttpTransport, ReqwestTransport};
