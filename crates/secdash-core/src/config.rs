use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetcher::RetryPolicy;
use crate::snapshot::BucketWritePolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.sse.cisco.com";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub identities_limit: u32,
    pub summary_chunk_size: usize,
    pub vpn_page_size: u64,
    pub resources_page_size: u64,
    pub ztna: ZtnaConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(3600),
            identities_limit: 2000,
            summary_chunk_size: 100,
            vpn_page_size: 500,
            resources_page_size: 100,
            ztna: ZtnaConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.base_url.starts_with("http://") || self.base_url.starts_with("https://");
        if !ok {
            return Err(ConfigError::BaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ZtnaConfig {
    pub snapshot_dir: PathBuf,
    /// Largest `offset` the activity endpoint honors for one time window.
    pub max_offset: u64,
    pub page_size: u64,
    /// Hour of the local day where the activity window starts when nothing is cached.
    pub day_start_hour: u32,
    pub bucket_write: BucketWritePolicy,
}

impl Default for ZtnaConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("./ztna_data"),
            max_offset: 15_000,
            page_size: 5_000,
            day_start_hour: 5,
            bucket_write: BucketWritePolicy::Overwrite,
        }
    }
}

impl ZtnaConfig {
    pub fn sub_window_count(&self) -> u64 {
        (self.max_offset / self.page_size.max(1)).max(1)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = dotenvy::var("API_KEY").map_err(|_| ConfigError::MissingVar("API_KEY"))?;
        let api_secret =
            dotenvy::var("API_SECRET").map_err(|_| ConfigError::MissingVar("API_SECRET"))?;
        Ok(Self {
            api_key,
            api_secret,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Branding {
    pub logo_paths: Vec<PathBuf>,
}

impl Branding {
    pub fn from_env() -> Self {
        let logo_paths = ["LOGO1_PATH", "LOGO2_PATH"]
            .into_iter()
            .filter_map(|key| dotenvy::var(key).ok())
            .map(PathBuf::from)
            .collect();
        Self { logo_paths }
    }

    pub fn missing_logos(&self) -> Vec<PathBuf> {
        self.logo_paths
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect()
    }
}
