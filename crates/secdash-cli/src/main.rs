use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use secdash_core::config::DEFAULT_BASE_URL;
use secdash_core::{
    Branding, BucketWritePolicy, Clock, Credentials, Dashboard, DashboardConfig, HttpTransport,
    ReqwestTransport, RetryPolicy, SnapshotStore, SystemClock, ZtnaConfig,
};
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(test)]
mod cli_tests;
mod render;
mod viewer;

#[derive(Debug, Parser)]
#[command(name = "secdash")]
#[command(about = "Secure access operations dashboard (read-only)")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, default_value = "./ztna_data")]
    snapshot_dir: PathBuf,

    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    #[arg(long, default_value_t = 3600)]
    cache_ttl_secs: u64,

    /// IANA zone used for the day start, hour buckets and displayed times.
    #[arg(long, default_value = "America/Mexico_City")]
    timezone: String,

    /// Fixed local offset in minutes east of UTC; overrides `--timezone`.
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    #[arg(long, default_value_t = 5)]
    day_start_hour: u32,

    /// Merge into an existing hour bucket instead of replacing it.
    #[arg(long)]
    merge_hour_buckets: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Once {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Watch {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    View {
        #[arg(long, default_value_t = 300)]
        refresh_secs: u64,
    },
    /// List the persisted ZTNA hour buckets.
    Snapshots,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

impl Cli {
    fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_retries,
                initial_delay: Duration::from_millis(self.retry_delay_ms),
                ..RetryPolicy::default()
            },
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            ztna: ZtnaConfig {
                snapshot_dir: self.snapshot_dir.clone(),
                day_start_hour: self.day_start_hour,
                bucket_write: if self.merge_hour_buckets {
                    BucketWritePolicy::Merge
                } else {
                    BucketWritePolicy::Overwrite
                },
                ..ZtnaConfig::default()
            },
            ..DashboardConfig::default()
        }
    }

    fn clock(&self) -> Result<Arc<dyn Clock>> {
        match self.utc_offset_minutes {
            Some(minutes) => {
                let offset = FixedOffset::east_opt(minutes * 60)
                    .with_context(|| format!("invalid utc offset: {minutes} minutes"))?;
                Ok(Arc::new(SystemClock::with_offset(offset)))
            }
            None => {
                let zone: Tz = self
                    .timezone
                    .parse()
                    .map_err(|err| anyhow!("invalid timezone {:?}: {err}", self.timezone))?;
                Ok(Arc::new(SystemClock::with_zone(zone)))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cli.dashboard_config();
    config.validate()?;

    if let Command::Snapshots = cli.command {
        let buckets = SnapshotStore::new(&config.ztna.snapshot_dir).list_buckets()?;
        println!("{}", serde_json::to_string_pretty(&buckets)?);
        return Ok(());
    }

    let credentials = Credentials::from_env()?;
    let branding = Branding::from_env();
    for missing in branding.missing_logos() {
        warn!(path = %missing.display(), "logo file not found");
    }
    let clock = cli.clock()?;
    let mut dashboard = Dashboard::new(ReqwestTransport::default(), clock, credentials, config);

    match cli.command {
        Command::Once { format } => {
            let snapshot = dashboard.refresh().await;
            print_snapshot(&snapshot, format)?;
        }
        Command::Watch {
            format,
            interval_secs,
        } => {
            stream_loop(&mut dashboard, format, Duration::from_secs(interval_secs)).await?;
        }
        Command::View { refresh_secs } => {
            viewer::run_viewer(&mut dashboard, &branding, Duration::from_secs(refresh_secs)).await?;
        }
        Command::Snapshots => {}
    }

    Ok(())
}

async fn stream_loop<T: HttpTransport>(
    dashboard: &mut Dashboard<T>,
    format: OutputFormat,
    interval: Duration,
) -> Result<()> {
    let start = Instant::now() + Duration::from_millis(50);
    let mut ticker = interval_at(start, interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = dashboard.refresh().await;
                print_snapshot(&snapshot, format)?;
                info!(refresh = dashboard.refreshes(), refresh_ms = %snapshot.refresh_ms, failures = snapshot.failures.len(), "refresh");
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &secdash_core::DashboardSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        }
        OutputFormat::Ndjson => {
            println!("{}", serde_json::to_string(snapshot)?);
        }
        OutputFormat::Human => {
            print!("{}", render::human(snapshot));
        }
    }

    Ok(())
}
