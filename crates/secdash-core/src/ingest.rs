use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ZtnaConfig;
use crate::error::FetchError;
use crate::model::ZtnaActivityEntry;
use crate::snapshot::{bucket_key, SnapshotStore};

/// Millisecond range handed to the activity endpoint as `from`/`to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl TimeWindow {
    pub fn new(from_ms: i64, to_ms: i64) -> Self {
        Self { from_ms, to_ms }
    }

    pub fn is_empty(&self) -> bool {
        self.from_ms >= self.to_ms
    }

    /// Contiguous sub-windows covering the whole range; the last absorbs the remainder.
    pub fn split(self, parts: u64) -> Vec<TimeWindow> {
        if self.is_empty() {
            return Vec::new();
        }
        let parts = parts.max(1) as i64;
        let step = (self.to_ms - self.from_ms) / parts;
        if step == 0 {
            return vec![self];
        }
        (0..parts)
            .map(|idx| {
                let from_ms = self.from_ms + idx * step;
                let to_ms = if idx == parts - 1 {
                    self.to_ms
                } else {
                    from_ms + step
                };
                TimeWindow { from_ms, to_ms }
            })
            .collect()
    }
}

#[async_trait]
pub trait ZtnaSource: Send {
    async fn activity_page(
        &mut self,
        window: TimeWindow,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ZtnaActivityEntry>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    Expired,
    Catchup,
    Streaming(TimeWindow),
    Persisted,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub day_start: DateTime<FixedOffset>,
    pub window: TimeWindow,
    /// Today's persisted entries followed by this cycle's new ones, by timestamp.
    pub entries: Vec<ZtnaActivityEntry>,
    pub persisted_count: usize,
    pub new_count: usize,
    pub boundary_duplicates: usize,
    pub expired_files: usize,
    pub truncated_windows: usize,
    pub failed_windows: Vec<String>,
    pub bucket: Option<String>,
    pub snapshot_errors: Vec<String>,
}

pub struct ZtnaIngester {
    config: ZtnaConfig,
    store: SnapshotStore,
    state: IngestState,
}

impl ZtnaIngester {
    pub fn new(config: ZtnaConfig) -> Self {
        let store = SnapshotStore::new(config.snapshot_dir.clone());
        Self {
            config,
            store,
            state: IngestState::Idle,
        }
    }

    pub fn state(&self) -> &IngestState {
        &self.state
    }

    fn transition(&mut self, next: IngestState) {
        debug!(from = ?self.state, to = ?next, "ztna ingest state");
        self.state = next;
    }

    pub fn day_start(&self, now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let start = NaiveTime::from_hms_opt(self.config.day_start_hour.min(23), 0, 0)
            .unwrap_or(NaiveTime::MIN);
        now.offset()
            .from_local_datetime(&now.date_naive().and_time(start))
            .earliest()
            .unwrap_or(*now)
    }

    /// `from` resumes at the newest persisted timestamp, else at the day start.
    pub fn select_window(
        &self,
        persisted: &[ZtnaActivityEntry],
        now: &DateTime<FixedOffset>,
    ) -> TimeWindow {
        let from_ms = persisted
            .iter()
            .map(|entry| entry.timestamp_millis)
            .max()
            .unwrap_or_else(|| self.day_start(now).timestamp_millis());
        TimeWindow::new(from_ms, now.timestamp_millis())
    }

    pub async fn run_cycle<S: ZtnaSource>(
        &mut self,
        source: &mut S,
        now: DateTime<FixedOffset>,
    ) -> IngestOutcome {
        let mut snapshot_errors = Vec::new();

        let expired_files = match self.store.expire_other_days(now.date_naive()) {
            Ok(removed) => removed.len(),
            Err(err) => {
                warn!(error = %err, "failed to expire old ztna snapshots");
                snapshot_errors.push(err.to_string());
                0
            }
        };
        self.transition(IngestState::Expired);

        let persisted = match self.store.load_day(now.date_naive()) {
            Ok(loaded) => {
                snapshot_errors.extend(loaded.unreadable.iter().map(ToString::to_string));
                loaded.entries
            }
            Err(err) => {
                warn!(error = %err, "failed to load today's ztna snapshots");
                snapshot_errors.push(err.to_string());
                Vec::new()
            }
        };
        let window = self.select_window(&persisted, &now);
        self.transition(IngestState::Catchup);

        let mut fetched = Vec::new();
        let mut truncated_windows = 0;
        let mut failed_windows = Vec::new();
        for sub_window in window.split(self.config.sub_window_count()) {
            self.transition(IngestState::Streaming(sub_window));
            match self.stream_window(source, sub_window, &mut fetched).await {
                Ok(true) => truncated_windows += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(from = sub_window.from_ms, to = sub_window.to_ms, error = %err, "ztna sub-window fetch failed, skipping");
                    failed_windows.push(format!(
                        "{}..{}: {err}",
                        sub_window.from_ms, sub_window.to_ms
                    ));
                }
            }
        }

        let before = fetched.len();
        if !persisted.is_empty() {
            fetched.retain(|entry| {
                entry.timestamp_millis != window.from_ms || !persisted.contains(entry)
            });
        }
        let boundary_duplicates = before - fetched.len();
        fetched.sort_by_key(|entry| entry.timestamp_millis);

        let mut bucket = None;
        if !fetched.is_empty() {
            let key = bucket_key(&now);
            match self
                .store
                .write_bucket(&key, &fetched, self.config.bucket_write)
            {
                Ok(path) => {
                    debug!(path = %path.display(), "persisted ztna bucket");
                    bucket = Some(key);
                }
                Err(err) => {
                    warn!(error = %err, "failed to persist ztna bucket");
                    snapshot_errors.push(err.to_string());
                }
            }
        }
        self.transition(IngestState::Persisted);

        let persisted_count = persisted.len();
        let new_count = fetched.len();
        let mut entries = persisted;
        entries.extend(fetched);
        entries.sort_by_key(|entry| entry.timestamp_millis);

        info!(
            persisted = persisted_count,
            new = new_count,
            boundary_duplicates,
            truncated_windows,
            failed = failed_windows.len(),
            "ztna ingest cycle finished"
        );

        IngestOutcome {
            day_start: self.day_start(&now),
            window,
            entries,
            persisted_count,
            new_count,
            boundary_duplicates,
            expired_files,
            truncated_windows,
            failed_windows,
            bucket,
            snapshot_errors,
        }
    }

    /// Pages one sub-window. Returns `true` when the offset ceiling cut it short.
    async fn stream_window<S: ZtnaSource>(
        &self,
        source: &mut S,
        window: TimeWindow,
        out: &mut Vec<ZtnaActivityEntry>,
    ) -> Result<bool, FetchError> {
        let page_size = self.config.page_size.max(1);
        let mut offset = 0_u64;
        loop {
            let page = source.activity_page(window, page_size, offset).await?;
            let received = page.len() as u64;
            out.extend(page);
            if received < page_size {
                return Ok(false);
            }
            offset += page_size;
            if offset >= self.config.max_offset {
                // entries past the ceiling are not reachable for this window
                warn!(from = window.from_ms, to = window.to_ms, offset, "ztna offset ceiling reached, window truncated");
                return Ok(true);
            }
        }
    }
}
