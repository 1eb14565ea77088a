use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ZtnaConfig;
use crate::error::{FetchError, TransportError};
use crate::ingest::{IngestState, TimeWindow, ZtnaIngester, ZtnaSource};
use crate::model::ZtnaActivityEntry;
use crate::snapshot::{BucketWritePolicy, SnapshotStore};
use crate::testing::{entry, local, make_temp_dir};

/// Serves `[from, to)` slices of a fixed entry list, newest first like the vendor.
struct FakeActivity {
    entries: Vec<ZtnaActivityEntry>,
    calls: Vec<(TimeWindow, u64)>,
    fail_window: Option<usize>,
}

impl FakeActivity {
    fn new(entries: Vec<ZtnaActivityEntry>) -> Self {
        Self {
            entries,
            calls: Vec::new(),
            fail_window: None,
        }
    }

    fn windows(&self) -> Vec<TimeWindow> {
        let mut seen: Vec<TimeWindow> = Vec::new();
        for (window, _) in &self.calls {
            if seen.last() != Some(window) {
                seen.push(*window);
            }
        }
        seen
    }
}

#[async_trait]
impl ZtnaSource for FakeActivity {
    async fn activity_page(
        &mut self,
        window: TimeWindow,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ZtnaActivityEntry>, FetchError> {
        self.calls.push((window, offset));
        if let Some(idx) = self.fail_window {
            if self.windows().len() == idx + 1 {
                return Err(FetchError::Exhausted {
                    url: "ztna".into(),
                    attempts: 5,
                    cause: TransportError::Timeout,
                });
            }
        }
        let mut matching: Vec<ZtnaActivityEntry> = self
            .entries
            .iter()
            .filter(|e| e.timestamp_millis >= window.from_ms && e.timestamp_millis < window.to_ms)
            .cloned()
            .collect();
        matching.sort_by_key(|e| std::cmp::Reverse(e.timestamp_millis));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

fn config(dir: &PathBuf) -> ZtnaConfig {
    ZtnaConfig {
        snapshot_dir: dir.clone(),
        ..ZtnaConfig::default()
    }
}

fn ms(h: u32, min: u32) -> i64 {
    local(2026, 10, 18, h, min).timestamp_millis()
}

#[test]
fn window_splits_into_contiguous_parts() {
    let window = TimeWindow::new(1_000, 1_010);

    let parts = window.split(3);

    assert_eq!(
        parts,
        vec![
            TimeWindow::new(1_000, 1_003),
            TimeWindow::new(1_003, 1_006),
            TimeWindow::new(1_006, 1_010),
        ]
    );
    assert!(TimeWindow::new(5, 5).split(3).is_empty());
    assert_eq!(TimeWindow::new(0, 2).split(3), vec![TimeWindow::new(0, 2)]);
}

#[tokio::test]
async fn first_run_of_day_starts_at_five_and_persists_bucket() {
    // Arrange
    let dir = make_temp_dir("first-run");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![
        entry(ms(4, 59), "too-early"),
        entry(ms(6, 0), "erp"),
        entry(ms(8, 15), "wiki"),
    ]);
    let now = local(2026, 10, 18, 9, 30);

    // Act
    let outcome = ingester.run_cycle(&mut source, now).await;

    // Assert
    assert_eq!(outcome.window, TimeWindow::new(ms(5, 0), ms(9, 30)));
    assert_eq!(source.windows().len(), 3);
    assert_eq!(outcome.new_count, 2);
    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.bucket.as_deref(), Some("20261018_09"));
    assert!(dir.join("ztna_20261018_09.json").exists());
    assert_eq!(ingester.state(), &IngestState::Persisted);
    assert!(outcome.snapshot_errors.is_empty());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn rerun_with_same_now_does_not_duplicate() {
    // Arrange
    let dir = make_temp_dir("idempotent");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![
        entry(ms(6, 0), "erp"),
        entry(ms(7, 0), "erp"),
        entry(ms(8, 0), "wiki"),
    ]);
    let now = local(2026, 10, 18, 9, 30);
    let first = ingester.run_cycle(&mut source, now).await;

    // Act
    let second = ingester.run_cycle(&mut source, now).await;

    // Assert
    assert_eq!(first.entries.len(), 3);
    assert_eq!(second.window.from_ms, ms(8, 0));
    assert_eq!(second.persisted_count, 3);
    assert_eq!(second.new_count, 0);
    assert_eq!(second.boundary_duplicates, 1);
    assert_eq!(second.entries.len(), 3);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn same_hour_rerun_overwrites_bucket_with_latest_entries() {
    // Arrange
    let dir = make_temp_dir("overwrite");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![entry(ms(6, 0), "erp"), entry(ms(7, 0), "erp")]);
    ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 10)).await;
    source.entries.push(entry(ms(9, 20), "wiki"));

    // Act
    let second = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 40)).await;

    // Assert
    assert_eq!(second.entries.len(), 3);
    let persisted = SnapshotStore::new(&dir)
        .load_day(local(2026, 10, 18, 9, 40).date_naive())
        .expect("load")
        .entries;
    assert_eq!(persisted, vec![entry(ms(9, 20), "wiki")]);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn merge_policy_keeps_earlier_bucket_entries() {
    let dir = make_temp_dir("merge");
    let mut ingester = ZtnaIngester::new(ZtnaConfig {
        bucket_write: BucketWritePolicy::Merge,
        ..config(&dir)
    });
    let mut source = FakeActivity::new(vec![entry(ms(6, 0), "erp")]);
    ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 10)).await;
    source.entries.push(entry(ms(9, 20), "wiki"));

    ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 40)).await;

    let persisted = SnapshotStore::new(&dir)
        .load_day(local(2026, 10, 18, 9, 40).date_naive())
        .expect("load")
        .entries;
    assert_eq!(persisted.len(), 2);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn new_day_expires_old_snapshots_and_restarts_at_five() {
    // Arrange
    let dir = make_temp_dir("rollover");
    let store = SnapshotStore::new(&dir);
    let yesterday_entry = entry(local(2026, 10, 17, 22, 0).timestamp_millis(), "erp");
    store
        .write_bucket("20261017_22", &[yesterday_entry], BucketWritePolicy::Overwrite)
        .expect("seed yesterday");
    let unrelated = dir.join("notes.txt");
    fs::write(&unrelated, "keep").expect("write unrelated");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![]);

    // Act
    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 7, 0)).await;

    // Assert
    assert_eq!(outcome.expired_files, 1);
    assert!(!dir.join("ztna_20261017_22.json").exists());
    assert!(unrelated.exists(), "non-snapshot files are never removed");
    assert_eq!(outcome.window.from_ms, ms(5, 0));
    assert_eq!(outcome.persisted_count, 0);
    assert!(outcome.bucket.is_none(), "empty cycles write nothing");

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn offset_ceiling_truncates_window() {
    // Arrange
    let dir = make_temp_dir("ceiling");
    let mut ingester = ZtnaIngester::new(ZtnaConfig {
        max_offset: 4,
        page_size: 2,
        ..config(&dir)
    });
    let busy: Vec<_> = (0..10).map(|i| entry(ms(5, 1) + i, "erp")).collect();
    let mut source = FakeActivity::new(busy);

    // Act
    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 0)).await;

    // Assert
    assert_eq!(outcome.truncated_windows, 1);
    assert_eq!(outcome.new_count, 4);
    let first_window_offsets: Vec<u64> = source
        .calls
        .iter()
        .filter(|(w, _)| w.from_ms == ms(5, 0))
        .map(|(_, offset)| *offset)
        .collect();
    assert_eq!(first_window_offsets, vec![0, 2]);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn failed_sub_window_is_skipped() {
    let dir = make_temp_dir("failed-window");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![entry(ms(5, 30), "erp"), entry(ms(8, 45), "wiki")]);
    source.fail_window = Some(0);

    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 0)).await;

    assert_eq!(outcome.failed_windows.len(), 1);
    assert_eq!(outcome.new_count, 1);
    assert_eq!(outcome.entries[0].timestamp_millis, ms(8, 45));

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn before_day_start_nothing_is_fetched() {
    let dir = make_temp_dir("early");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![entry(ms(3, 0), "erp")]);

    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 4, 30)).await;

    assert!(outcome.window.is_empty());
    assert!(source.calls.is_empty());
    assert!(outcome.entries.is_empty());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn snapshot_io_failure_still_returns_entries() {
    // Arrange
    let dir = make_temp_dir("io-failure");
    let blocker = dir.join("not-a-dir");
    fs::write(&blocker, "file").expect("write blocker");
    let mut ingester = ZtnaIngester::new(config(&blocker));
    let mut source = FakeActivity::new(vec![entry(ms(6, 0), "erp")]);

    // Act
    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 0)).await;

    // Assert
    assert_eq!(outcome.entries.len(), 1);
    assert!(outcome.bucket.is_none());
    assert!(!outcome.snapshot_errors.is_empty());

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn torn_bucket_does_not_hide_the_rest_of_the_day() {
    // Arrange
    let dir = make_temp_dir("torn-bucket");
    let store = SnapshotStore::new(&dir);
    let earlier = vec![entry(ms(6, 0), "erp"), entry(ms(7, 0), "erp"), entry(ms(8, 0), "wiki")];
    store
        .write_bucket("20261018_08", &earlier, BucketWritePolicy::Overwrite)
        .expect("seed earlier bucket");
    fs::write(dir.join("ztna_20261018_09.json"), "[{\"timestamp\": 17").expect("write torn bucket");
    let mut all = earlier.clone();
    all.push(entry(ms(9, 10), "crm"));
    let mut source = FakeActivity::new(all);
    let mut ingester = ZtnaIngester::new(config(&dir));

    // Act
    let first = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 30)).await;
    let second = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 40)).await;

    // Assert
    assert_eq!(first.window.from_ms, ms(8, 0));
    assert_eq!(first.persisted_count, 3);
    assert_eq!(first.snapshot_errors.len(), 1);
    assert!(second.snapshot_errors.is_empty(), "the torn bucket was replaced");
    let stamps: Vec<i64> = second.entries.iter().map(|e| e.timestamp_millis).collect();
    assert_eq!(stamps, vec![ms(6, 0), ms(7, 0), ms(8, 0), ms(9, 10)]);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn bucket_write_leaves_no_temp_file_behind() {
    let dir = make_temp_dir("atomic-write");
    let store = SnapshotStore::new(&dir);

    store
        .write_bucket("20261018_09", &[entry(ms(9, 0), "erp")], BucketWritePolicy::Overwrite)
        .expect("write");

    let names: Vec<String> = fs::read_dir(&dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["ztna_20261018_09.json".to_string()]);

    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn merged_entries_are_ordered_by_timestamp() {
    let dir = make_temp_dir("ordering");
    let mut ingester = ZtnaIngester::new(config(&dir));
    let mut source = FakeActivity::new(vec![
        entry(ms(8, 0), "c"),
        entry(ms(6, 0), "a"),
        entry(ms(7, 0), "b"),
    ]);

    let outcome = ingester.run_cycle(&mut source, local(2026, 10, 18, 9, 0)).await;

    let stamps: Vec<i64> = outcome.entries.iter().map(|e| e.timestamp_millis).collect();
    assert_eq!(stamps, vec![ms(6, 0), ms(7, 0), ms(8, 0)]);

    let _ = fs::remove_dir_all(dir);
}
