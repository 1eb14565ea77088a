use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SnapshotError;
use crate::model::ZtnaActivityEntry;

const PREFIX: &str = "ztna_";
const SUFFIX: &str = ".json";

/// What to do when the current hour bucket already has a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketWritePolicy {
    /// Replace the bucket with this cycle's new entries only.
    #[default]
    Overwrite,
    /// Append this cycle's new entries to what the bucket already holds.
    Merge,
}

#[derive(Debug, Default)]
pub struct LoadedDay {
    pub entries: Vec<ZtnaActivityEntry>,
    pub unreadable: Vec<SnapshotError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub key: String,
    pub path: PathBuf,
    pub entries: usize,
}

/// Hour-bucketed ZTNA activity files, one JSON array per `{date}_{hour}` key.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

pub fn bucket_key(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y%m%d_%H").to_string()
}

fn day_prefix(day: NaiveDate) -> String {
    format!("{PREFIX}{}", day.format("%Y%m%d"))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bucket_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{PREFIX}{key}{SUFFIX}"))
    }

    fn ensure_dir(&self) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))
    }

    /// Snapshot file names in the directory, sorted. Other files are ignored.
    fn snapshot_files(&self) -> Result<Vec<(String, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
                continue;
            };
            if name.starts_with(PREFIX) && name.ends_with(SUFFIX) {
                files.push((name.to_string(), path.clone()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Deletes every snapshot that does not belong to `today`.
    pub fn expire_other_days(&self, today: NaiveDate) -> Result<Vec<PathBuf>, SnapshotError> {
        self.ensure_dir()?;
        let keep = day_prefix(today);
        let mut removed = Vec::new();
        for (name, path) in self.snapshot_files()? {
            if name.starts_with(&keep) {
                continue;
            }
            fs::remove_file(&path).map_err(io_err(&path))?;
            removed.push(path);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), dir = %self.dir.display(), "expired ztna snapshots from previous days");
        }
        Ok(removed)
    }

    /// Entries of every readable bucket for `day`. An unreadable bucket is reported in
    /// `unreadable` and does not hide the others.
    pub fn load_day(&self, day: NaiveDate) -> Result<LoadedDay, SnapshotError> {
        let prefix = day_prefix(day);
        let mut loaded = LoadedDay::default();
        for (name, path) in self.snapshot_files()? {
            if !name.starts_with(&prefix) {
                continue;
            }
            match read_bucket(&path) {
                Ok(entries) => loaded.entries.extend(entries),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable ztna bucket");
                    loaded.unreadable.push(err);
                }
            }
        }
        debug!(day = %day, entries = loaded.entries.len(), unreadable = loaded.unreadable.len(), "loaded persisted ztna entries");
        Ok(loaded)
    }

    pub fn write_bucket(
        &self,
        key: &str,
        entries: &[ZtnaActivityEntry],
        policy: BucketWritePolicy,
    ) -> Result<PathBuf, SnapshotError> {
        self.ensure_dir()?;
        let path = self.bucket_path(key);

        let mut content = match policy {
            BucketWritePolicy::Merge if path.exists() => read_bucket(&path).unwrap_or_else(|err| {
                warn!(error = %err, "existing ztna bucket is unreadable, replacing it");
                Vec::new()
            }),
            _ => Vec::new(),
        };
        content.extend_from_slice(entries);

        let bytes = serde_json::to_vec(&content).map_err(|source| SnapshotError::Json {
            path: path.clone(),
            source,
        })?;
        // the dot prefix keeps a leftover temp file out of snapshot listings
        let tmp = self.dir.join(format!(".{PREFIX}{key}{SUFFIX}.tmp"));
        fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        debug!(path = %path.display(), entries = content.len(), ?policy, "wrote ztna hour bucket");
        Ok(path)
    }

    pub fn list_buckets(&self) -> Result<Vec<BucketInfo>, SnapshotError> {
        self.snapshot_files()?
            .into_iter()
            .map(|(name, path)| {
                let entries = read_bucket(&path)?.len();
                let key = name
                    .strip_prefix(PREFIX)
                    .and_then(|v| v.strip_suffix(SUFFIX))
                    .unwrap_or(&name)
                    .to_string();
                Ok::<_, SnapshotError>(BucketInfo { key, path, entries })
            })
            .collect()
    }
}

fn read_bucket(path: &Path) -> Result<Vec<ZtnaActivityEntry>, SnapshotError> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })
}
