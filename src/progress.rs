use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dirs_next::data_dir;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProgressRecord {
    /// Offset in seconds, kept as text.
    pub offset: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressFile {
    entries: BTreeMap<String, ProgressRecord>,
}

/// Last watched offset per `(title, sequence)`, backed by a JSON file.
///
/// Every record lands in memory immediately; disk writes are spaced by
/// `flush_interval` and forced by [`ProgressStore::flush`].
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    file: ProgressFile,
    dirty: bool,
    last_flush: Option<Instant>,
    flush_interval: Duration,
}

impl ProgressStore {
    pub fn load(path: &Path, flush_interval: Duration) -> Result<Self> {
        let file = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("failed to read progress file {}", path.display()))?;
            match serde_json::from_str(&data) {
                Ok(file) => file,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "progress file unreadable, starting fresh");
                    ProgressFile::default()
                }
            }
        } else {
            ProgressFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            dirty: false,
            last_flush: None,
            flush_interval,
        })
    }

    pub fn key(title_id: &str, sequence: usize) -> String {
        format!("{title_id}:{sequence}")
    }

    pub fn offset(&self, title_id: &str, sequence: usize) -> Option<f64> {
        self.file
            .entries
            .get(&Self::key(title_id, sequence))
            .and_then(|record| record.offset.parse::<f64>().ok())
            .filter(|offset| offset.is_finite() && *offset > 0.0)
    }

    /// Overwrites the offset for the key and flushes if the interval allows.
    pub fn record(&mut self, title_id: &str, sequence: usize, offset: f64) -> Result<()> {
        self.file.entries.insert(
            Self::key(title_id, sequence),
            ProgressRecord {
                offset: format!("{offset:.3}"),
                saved_at: Utc::now(),
            },
        );
        self.dirty = true;
        let due = self
            .last_flush
            .is_none_or(|at| at.elapsed() >= self.flush_interval);
        if due { self.flush() } else { Ok(()) }
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create progress directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(&self.file)?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write progress file {}", self.path.display()))?;
        self.dirty = false;
        self.last_flush = Some(Instant::now());
        debug!(path = %self.path.display(), entries = self.file.entries.len(), "progress flushed");
        Ok(())
    }
}

pub fn progress_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("dramain").join("progress.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_reload_round_trips_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("progress.json");
        let mut store = ProgressStore::load(&path, Duration::ZERO).expect("load");
        store.record("t1", 3, 42.5).expect("record");

        let reloaded = ProgressStore::load(&path, Duration::ZERO).expect("reload");
        assert_eq!(reloaded.offset("t1", 3), Some(42.5));
        assert_eq!(reloaded.offset("t1", 4), None);
    }

    #[test]
    fn later_record_overwrites_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::load(&path, Duration::ZERO).expect("load");
        store.record("t1", 0, 15.0).expect("record");
        store.record("t1", 0, 30.0).expect("record");
        assert_eq!(store.offset("t1", 0), Some(30.0));
    }

    #[test]
    fn records_inside_interval_wait_for_flush() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::load(&path, Duration::from_secs(3600)).expect("load");
        store.record("t1", 0, 12.0).expect("first record flushes");
        store.record("t1", 0, 20.0).expect("second record is buffered");

        let on_disk = ProgressStore::load(&path, Duration::ZERO).expect("reload");
        assert_eq!(on_disk.offset("t1", 0), Some(12.0));

        store.flush().expect("flush");
        let on_disk = ProgressStore::load(&path, Duration::ZERO).expect("reload");
        assert_eq!(on_disk.offset("t1", 0), Some(20.0));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.json");
        fs::write(&path, "{not json").expect("write");
        let store = ProgressStore::load(&path, Duration::ZERO).expect("load");
        assert_eq!(store.offset("t1", 0), None);
    }
}
