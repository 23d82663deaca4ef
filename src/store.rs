//! Persistent store: the canonical on-disk snapshot of all current records.
//!
//! `load`/`save` always operate on the full array — the working set is one
//! record per live station, so rewriting the whole file per mutation trades
//! throughput for trivial consistency (§4.2). `save` is crash-safe: the full
//! array is written to a sibling temporary file, then renamed over the
//! canonical path with `std::fs::rename`, which is atomic as long as both
//! paths share a volume.

use std::path::{Path, PathBuf};

use crate::model::Record;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The backing file for the aggregate. Does not cache records in memory —
/// every `load`/`save` round-trips the canonical file, matching the
/// "readers never observe a half-written file" contract (§4.2).
#[derive(Debug, Clone)]
pub struct PersistentStore {
    path: PathBuf,
}

impl PersistentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Returns the empty list if the file is absent, empty, or unparsable.
    /// A parse failure is logged and treated as an empty store rather than
    /// propagated, per §4.2.
    pub fn load(&self) -> Vec<Record> {
        let raw = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read store file, treating as empty");
                return Vec::new();
            }
        };
        if raw.is_empty() {
            return Vec::new();
        }
        match serde_json::from_slice::<Vec<Record>>(&raw) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to parse store file, treating as empty");
                Vec::new()
            }
        }
    }

    /// Crash-safe replace: write to `<path>.tmp`, then rename over `path`.
    pub fn save(&self, records: &[Record]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = crate::model::encode_list(records);
        let tmp = self.tmp_path();
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Deletes the canonical file if present. Run during shutdown.
    pub fn purge(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, last_updated: i64) -> Record {
        let mut r = Record {
            id: id.to_owned(),
            name: String::new(),
            state: String::new(),
            time_zone: String::new(),
            local_date_time: String::new(),
            local_date_time_full: String::new(),
            cloud: String::new(),
            wind_dir: String::new(),
            lat: 0.0,
            lon: 0.0,
            air_temp: 0.0,
            apparent_t: 0.0,
            dewpt: 0.0,
            press: 0.0,
            rel_hum: 0,
            wind_spd_kmh: 0,
            wind_spd_kt: 0,
            last_updated: 0,
        };
        r.last_updated = last_updated;
        r
    }

    #[test]
    fn load_on_absent_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("weather_data.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("weather_data.json"));
        let records = vec![record("VIC01", 10), record("SA01", 20)];
        store.save(&records).unwrap();
        let loaded = store.load();
        assert_eq!(loaded, records);
    }

    #[test]
    fn save_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("weather_data.json"));
        store.save(&[record("VIC01", 10)]).unwrap();
        assert!(!dir.path().join("weather_data.tmp").exists());
        assert!(dir.path().join("weather_data.json").exists());
    }

    #[test]
    fn load_on_corrupt_file_returns_empty_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_data.json");
        std::fs::write(&path, b"{ not valid json").unwrap();
        let store = PersistentStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn purge_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("weather_data.json"));
        store.save(&[record("VIC01", 10)]).unwrap();
        store.purge().unwrap();
        assert!(!store.path().exists());
        store.purge().unwrap();
    }
}
