//! Expiry sweeper (§4.6): a periodic timer that removes records whose
//! `_last_updated` is older than the TTL, and tells the pipeline to forget
//! the corresponding publisher-clock entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::pipeline::{PipelineHandle, WorkItem, WorkKind};
use crate::store::PersistentStore;
use crate::time::now_unix_secs;

pub struct SweeperHandle {
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Spawns the periodic sweep task. `period` is the tick interval (default
/// 10s); `ttl` is the max record age (default 30s).
pub fn spawn(
    store: Arc<Mutex<PersistentStore>>,
    pipeline: PipelineHandle,
    period: Duration,
    ttl: Duration,
) -> SweeperHandle {
    let task = tokio::spawn(run(store, pipeline, period, ttl));
    SweeperHandle { task }
}

async fn run(store: Arc<Mutex<PersistentStore>>, pipeline: PipelineHandle, period: Duration, ttl: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately; skip it so the sweeper's first real
    // run happens one full period after startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&store, &pipeline, ttl).await;
    }
}

async fn sweep_once(store: &Arc<Mutex<PersistentStore>>, pipeline: &PipelineHandle, ttl: Duration) {
    let ttl_secs = ttl.as_secs() as i64;
    let now = now_unix_secs();

    let store = store.lock().await;
    let records = store.load();
    let (kept, expired): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| !r.is_expired(now, ttl_secs));

    if expired.is_empty() {
        return;
    }

    if let Err(err) = store.save(&kept) {
        tracing::error!(error = %err, "sweeper failed to persist reduced store");
        return;
    }
    drop(store);

    let ids: Vec<String> = expired.into_iter().map(|r| r.id).collect();
    tracing::info!(count = ids.len(), "sweeper expired stale records");

    let (tx, rx) = oneshot::channel();
    if pipeline
        .try_enqueue(WorkItem {
            kind: WorkKind::ExpireStations { ids },
            clock: 0,
            reply: tx,
        })
        .is_ok()
    {
        // Best-effort: if the pipeline is gone (shutting down) there is
        // nothing left to notify.
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::pipeline;

    fn record(id: &str, last_updated: i64) -> Record {
        Record {
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
            last_updated,
        }
    }

    #[tokio::test]
    async fn sweep_once_removes_expired_and_keeps_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Mutex::new(PersistentStore::new(
            dir.path().join("weather_data.json"),
        )));
        let now = now_unix_secs();
        store
            .lock()
            .await
            .save(&[record("OLD", now - 100), record("FRESH", now)])
            .unwrap();

        let (handle, _join) = pipeline::spawn(store.clone(), 30, 8);
        sweep_once(&store, &handle, Duration::from_secs(30)).await;

        let remaining = store.lock().await.load();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "FRESH");
    }

    #[tokio::test]
    async fn sweep_resets_expired_publisher_to_first_contact() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Mutex::new(PersistentStore::new(
            dir.path().join("weather_data.json"),
        )));
        let (handle, _join) = pipeline::spawn(store.clone(), 30, 8);

        let (tx, rx) = oneshot::channel();
        handle
            .try_enqueue(WorkItem {
                kind: WorkKind::Put {
                    payload: br#"{"id":"WA02"}"#.to_vec(),
                },
                clock: 1,
                reply: tx,
            })
            .unwrap();
        assert_eq!(rx.await.unwrap().status, 201);

        let now = now_unix_secs();
        store
            .lock()
            .await
            .save(&[record("WA02", now - 100)])
            .unwrap();
        sweep_once(&store, &handle, Duration::from_secs(30)).await;

        let (tx, rx) = oneshot::channel();
        handle
            .try_enqueue(WorkItem {
                kind: WorkKind::Put {
                    payload: br#"{"id":"WA02"}"#.to_vec(),
                },
                clock: 1,
                reply: tx,
            })
            .unwrap();
        assert_eq!(rx.await.unwrap().status, 201);
    }
}
