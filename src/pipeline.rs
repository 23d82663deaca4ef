//! The single-writer request pipeline (§4.4).
//!
//! One task consumes `WorkItem`s from a bounded FIFO and applies them
//! sequentially against the shared store, so PUTs and GETs are totally
//! ordered by enqueue order. Each item carries a one-shot completion slot
//! the connection handler awaits -- the same command/reply-channel idiom
//! the teacher uses for forwarder-command proxying (see `state.rs`'s
//! `ForwarderCommand` in the reference corpus).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::clock::{ClockCheck, ClockRegistry};
use crate::model;
use crate::store::PersistentStore;
use crate::time::now_unix_secs;

/// A unit of work enqueued by a connection handler or the sweeper.
pub enum WorkKind {
    /// PUT /weather.json. `payload` is the raw JSON body.
    Put { payload: Vec<u8> },
    /// GET /weather.json[?stationID=...]. `peer` is the reader identity
    /// (remote socket endpoint string); `station_filter` is the optional,
    /// non-empty `stationID` query value.
    Get {
        peer: String,
        station_filter: Option<String>,
    },
    /// Sent by the sweeper after it has removed expired records from the
    /// store, so the (pipeline-owned) publisher-clock registry stays in
    /// sync (§4.6). No reply body is produced.
    ExpireStations { ids: Vec<String> },
}

pub struct WorkItem {
    pub kind: WorkKind,
    /// Incoming Lamport clock value. Ignored for `ExpireStations`.
    pub clock: u64,
    pub reply: oneshot::Sender<PipelineReply>,
}

#[derive(Debug, Clone)]
pub struct PipelineReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PipelineReply {
    fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Handle used by connection handlers and the sweeper to enqueue work.
#[derive(Clone)]
pub struct PipelineHandle {
    sender: mpsc::Sender<WorkItem>,
}

#[derive(Debug, thiserror::Error)]
#[error("request queue is full")]
pub struct QueueFullError;

impl PipelineHandle {
    /// Non-blocking try-offer (§4.4, §4.7). Returns `Err` if the FIFO is
    /// full; callers respond `503` in that case without ever building a
    /// `WorkItem` reply path.
    pub fn try_enqueue(&self, item: WorkItem) -> Result<(), QueueFullError> {
        self.sender.try_send(item).map_err(|_| QueueFullError)
    }
}

/// Spawns the pipeline task and returns a handle for enqueuing work, plus
/// the task's `JoinHandle` so shutdown can wait for the registries to
/// actually be cleared (§4.7 shutdown order) before purging the store.
pub fn spawn(
    store: Arc<Mutex<PersistentStore>>,
    ttl_secs: i64,
    queue_capacity: usize,
) -> (PipelineHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let join = tokio::spawn(run(rx, store, ttl_secs));
    (PipelineHandle { sender: tx }, join)
}

async fn run(mut rx: mpsc::Receiver<WorkItem>, store: Arc<Mutex<PersistentStore>>, ttl_secs: i64) {
    let mut registry = ClockRegistry::new();

    while let Some(item) = rx.recv().await {
        let reply = match item.kind {
            WorkKind::Put { payload } => handle_put(&store, &mut registry, item.clock, payload).await,
            WorkKind::Get {
                peer,
                station_filter,
            } => handle_get(&store, &mut registry, item.clock, &peer, station_filter, ttl_secs).await,
            WorkKind::ExpireStations { ids } => {
                for id in &ids {
                    registry.forget_publisher(id);
                }
                PipelineReply::empty(200)
            }
        };
        // The connection handler may already have given up (e.g. the
        // socket died); a dropped receiver is not a pipeline failure.
        let _ = item.reply.send(reply);
    }

    tracing::info!("request pipeline worker exiting, clearing clock registry");
    registry.clear();
}

async fn handle_put(
    store: &Arc<Mutex<PersistentStore>>,
    registry: &mut ClockRegistry,
    clock: u64,
    payload: Vec<u8>,
) -> PipelineReply {
    let mut record = match model::decode(&payload) {
        Ok(record) => record,
        Err(err) => {
            tracing::error!(error = %err, "PUT payload failed to decode");
            return PipelineReply::empty(500);
        }
    };

    if record.id.is_empty() {
        return PipelineReply::empty(400);
    }

    let was_first_contact = match registry.check_and_advance_publisher(&record.id, clock) {
        ClockCheck::Rejected => return PipelineReply::empty(400),
        ClockCheck::Accepted { was_first_contact } => was_first_contact,
    };

    record.stamp(now_unix_secs());

    let store = store.lock().await;
    let mut records = store.load();
    records.retain(|r| r.id != record.id);
    records.push(record);
    if let Err(err) = store.save(&records) {
        tracing::error!(error = %err, "failed to persist store after PUT");
        return PipelineReply::empty(500);
    }

    PipelineReply::empty(if was_first_contact { 201 } else { 200 })
}

async fn handle_get(
    store: &Arc<Mutex<PersistentStore>>,
    registry: &mut ClockRegistry,
    clock: u64,
    peer: &str,
    station_filter: Option<String>,
    ttl_secs: i64,
) -> PipelineReply {
    if matches!(
        registry.check_and_advance_reader(peer, clock),
        ClockCheck::Rejected
    ) {
        return PipelineReply::empty(400);
    }

    let store = store.lock().await;
    let records = store.load();
    drop(store);

    let now = now_unix_secs();
    let mut records: Vec<_> = records
        .into_iter()
        .filter(|r| !r.is_expired(now, ttl_secs))
        .collect();

    if let Some(filter) = station_filter.filter(|f| !f.is_empty()) {
        records.retain(|r| r.id == filter);
    }

    PipelineReply {
        status: 200,
        body: model::encode_list(&records),
    }
}
