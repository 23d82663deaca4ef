//! Connection acceptor + dispatcher (§4.7).
//!
//! A single accept loop creates a concurrent handler per accepted
//! connection, bounded by a fixed-size worker pool (default 10). Each
//! handler parses the request (§4.3), builds a `WorkItem`, offers it to the
//! pipeline's FIFO (non-blocking; `503` on full), awaits the reply, and
//! writes the response.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::http::{self, RequestError};
use crate::pipeline::{self, PipelineHandle, WorkItem, WorkKind};
use crate::store::PersistentStore;
use crate::sweeper;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, e.g. `"127.0.0.1:4567"`.
    pub bind_addr: String,
    /// Canonical persisted-state path (§6).
    pub data_path: PathBuf,
    /// Max record age before the sweeper removes it (default 30s).
    pub ttl: Duration,
    /// Sweeper tick interval (default 10s).
    pub sweep_period: Duration,
    /// Bounded FIFO capacity between dispatcher and pipeline.
    pub queue_capacity: usize,
    /// Fixed dispatcher worker-pool size (default 10).
    pub pool_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4567".to_owned(),
            data_path: PathBuf::from("resources/weather_data.json"),
            ttl: Duration::from_secs(30),
            sweep_period: Duration::from_secs(10),
            queue_capacity: 64,
            pool_size: 10,
        }
    }
}

/// Handle to a running server. Dropping this without calling `shutdown`
/// leaves the server running in the background; call `shutdown` to drive
/// the documented shutdown order (§4.7).
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections, drain in-flight work, and purge the
    /// store (§4.7). Waits for the accept loop task to fully exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "server task panicked during shutdown");
        }
    }
}

/// Binds the listener and spawns the accept loop. `ready` is completed with
/// the bound address immediately after the listening socket is bound, so
/// callers (tests, `main`) can synchronize before issuing requests (§4.7
/// "Startup signal").
pub fn spawn(config: ServerConfig, ready: oneshot::Sender<SocketAddr>) -> ServerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(run(config, ready, shutdown_rx));
    ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        join,
    }
}

async fn run(config: ServerConfig, ready: oneshot::Sender<SocketAddr>, mut shutdown_rx: oneshot::Receiver<()>) {
    let listener = match TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(bind_addr = %config.bind_addr, error = %err, "failed to bind listener");
            return;
        }
    };
    let local_addr = listener
        .local_addr()
        .expect("a bound TcpListener always has a local address");
    let _ = ready.send(local_addr);
    tracing::info!(addr = %local_addr, "aggregator listening");

    let store = Arc::new(Mutex::new(PersistentStore::new(config.data_path.clone())));
    let (pipeline, pipeline_join) = pipeline::spawn(store.clone(), config.ttl.as_secs() as i64, config.queue_capacity);
    let sweeper = sweeper::spawn(store.clone(), pipeline.clone(), config.sweep_period, config.ttl);

    let semaphore = Arc::new(Semaphore::new(config.pool_size));
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                tracing::info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let pipeline = pipeline.clone();
                        handlers.spawn(async move {
                            let _permit = permit;
                            handle_connection(stream, peer, pipeline).await;
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "accept failed");
                        break;
                    }
                }
            }
        }
    }
    drop(listener);

    tracing::info!(pending = handlers.len(), "draining dispatcher pool");
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("dispatcher pool did not drain in time, aborting stragglers");
        handlers.shutdown().await;
    }

    sweeper.abort();

    // Dropping `pipeline` releases this task's sender; once every other
    // clone (handed to handler tasks, all drained above) is also gone, the
    // pipeline task's receive loop ends and it clears its own registries
    // (§4.4 ownership). Wait for that before purging the store, matching
    // the documented shutdown order.
    drop(pipeline);
    if let Err(err) = pipeline_join.await {
        tracing::error!(error = %err, "pipeline task panicked during shutdown");
    }

    if let Err(err) = store.lock().await.purge() {
        tracing::error!(error = %err, "failed to purge store on shutdown");
    }
    tracing::info!("aggregator shut down");
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, pipeline: PipelineHandle) {
    let parsed = match http::read_request(&mut stream).await {
        Ok(parsed) => parsed,
        Err(RequestError::Io(err)) => {
            tracing::error!(error = %err, %peer, "connection IO error, dropping");
            return;
        }
        Err(err) => {
            tracing::error!(error = %err, %peer, "malformed request");
            let _ = http::write_response(&mut stream, 400, b"").await;
            return;
        }
    };

    let clock = parsed.lamport_clock();

    let kind = match parsed.method.as_str() {
        "PUT" => {
            if parsed.content_length() == 0 {
                let _ = http::write_response(&mut stream, 204, b"").await;
                return;
            }
            WorkKind::Put { payload: parsed.body }
        }
        "GET" => {
            let station_filter = query_param(&parsed.path, "stationID");
            WorkKind::Get {
                peer: peer.to_string(),
                station_filter,
            }
        }
        _ => {
            let _ = http::write_response(&mut stream, 400, b"").await;
            return;
        }
    };

    let (tx, rx) = oneshot::channel();
    if pipeline
        .try_enqueue(WorkItem {
            kind,
            clock,
            reply: tx,
        })
        .is_err()
    {
        let _ = http::write_response(&mut stream, 503, br#"{"error":"queue full"}"#).await;
        return;
    }

    match rx.await {
        Ok(reply) => {
            let _ = http::write_response(&mut stream, reply.status, &reply.body).await;
        }
        Err(_) => {
            // Pipeline dropped the reply sender without answering; treat as
            // an internal error rather than hanging the connection.
            let _ = http::write_response(&mut stream, 500, b"").await;
        }
    }
}

/// Extracts a query parameter's value from `path` (e.g. `stationID` from
/// `/weather.json?stationID=VIC01`). Returns `None` if absent.
fn query_param(path: &str, key: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    for pair in query.split('&') {
        if let Some((name, value)) = pair.split_once('=') {
            if name == key {
                return Some(value.to_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_extracts_value() {
        assert_eq!(
            query_param("/weather.json?stationID=VIC01", "stationID"),
            Some("VIC01".to_owned())
        );
    }

    #[test]
    fn query_param_absent_returns_none() {
        assert_eq!(query_param("/weather.json", "stationID"), None);
    }

    #[test]
    fn query_param_ignores_unrelated_pairs() {
        assert_eq!(
            query_param("/weather.json?foo=bar&stationID=SA01", "stationID"),
            Some("SA01".to_owned())
        );
    }
}
