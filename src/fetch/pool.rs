//! Pipelined ingest worker (FP, §4.7). One control OS thread owns a ring of
//! `CONNECTIONS` slots; each `available -> sent` transition spawns a short-lived OS
//! thread doing one blocking HTTP call and reporting back over an `mpsc` channel. This
//! replaces the C reference's single-thread libcurl multi-interface reactor
//! (`original_source/upstream.c`) with the idiomatic Rust primitive for bounded,
//! order-preserving fan-out (see `DESIGN.md` Open Question 5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Error;
use crate::fetch::upstream::fetch_logs;
use crate::store::StoreEngine;

const CONNECTIONS: usize = 32;
const BATCH: u64 = 128;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

struct Shared {
    url: String,
    tip_height: u64,
}

enum Slot {
    Available,
    Sent {
        from: u64,
        to: u64,
        receiver: mpsc::Receiver<Result<Vec<crate::types::LogRecord>, Error>>,
    },
    Received {
        from: u64,
        to: u64,
        batch: Vec<crate::types::LogRecord>,
    },
}

/// Background ingest worker bound to one [`StoreEngine`].
pub struct FetchPool {
    shared: Arc<Mutex<Shared>>,
    shutdown: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl FetchPool {
    /// Spawns the control thread. `engine` is used to read the current ingest
    /// watermark and to deliver decoded batches via `insert`.
    pub fn spawn(engine: Arc<StoreEngine>, url: String) -> Self {
        let shared = Arc::new(Mutex::new(Shared { url, tip_height: 0 }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));

        let loop_shared = shared.clone();
        let loop_shutdown = shutdown.clone();
        let loop_last_error = last_error.clone();
        let handle = std::thread::spawn(move || {
            run(engine, loop_shared, loop_shutdown, loop_last_error);
        });

        Self {
            shared,
            shutdown,
            last_error,
            handle: Some(handle),
        }
    }

    pub fn set_url(&self, url: String) {
        self.shared.lock().url = url;
    }

    pub fn set_tip_height(&self, height: u64) {
        self.shared.lock().tip_height = height;
    }

    /// The most recent insert-callback failure, if any, surfaced per §7's "escalates
    /// only when the SE.insert callback itself fails" rule.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn shutdown_and_join(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    engine: Arc<StoreEngine>,
    shared: Arc<Mutex<Shared>>,
    shutdown: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    let client = reqwest::blocking::Client::new();
    let mut ring: Vec<Slot> = (0..CONNECTIONS).map(|_| Slot::Available).collect();
    let mut head = 0usize;
    let mut next_dispatch = engine.blocks_count();
    let mut next_request_id = 0u64;

    while !shutdown.load(Ordering::SeqCst) {
        let (url, tip_height) = {
            let guard = shared.lock();
            (guard.url.clone(), guard.tip_height)
        };

        // Fill every available slot with a fresh request before checking the head. This
        // only gates *dispatching new work* — the head slot below must still be drained
        // every iteration regardless, or a batch that finished after the last block was
        // dispatched would sit forever in `Sent`/`Received` and never reach `insert`.
        if !url.is_empty() && tip_height > 0 {
            for offset in 0..CONNECTIONS {
                let slot_index = (head + offset) % CONNECTIONS;
                if !matches!(ring[slot_index], Slot::Available) {
                    continue;
                }
                if next_dispatch > tip_height {
                    break;
                }
                let from = next_dispatch;
                let to = (from + BATCH).min(tip_height).max(from);
                next_dispatch = to + 1;
                next_request_id += 1;

                ring[slot_index] = dispatch(&client, &url, next_request_id, from, to);
            }
        }

        match &ring[head] {
            Slot::Available => {
                // Nothing left to dispatch toward the tip right now; wait for progress.
                std::thread::sleep(IDLE_BACKOFF);
            }
            Slot::Sent { from, to, receiver } => {
                let (from, to) = (*from, *to);
                match receiver.recv_timeout(POLL_TIMEOUT) {
                    Ok(Ok(batch)) => {
                        ring[head] = Slot::Received { from, to, batch };
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(from, to, %err, "fetch request failed, retrying");
                        std::thread::sleep(RETRY_BACKOFF);
                        ring[head] = dispatch(&client, &url, next_request_id, from, to);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        // This is also the shutdown-flag checkpoint required by §5.
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::warn!(from, to, "fetch worker thread vanished, retrying");
                        std::thread::sleep(RETRY_BACKOFF);
                        ring[head] = dispatch(&client, &url, next_request_id, from, to);
                    }
                }
            }
            Slot::Received { .. } => {
                let Slot::Received { from: _, to: _, batch } =
                    std::mem::replace(&mut ring[head], Slot::Available)
                else {
                    unreachable!()
                };
                if let Err(err) = engine.insert(&batch) {
                    tracing::error!(%err, "insert callback failed for delivered batch");
                    *last_error.lock() = Some(err.to_string());
                }
                head = (head + 1) % CONNECTIONS;
            }
        }
    }
}

fn dispatch(client: &reqwest::blocking::Client, url: &str, request_id: u64, from: u64, to: u64) -> Slot {
    let (sender, receiver) = mpsc::channel();
    let client = client.clone();
    let url = url.to_string();
    std::thread::spawn(move || {
        let result = fetch_logs(&client, &url, request_id, from, to);
        let _ = sender.send(result);
    });
    Slot::Sent { from, to, receiver }
}
