//! Bounded worker pool for background actions
//!
//! The owning thread submits actions; workers pull them FIFO off a shared
//! queue and report lifecycle events back over the event channel. Worker
//! faults never propagate: store errors and panics inside an action are
//! logged and surfaced as a failed event.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::events::{ActionId, EngineEvent};
use super::{Action, CancelToken, EngineContext, Progress};
use crate::error::EngineError;

/// Default worker bound; small because the persisted store serializes
/// writers anyway.
pub const DEFAULT_WORKERS: usize = 2;

struct Queued {
    id: ActionId,
    action: Box<dyn Action>,
    cancel: CancelToken,
}

pub struct ActionScheduler {
    queue_tx: Option<Sender<Queued>>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicU64,
    cancels: Arc<Mutex<HashMap<ActionId, CancelToken>>>,
}

impl ActionScheduler {
    pub fn new(workers: usize, event_tx: Sender<EngineEvent>) -> Self {
        let (queue_tx, queue_rx) = channel::<Queued>();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let cancels: Arc<Mutex<HashMap<ActionId, CancelToken>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let queue_rx = queue_rx.clone();
                let event_tx = event_tx.clone();
                let cancels = cancels.clone();
                std::thread::Builder::new()
                    .name(format!("phplens-worker-{}", worker))
                    .spawn(move || worker_loop(queue_rx, event_tx, cancels))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            queue_tx: Some(queue_tx),
            workers: handles,
            next_id: AtomicU64::new(1),
            cancels,
        }
    }

    /// Run `init` on the calling thread and, when accepted and
    /// asynchronous, queue the action. Returns `None` when `init`
    /// rejected the work (the Skipped state: no events are ever sent).
    pub fn submit(
        &self,
        mut action: Box<dyn Action>,
        ctx: &mut EngineContext,
    ) -> Option<ActionId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if !action.init(ctx) {
            debug!(id, label = %action.label(), "action skipped by init");
            return None;
        }
        if !action.do_async() {
            // Trivial initializer: init was the whole job.
            return Some(id);
        }

        let cancel = CancelToken::new();
        self.cancels.lock().unwrap().insert(id, cancel.clone());
        let queued = Queued { id, action, cancel };
        if let Some(tx) = &self.queue_tx {
            // Send only fails after shutdown.
            let _ = tx.send(queued);
        }
        Some(id)
    }

    pub fn cancel(&self, id: ActionId) {
        if let Some(token) = self.cancels.lock().unwrap().get(&id) {
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for token in self.cancels.lock().unwrap().values() {
            token.cancel();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.cancels.lock().unwrap().len()
    }

    /// Stop accepting work and join the workers after the queue drains.
    pub fn shutdown(mut self) {
        self.queue_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ActionScheduler {
    fn drop(&mut self) {
        self.queue_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    queue_rx: Arc<Mutex<Receiver<Queued>>>,
    event_tx: Sender<EngineEvent>,
    cancels: Arc<Mutex<HashMap<ActionId, CancelToken>>>,
) {
    loop {
        let queued = {
            let rx = queue_rx.lock().unwrap();
            rx.recv()
        };
        let Queued {
            id,
            mut action,
            cancel,
        } = match queued {
            Ok(queued) => queued,
            Err(_) => break, // scheduler dropped, queue drained
        };

        let label = action.label();
        let _ = event_tx.send(EngineEvent::Started {
            action_id: id,
            label: label.clone(),
        });

        let event = if cancel.is_cancelled() {
            EngineEvent::Cancelled { action_id: id }
        } else {
            let progress = Progress::new(event_tx.clone(), id);
            let result = catch_unwind(AssertUnwindSafe(|| {
                action.background_work(&progress, &cancel)
            }));
            match result {
                Ok(Ok(outcome)) if cancel.is_cancelled() => {
                    // Cancelled at the finish line: drop the payload rather
                    // than hand listeners results they asked to abandon.
                    drop(outcome);
                    EngineEvent::Cancelled { action_id: id }
                }
                Ok(Ok(outcome)) => EngineEvent::Completed {
                    action_id: id,
                    outcome,
                },
                Ok(Err(EngineError::Cancelled)) => EngineEvent::Cancelled { action_id: id },
                Ok(Err(err)) => {
                    warn!(id, %label, error = %err, "action failed");
                    EngineEvent::Failed {
                        action_id: id,
                        label: label.clone(),
                        message: err.to_string(),
                    }
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    warn!(id, %label, %message, "action panicked");
                    EngineEvent::Failed {
                        action_id: id,
                        label: label.clone(),
                        message,
                    }
                }
            }
        };

        cancels.lock().unwrap().remove(&id);
        let _ = event_tx.send(event);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
