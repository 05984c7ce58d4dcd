//! Debounce gate: one long-lived task per session that turns bursts of save
//! requests into a single save after a quiet window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::save::SaveEngine;

/// Messages sent to the gate task
enum GateMessage {
    Request,
    Shutdown,
}

pub struct DebounceGate {
    tx: mpsc::UnboundedSender<GateMessage>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceGate {
    /// Start the gate task. Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<SaveEngine>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let window = engine.config().quiet_window();
        let task = tokio::spawn(run_gate(engine, rx, window));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Ask for a save once edits go quiet. Never blocks and never fails.
    pub fn request_save(&self) {
        if self.tx.send(GateMessage::Request).is_err() {
            debug!("debounce gate stopped, dropping save request");
        }
    }

    /// Stop the gate, flushing a save that is still waiting out its window.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(GateMessage::Shutdown);
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        if let Err(e) = task.await {
            error!(error = %e, "debounce gate task failed");
        }
    }
}

async fn run_gate(
    engine: Arc<SaveEngine>,
    mut rx: mpsc::UnboundedReceiver<GateMessage>,
    window: Duration,
) {
    let mut pending = false;
    let sleep = tokio::time::sleep(window);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(GateMessage::Request) => {
                    pending = true;
                    sleep.as_mut().reset(Instant::now() + window);
                }
                Some(GateMessage::Shutdown) | None => {
                    if pending {
                        debug!("flushing pending save before shutdown");
                        fire(&engine).await;
                    }
                    break;
                }
            },
            () = &mut sleep, if pending => {
                pending = false;
                fire(&engine).await;
            }
        }
    }

    debug!("debounce gate stopped");
}

async fn fire(engine: &SaveEngine) {
    let report = engine.save_now().await;
    if report.success {
        debug!(outcome = report.message, "debounced save finished");
    } else {
        warn!(
            outcome = report.message,
            saved_locally = report.saved_locally,
            "debounced save did not reach the server"
        );
    }
}
