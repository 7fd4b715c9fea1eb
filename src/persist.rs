use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::store::types::Document;
use crate::store::StateStore;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

enum Command {
    Write(Box<Document>),
    Flush(oneshot::Sender<()>),
}

/// Debounced document writes. Each `schedule` replaces the pending snapshot
/// and restarts the window; one write happens once the burst goes quiet.
/// Write failures are logged and dropped, the in-memory document stays authoritative.
pub struct PersistenceScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl PersistenceScheduler {
    /// Must be called inside a tokio runtime.
    pub fn spawn(store: StateStore, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, window, rx));
        Self { tx }
    }

    pub fn schedule(&self, doc: &Document) {
        if self.tx.send(Command::Write(Box::new(doc.clone()))).is_err() {
            warn!("persistence worker stopped, write dropped");
        }
    }

    /// Write the pending snapshot now, if there is one.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run(store: StateStore, window: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Option<Box<Document>> = None;
    loop {
        let command = if pending.is_none() {
            rx.recv().await
        } else {
            tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep(window) => {
                    if let Some(doc) = pending.take() {
                        write(&store, &doc).await;
                    }
                    continue;
                }
            }
        };

        match command {
            Some(Command::Write(doc)) => pending = Some(doc),
            Some(Command::Flush(done)) => {
                if let Some(doc) = pending.take() {
                    write(&store, &doc).await;
                }
                let _ = done.send(());
            }
            None => {
                if let Some(doc) = pending.take() {
                    write(&store, &doc).await;
                }
                debug!(scope = store.scope(), "persistence worker finished");
                break;
            }
        }
    }
}

async fn write(store: &StateStore, doc: &Document) {
    match store.save(doc).await {
        Ok(()) => debug!(scope = store.scope(), "document persisted"),
        Err(e) => warn!(scope = store.scope(), "document write failed: {:#}", e),
    }
}
