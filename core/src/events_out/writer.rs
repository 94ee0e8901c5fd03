use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::config::EventsOutConfig;

const STDOUT: &str = "stdout:";
const DROP_WARN_EVERY: u64 = 100;

/// Sending half of the JSONL notification sink.
#[derive(Clone)]
pub struct EventsOutTx {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
}

impl EventsOutTx {
    /// Wraps an existing channel; the caller owns the receiver.
    pub fn from_sender(tx: mpsc::Sender<String>, drop_when_full: bool) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            drop_when_full,
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queues one line. A full channel either drops the line or waits for
    /// room, depending on `drop_when_full`.
    pub async fn send_line(&self, line: String) {
        let line = match self.tx.try_send(line) {
            Ok(()) => return,
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(target: "tuner.events_out", "sink closed, notification lost");
                return;
            }
            Err(TrySendError::Full(line)) => line,
        };
        if !self.drop_when_full {
            if self.tx.send(line).await.is_err() {
                tracing::debug!(target: "tuner.events_out", "sink closed, notification lost");
            }
            return;
        }
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if total == 1 || total % DROP_WARN_EVERY == 0 {
            tracing::warn!(target: "tuner.events_out", dropped = total, "sink full, dropping notifications");
        }
    }
}

async fn open_sink(path: &str) -> Result<Box<dyn AsyncWrite + Unpin + Send>, String> {
    if path == STDOUT {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| format!("failed to open events_out file {path}: {e}"))?;
    Ok(Box::new(file))
}

/// Writes lines as they arrive and flushes whenever the channel runs dry,
/// so a burst costs one flush.
async fn pump(mut rx: mpsc::Receiver<String>, mut sink: Box<dyn AsyncWrite + Unpin + Send>) {
    while let Some(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(mut line) = next.take() {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if let Err(e) = sink.write_all(line.as_bytes()).await {
                tracing::error!(target: "tuner.events_out", error = %e, "write failed, sink stopped");
                return;
            }
            next = rx.try_recv().ok();
        }
        if let Err(e) = sink.flush().await {
            tracing::error!(target: "tuner.events_out", error = %e, "flush failed, sink stopped");
            return;
        }
    }
}

/// Starts the JSONL sink described by `cfg`. `Ok(None)` when disabled.
pub async fn start_events_out(cfg: &EventsOutConfig) -> Result<Option<EventsOutTx>, String> {
    if !cfg.enabled {
        return Ok(None);
    }
    let path = cfg.path.trim();
    if path.is_empty() {
        tracing::warn!(target: "tuner.events_out", "events_out enabled without a path, ignoring");
        return Ok(None);
    }

    let sink = open_sink(path).await?;
    let (tx, rx) = mpsc::channel::<String>(cfg.channel_capacity.max(1));
    tokio::spawn(pump(rx, sink));
    tracing::info!(
        target: "tuner.events_out",
        path,
        capacity = cfg.channel_capacity,
        drop_when_full = cfg.drop_when_full,
        "notification sink started"
    );
    Ok(Some(EventsOutTx::from_sender(tx, cfg.drop_when_full)))
}
