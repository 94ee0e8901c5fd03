use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use super::writer::EventsOutTx;
use crate::types::{Method, ModelId, Sku};

/// User-facing signal emitted by the queue processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    JobCompleted {
        sku: Sku,
        model_id: ModelId,
        method: Method,
        confidence: Option<f64>,
    },
    JobFailed {
        sku: Sku,
        model_id: ModelId,
        method: Method,
        error: String,
        /// Method whose result is in use instead, if any.
        fallback: Option<Method>,
    },
    AiDisabled {
        threshold: u32,
        purged_jobs: usize,
    },
    QueueDrained {
        completed: usize,
        failed: usize,
        skipped: usize,
        paused: bool,
    },
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::JobCompleted {
                sku,
                model_id,
                method,
                confidence,
            } => match confidence {
                Some(c) => format!("{method} optimization finished for {sku} / {model_id} (confidence {c:.0}%)"),
                None => format!("{method} optimization finished for {sku} / {model_id}"),
            },
            Notification::JobFailed {
                sku,
                model_id,
                method,
                error,
                fallback,
            } => match fallback {
                Some(f) => format!("{method} optimization failed for {sku} / {model_id}: {error}; using {f} result"),
                None => format!("{method} optimization failed for {sku} / {model_id}: {error}"),
            },
            Notification::AiDisabled { threshold, .. } => format!(
                "AI optimization disabled after {threshold} consecutive failures; re-enable it once the service is healthy"
            ),
            Notification::QueueDrained {
                completed,
                failed,
                skipped,
                paused,
            } => {
                let head = if *paused { "Queue paused" } else { "Queue finished" };
                format!("{head}: {completed} completed, {failed} failed, {skipped} jobs skipped")
            }
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Writes every notification to the log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: &Notification) {
        match n {
            Notification::JobFailed { .. } | Notification::AiDisabled { .. } => {
                tracing::warn!(target: "tuner.notify", "{}", n.message())
            }
            _ => tracing::info!(target: "tuner.notify", "{}", n.message()),
        }
    }
}

#[async_trait]
impl Notifier for EventsOutTx {
    async fn notify(&self, n: &Notification) {
        let line = serde_json::json!({
            "ts": Utc::now().to_rfc3339(),
            "message": n.message(),
            "event": n,
        });
        self.send_line(line.to_string()).await;
    }
}

#[derive(Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, n: &Notification) {
        for sink in &self.sinks {
            sink.notify(n).await;
        }
    }
}
