use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::storage::{load_or_default, store_json_logged, DurableStorage};
use crate::types::{JobStatus, Method, QueueItem};

pub type SharedQueue = Arc<Mutex<JobQueue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A pending job already targets the same (sku, model, method) slot.
    AlreadyQueued,
    /// The running job has the same fingerprint.
    InFlight,
    /// A fresh record already exists for the current data.
    AlreadyValid,
    AiDisabled,
    /// `manual` has nothing to search for.
    NotSearchable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::AlreadyQueued => "already queued",
            SkipReason::InFlight => "identical job in flight",
            SkipReason::AlreadyValid => "valid result already cached",
            SkipReason::AiDisabled => "ai optimization disabled",
            SkipReason::NotSearchable => "manual parameters are not searched",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { id: String },
    Skipped(SkipReason),
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Pause flag shared between the processor and whoever drives it. Pausing
/// takes effect before the next dequeue; the running job always finishes.
#[derive(Debug, Default)]
pub struct QueueControl {
    paused: AtomicBool,
}

impl QueueControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// FIFO of pending optimization jobs.
///
/// Items stay in the list (and in storage) while running and are removed
/// only once they reach a terminal state, so an interrupted session resumes
/// with the job it was working on.
pub struct JobQueue {
    items: VecDeque<QueueItem>,
    running: Option<String>,
    completed: u64,
    failed: u64,
    skipped: u64,
    storage: Arc<dyn DurableStorage>,
    slot: String,
}

impl JobQueue {
    pub fn open(storage: Arc<dyn DurableStorage>, slot: impl Into<String>) -> Self {
        let slot = slot.into();
        let items: Vec<QueueItem> = load_or_default(storage.as_ref(), &slot);
        if !items.is_empty() {
            tracing::info!(
                target: "tuner.queue",
                pending = items.len(),
                "resuming persisted optimization queue"
            );
        }
        Self {
            items: items.into(),
            running: None,
            completed: 0,
            failed: 0,
            skipped: 0,
            storage,
            slot,
        }
    }

    pub fn into_shared(self) -> SharedQueue {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn running(&self) -> Option<&QueueItem> {
        let id = self.running.as_deref()?;
        self.items.iter().find(|i| i.id == id)
    }

    pub fn stats(&self) -> QueueStats {
        let active = usize::from(self.running.is_some());
        QueueStats {
            queued: self.items.len() - active,
            active,
            completed: self.completed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    /// Adds `item` unless an equivalent job is pending or running.
    pub fn push(&mut self, item: QueueItem) -> EnqueueOutcome {
        for existing in &self.items {
            if !existing.same_slot(&item.sku, &item.model_id, item.method) {
                continue;
            }
            let is_running = self.running.as_deref() == Some(existing.id.as_str());
            if !is_running {
                return self.skip(SkipReason::AlreadyQueued);
            }
            if existing.fingerprint == item.fingerprint {
                return self.skip(SkipReason::InFlight);
            }
        }

        tracing::debug!(
            target: "tuner.queue",
            sku = %item.sku,
            model = %item.model_id,
            method = %item.method,
            reason = %item.reason,
            "job queued"
        );
        let id = item.id.clone();
        self.items.push_back(item);
        self.persist();
        EnqueueOutcome::Queued { id }
    }

    /// Counts a job that terminated as `skipped` without being queued.
    pub fn skip(&mut self, reason: SkipReason) -> EnqueueOutcome {
        self.skipped += 1;
        EnqueueOutcome::Skipped(reason)
    }

    /// Marks the head of the queue as running and returns a copy of it.
    pub fn begin_next(&mut self) -> Option<QueueItem> {
        if let Some(id) = &self.running {
            tracing::warn!(target: "tuner.queue", id = %id, "begin_next while a job is running");
            return None;
        }
        let head = self.items.front()?.clone();
        self.running = Some(head.id.clone());
        Some(head)
    }

    /// Removes a job after it reached `status`. Unknown ids (purged or
    /// cleared while running) only update the counters.
    pub fn finish(&mut self, id: &str, status: JobStatus) {
        debug_assert!(status.is_terminal());
        if self.running.as_deref() == Some(id) {
            self.running = None;
        }
        match status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Queued | JobStatus::Running => {}
        }
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        if self.items.len() != before {
            self.persist();
        }
    }

    /// Drops every pending job for `method`, leaving a running one in place.
    pub fn purge_method(&mut self, method: Method) -> usize {
        let running = self.running.clone();
        let before = self.items.len();
        self.items
            .retain(|i| i.method != method || running.as_deref() == Some(i.id.as_str()));
        let purged = before - self.items.len();
        if purged > 0 {
            self.persist();
        }
        purged
    }

    /// Discards all jobs that have not started. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let running = self.running.clone();
        let before = self.items.len();
        self.items.retain(|i| running.as_deref() == Some(i.id.as_str()));
        let dropped = before - self.items.len();
        self.persist();
        dropped
    }

    fn persist(&self) {
        store_json_logged(self.storage.as_ref(), &self.slot, &self.items);
    }
}
