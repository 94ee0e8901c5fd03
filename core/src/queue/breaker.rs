use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::storage::{load_or_default, store_json_logged, DurableStorage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerState {
    pub consecutive_failures: u32,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    /// Failure counted, AI still enabled.
    Counted(u32),
    /// This failure reached the threshold and disabled AI.
    Tripped,
    /// AI was already disabled; nothing changed.
    AlreadyDisabled,
}

/// Consecutive-failure counter for the AI search.
///
/// Reaching `threshold` disables AI globally until [`AiCircuitBreaker::reenable`]
/// is called. Any success resets the counter.
pub struct AiCircuitBreaker {
    failures: AtomicU32,
    disabled: AtomicBool,
    threshold: u32,
    storage: Option<(Arc<dyn DurableStorage>, String)>,
}

impl AiCircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            disabled: AtomicBool::new(false),
            threshold: threshold.max(1),
            storage: None,
        }
    }

    /// Restores the persisted state. `enabled = false` starts disabled without
    /// recording a trip.
    pub fn open(storage: Arc<dyn DurableStorage>, slot: impl Into<String>, threshold: u32, enabled: bool) -> Self {
        let slot = slot.into();
        let state: BreakerState = load_or_default(storage.as_ref(), &slot);
        let b = Self {
            failures: AtomicU32::new(state.consecutive_failures),
            disabled: AtomicBool::new(state.disabled || !enabled),
            threshold: threshold.max(1),
            storage: Some((storage, slot)),
        };
        if state.disabled {
            tracing::info!(
                target: "tuner.ai",
                failures = state.consecutive_failures,
                "ai optimization disabled by circuit breaker in a previous session"
            );
        }
        b
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BreakerState {
        BreakerState {
            consecutive_failures: self.consecutive_failures(),
            disabled: self.is_disabled(),
        }
    }

    pub fn record_success(&self) {
        if self.failures.swap(0, Ordering::SeqCst) != 0 {
            self.persist();
        }
    }

    pub fn record_failure(&self) -> BreakerTransition {
        if self.is_disabled() {
            return BreakerTransition::AlreadyDisabled;
        }
        let n = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        let transition = if n >= self.threshold && !self.disabled.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                target: "tuner.ai",
                failures = n,
                threshold = self.threshold,
                "ai failure threshold reached, disabling ai optimization"
            );
            BreakerTransition::Tripped
        } else {
            BreakerTransition::Counted(n)
        };
        self.persist();
        transition
    }

    /// Manual re-enable from the user. Clears the counter as well.
    pub fn reenable(&self) {
        self.failures.store(0, Ordering::SeqCst);
        self.disabled.store(false, Ordering::SeqCst);
        self.persist();
        tracing::info!(target: "tuner.ai", "ai optimization re-enabled");
    }

    fn persist(&self) {
        if let Some((storage, slot)) = &self.storage {
            store_json_logged(storage.as_ref(), slot, &self.state());
        }
    }
}
