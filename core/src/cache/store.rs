use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};

use crate::storage::{load_or_default, store_json_logged, DurableStorage};
use crate::types::{CacheEntry, Method, ModelId, OptimizationRecord, SelectionSource, Sku};

/// Persisted shape: `{ sku: { model_id: { manual?, grid?, ai?, selected? } } }`.
type CacheMap = BTreeMap<Sku, BTreeMap<ModelId, CacheEntry>>;

pub type SharedCache = Arc<RwLock<CacheStore>>;

/// Single source of truth for optimization results.
///
/// Every mutating call applies the change, persists the whole map in one
/// write, bumps `version` once and only then publishes the new version to
/// subscribers. `version` is the only change signal consumers should rely on.
pub struct CacheStore {
    entries: CacheMap,
    version: u64,
    ttl: chrono::Duration,
    storage: Arc<dyn DurableStorage>,
    slot: String,
    version_tx: watch::Sender<u64>,
}

impl CacheStore {
    pub fn open(storage: Arc<dyn DurableStorage>, slot: impl Into<String>, ttl: chrono::Duration) -> Self {
        let slot = slot.into();
        let entries: CacheMap = load_or_default(storage.as_ref(), &slot);
        let (version_tx, _) = watch::channel(0);
        tracing::debug!(
            target: "tuner.cache",
            slot = %slot,
            skus = entries.len(),
            "cache store loaded"
        );
        Self {
            entries,
            version: 0,
            ttl,
            storage,
            slot,
            version_tx,
        }
    }

    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    pub fn entry(&self, sku: &Sku, model_id: &ModelId) -> Option<&CacheEntry> {
        self.entries.get(sku).and_then(|m| m.get(model_id))
    }

    pub fn get(&self, sku: &Sku, model_id: &ModelId, method: Method) -> Option<&OptimizationRecord> {
        self.entry(sku, model_id).and_then(|e| e.record(method))
    }

    pub fn set(&mut self, sku: &Sku, model_id: &ModelId, method: Method, record: OptimizationRecord) {
        self.update_entry(sku, model_id, |entry| {
            *entry.slot_mut(method) = Some(record);
        });
    }

    /// Records explicit user intent. A record for `method` need not exist yet.
    pub fn set_selected_method(&mut self, sku: &Sku, model_id: &ModelId, method: Method) {
        self.update_entry(sku, model_id, |entry| {
            entry.selected = Some(method);
            entry.selected_by = Some(SelectionSource::User);
        });
    }

    /// Drops any selection so the resolver falls back to its automatic order.
    pub fn clear_selected_method(&mut self, sku: &Sku, model_id: &ModelId) {
        self.update_entry(sku, model_id, |entry| {
            entry.selected = None;
            entry.selected_by = None;
        });
    }

    pub fn clear_for_sku(&mut self, sku: &Sku) {
        let removed = self.entries.remove(sku).map(|m| m.len()).unwrap_or(0);
        tracing::debug!(target: "tuner.cache", sku = %sku, models = removed, "cleared sku");
        self.commit();
    }

    /// Applies several slot changes to one entry as a single mutation.
    pub fn update_entry<F>(&mut self, sku: &Sku, model_id: &ModelId, f: F)
    where
        F: FnOnce(&mut CacheEntry),
    {
        let models = self.entries.entry(sku.clone()).or_default();
        let entry = models.entry(model_id.clone()).or_default();
        f(entry);
        if entry.is_empty() {
            models.remove(model_id);
        }
        if models.is_empty() {
            self.entries.remove(sku);
        }
        self.commit();
    }

    /// Bumps the version without changing any entry, so subscribers resync.
    pub fn touch(&mut self) {
        self.bump();
    }

    pub fn is_valid(&self, sku: &Sku, model_id: &ModelId, method: Method, current_hash: &str) -> bool {
        self.is_valid_at(sku, model_id, method, current_hash, Utc::now())
    }

    pub fn is_valid_at(
        &self,
        sku: &Sku,
        model_id: &ModelId,
        method: Method,
        current_hash: &str,
        now: DateTime<Utc>,
    ) -> bool {
        self.get(sku, model_id, method)
            .is_some_and(|r| self.is_fresh(r, current_hash, now))
    }

    /// A record is usable only while its data hash matches and it is within the TTL.
    pub fn is_fresh(&self, record: &OptimizationRecord, current_hash: &str, now: DateTime<Utc>) -> bool {
        record.data_hash == current_hash && now.signed_duration_since(record.timestamp) <= self.ttl
    }

    fn commit(&mut self) {
        store_json_logged(self.storage.as_ref(), &self.slot, &self.entries);
        self.bump();
    }

    fn bump(&mut self) {
        self.version += 1;
        self.version_tx.send_replace(self.version);
        tracing::trace!(target: "tuner.cache", version = self.version, "cache version bumped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::ParamMap;
    use pretty_assertions::assert_eq;

    fn record(hash: &str, alpha: f64) -> OptimizationRecord {
        let mut p = ParamMap::new();
        p.insert("alpha".into(), alpha);
        OptimizationRecord::new(p, hash)
    }

    fn store(storage: Arc<dyn DurableStorage>) -> CacheStore {
        CacheStore::open(storage, "cache", chrono::Duration::hours(1))
    }

    #[test]
    fn every_mutation_bumps_version_once() {
        let mut cache = store(Arc::new(MemoryStorage::new()));
        let (sku, model) = (Sku::new("S1"), ModelId::new("m"));
        let mut seen = vec![cache.version()];

        cache.set(&sku, &model, Method::Grid, record("h1", 0.2));
        seen.push(cache.version());
        cache.set_selected_method(&sku, &model, Method::Manual);
        seen.push(cache.version());
        cache.update_entry(&sku, &model, |e| {
            e.ai = Some(record("h1", 0.4));
            e.manual = Some(record("h1", 0.2));
        });
        seen.push(cache.version());
        cache.clear_for_sku(&sku);
        seen.push(cache.version());

        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(cache.entry(&sku, &model).is_none());
    }

    #[test]
    fn validity_tracks_hash_and_ttl() {
        let mut cache = store(Arc::new(MemoryStorage::new()));
        let (sku, model) = (Sku::new("S1"), ModelId::new("m"));
        cache.set(&sku, &model, Method::Grid, record("h1", 0.2));

        assert!(cache.is_valid(&sku, &model, Method::Grid, "h1"));
        assert!(!cache.is_valid(&sku, &model, Method::Grid, "h2"));
        assert!(!cache.is_valid(&sku, &model, Method::Ai, "h1"));

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(!cache.is_valid_at(&sku, &model, Method::Grid, "h1", later));
    }

    #[test]
    fn reopen_sees_persisted_entries() {
        let storage: Arc<dyn DurableStorage> = Arc::new(MemoryStorage::new());
        let (sku, model) = (Sku::new("S1"), ModelId::new("m"));
        {
            let mut cache = store(storage.clone());
            cache.set(&sku, &model, Method::Ai, record("h1", 0.7));
            cache.set_selected_method(&sku, &model, Method::Ai);
        }
        let cache = store(storage);
        let entry = cache.entry(&sku, &model).unwrap();
        assert_eq!(entry.selected, Some(Method::Ai));
        assert_eq!(entry.ai.as_ref().unwrap().parameters["alpha"], 0.7);
        assert_eq!(cache.version(), 0);
    }

    #[test]
    fn write_failure_keeps_memory_state_and_still_signals() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_writes(true);
        let mut cache = store(storage.clone());
        let rx = cache.subscribe();
        let (sku, model) = (Sku::new("S1"), ModelId::new("m"));

        cache.set(&sku, &model, Method::Grid, record("h1", 0.2));
        assert!(cache.get(&sku, &model, Method::Grid).is_some());
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn subscribers_observe_post_write_version() {
        let storage = Arc::new(MemoryStorage::new());
        let mut cache = store(storage.clone());
        let mut rx = cache.subscribe();
        cache.set(&Sku::new("S1"), &ModelId::new("m"), Method::Grid, record("h", 0.1));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        // The slot was written before the version went out.
        assert!(storage.read("cache").unwrap().unwrap().contains("\"S1\""));
    }
}
