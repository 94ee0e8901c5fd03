//! Durable client-side storage: named slots holding one JSON document each.
//!
//! Only the cache store, the job queue and the engine's data/breaker
//! snapshots touch this layer. Read/write failures are logged by callers and
//! degrade to empty state; they never crash the engine.

mod memory;

pub use memory::MemoryStorage;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub trait DurableStorage: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the slot has never been written.
    fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the whole slot. Implementations must make the replacement
    /// atomic: readers see the old or the new document, never a mix.
    fn write(&self, slot: &str, contents: &str) -> Result<(), StorageError>;
}

/// Reads and decodes a slot, treating a missing, unreadable or corrupt slot as
/// `T::default()`.
pub fn load_or_default<T>(storage: &dyn DurableStorage, slot: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match storage.read(slot) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!(
                target: "tuner.storage",
                backend = storage.name(),
                slot,
                error = %e,
                "storage read failed, starting empty"
            );
            return T::default();
        }
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(v) => v,
        Err(source) => {
            let e = StorageError::Corrupt {
                slot: slot.to_string(),
                source,
            };
            tracing::warn!(
                target: "tuner.storage",
                backend = storage.name(),
                slot,
                error = %e,
                "storage slot corrupt, starting empty"
            );
            T::default()
        }
    }
}

/// Serializes `value` and writes it in one call.
pub fn store_json<T>(storage: &dyn DurableStorage, slot: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        slot: slot.to_string(),
        source,
    })?;
    storage.write(slot, &json)
}

/// Like [`store_json`] but logs instead of returning the error.
pub fn store_json_logged<T>(storage: &dyn DurableStorage, slot: &str, value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    match store_json(storage, slot, value) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                target: "tuner.storage",
                backend = storage.name(),
                slot,
                error = %e,
                "storage write failed, in-memory state kept"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn corrupt_slot_degrades_to_default() {
        let storage = MemoryStorage::new();
        storage.write("slot", "{not json").unwrap();
        let v: BTreeMap<String, u32> = load_or_default(&storage, "slot");
        assert!(v.is_empty());
    }

    #[test]
    fn failed_write_is_reported_not_raised() {
        let storage = MemoryStorage::new();
        storage.fail_writes(true);
        assert!(!store_json_logged(&storage, "slot", &vec![1, 2, 3]));
        assert_eq!(storage.read("slot").unwrap(), None);

        storage.fail_writes(false);
        assert!(store_json_logged(&storage, "slot", &vec![1, 2, 3]));
        let v: Vec<u32> = load_or_default(&storage, "slot");
        assert_eq!(v, vec![1, 2, 3]);
    }
}
