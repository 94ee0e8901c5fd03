//! Best-method resolution for a (SKU, model) pair.
//!
//! Order is fixed: explicit selection, then a valid `ai` record (unless AI is
//! disabled), then a valid `grid` record, then `manual`.
//!
//! A selection written by the queue processor (`SelectionSource::Optimizer`)
//! is only a hint: it is honored while its record is fresh and, for `ai`,
//! while AI is enabled. A user selection is returned unconditionally.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStore;
use crate::types::{Method, ModelId, SelectionSource, Sku};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub method: Method,
    /// The method is the user's explicit selection.
    pub explicit: bool,
    /// A fresh record exists for `method`. An explicit selection can point at
    /// a stale or missing record; consumers then use static defaults.
    pub record_valid: bool,
}

pub fn resolve(
    cache: &CacheStore,
    sku: &Sku,
    model_id: &ModelId,
    current_hash: &str,
    ai_disabled: bool,
) -> Resolution {
    resolve_at(cache, sku, model_id, current_hash, ai_disabled, Utc::now())
}

pub fn resolve_at(
    cache: &CacheStore,
    sku: &Sku,
    model_id: &ModelId,
    current_hash: &str,
    ai_disabled: bool,
    now: DateTime<Utc>,
) -> Resolution {
    let valid = |m: Method| cache.is_valid_at(sku, model_id, m, current_hash, now);

    if let Some(entry) = cache.entry(sku, model_id) {
        match (entry.selected, entry.selected_by) {
            (Some(selected), Some(SelectionSource::Optimizer)) => {
                let usable = valid(selected) && !(selected == Method::Ai && ai_disabled);
                if usable {
                    return Resolution {
                        method: selected,
                        explicit: false,
                        record_valid: true,
                    };
                }
            }
            (Some(selected), _) => {
                return Resolution {
                    method: selected,
                    explicit: true,
                    record_valid: valid(selected),
                };
            }
            (None, _) => {}
        }
    }

    for method in Method::AUTO_PRIORITY {
        if method == Method::Ai && ai_disabled {
            continue;
        }
        if valid(method) {
            return Resolution {
                method,
                explicit: false,
                record_valid: true,
            };
        }
    }

    Resolution {
        method: Method::Manual,
        explicit: false,
        record_valid: valid(Method::Manual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::{OptimizationRecord, ParamMap};
    use std::sync::Arc;

    fn cache() -> CacheStore {
        CacheStore::open(Arc::new(MemoryStorage::new()), "c", chrono::Duration::hours(24))
    }

    fn rec(hash: &str) -> OptimizationRecord {
        OptimizationRecord::new(ParamMap::new(), hash)
    }

    fn ids() -> (Sku, ModelId) {
        (Sku::new("S1"), ModelId::new("holt_winters"))
    }

    #[test]
    fn ai_beats_grid_beats_manual() {
        let mut c = cache();
        let (sku, model) = ids();
        assert_eq!(resolve(&c, &sku, &model, "h", false).method, Method::Manual);

        c.set(&sku, &model, Method::Grid, rec("h"));
        assert_eq!(resolve(&c, &sku, &model, "h", false).method, Method::Grid);

        c.set(&sku, &model, Method::Ai, rec("h"));
        let r = resolve(&c, &sku, &model, "h", false);
        assert_eq!(r.method, Method::Ai);
        assert!(!r.explicit);
    }

    #[test]
    fn disabled_ai_is_passed_over() {
        let mut c = cache();
        let (sku, model) = ids();
        c.set(&sku, &model, Method::Ai, rec("h"));
        assert_eq!(resolve(&c, &sku, &model, "h", true).method, Method::Manual);
        c.set(&sku, &model, Method::Grid, rec("h"));
        assert_eq!(resolve(&c, &sku, &model, "h", true).method, Method::Grid);
    }

    #[test]
    fn stale_records_are_ignored() {
        let mut c = cache();
        let (sku, model) = ids();
        c.set(&sku, &model, Method::Ai, rec("old"));
        c.set(&sku, &model, Method::Grid, rec("old"));
        assert_eq!(resolve(&c, &sku, &model, "new", false).method, Method::Manual);
    }

    #[test]
    fn explicit_selection_wins_even_when_stale() {
        let mut c = cache();
        let (sku, model) = ids();
        c.set(&sku, &model, Method::Ai, rec("h"));
        c.set(&sku, &model, Method::Grid, rec("old"));
        c.set_selected_method(&sku, &model, Method::Grid);

        let r = resolve(&c, &sku, &model, "h", false);
        assert_eq!(r.method, Method::Grid);
        assert!(r.explicit);
        assert!(!r.record_valid);
    }

    #[test]
    fn optimizer_hint_yields_to_fresher_state() {
        let mut c = cache();
        let (sku, model) = ids();
        c.update_entry(&sku, &model, |e| {
            e.grid = Some(rec("h"));
            e.ai = Some(rec("h"));
            e.selected = Some(Method::Grid);
            e.selected_by = Some(SelectionSource::Optimizer);
        });
        // A valid optimizer hint is followed as-is.
        assert_eq!(resolve(&c, &sku, &model, "h", false).method, Method::Grid);

        c.update_entry(&sku, &model, |e| e.selected = Some(Method::Ai));
        assert_eq!(resolve(&c, &sku, &model, "h", false).method, Method::Ai);
        // Disabled AI drops the hint back to the automatic order.
        assert_eq!(resolve(&c, &sku, &model, "h", true).method, Method::Grid);
        // So does a stale hinted record.
        let r = resolve(&c, &sku, &model, "other", false);
        assert_eq!(r.method, Method::Manual);
        assert!(!r.explicit);
    }

    #[test]
    fn explicit_manual_overrides_valid_ai() {
        let mut c = cache();
        let (sku, model) = ids();
        c.set(&sku, &model, Method::Ai, rec("h"));
        c.set_selected_method(&sku, &model, Method::Manual);
        assert_eq!(resolve(&c, &sku, &model, "h", false).method, Method::Manual);
    }
}
