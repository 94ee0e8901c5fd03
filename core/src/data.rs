use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::fingerprint::series_digest;
use crate::types::{SeriesPoint, Sku};

pub type SharedData = Arc<RwLock<SalesData>>;

/// Cleaned per-SKU history. Points are sorted by date with one value per date
/// and only finite values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesData {
    series: BTreeMap<Sku, Vec<SeriesPoint>>,
}

impl SalesData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedData {
        Arc::new(RwLock::new(self))
    }

    /// Replaces the series of `sku`; returns the number of points kept.
    pub fn replace(&mut self, sku: &Sku, points: Vec<SeriesPoint>) -> usize {
        let cleaned = clean(points);
        let n = cleaned.len();
        if cleaned.is_empty() {
            self.series.remove(sku);
        } else {
            self.series.insert(sku.clone(), cleaned);
        }
        n
    }

    pub fn remove(&mut self, sku: &Sku) -> bool {
        self.series.remove(sku).is_some()
    }

    pub fn series(&self, sku: &Sku) -> Option<&[SeriesPoint]> {
        self.series.get(sku).map(Vec::as_slice)
    }

    pub fn digest(&self, sku: &Sku) -> Option<String> {
        self.series(sku).map(series_digest)
    }

    pub fn skus(&self) -> impl Iterator<Item = &Sku> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

fn clean(points: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
    let mut by_date: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
    for p in points {
        if p.value.is_finite() {
            // Later rows win for duplicate dates.
            by_date.insert(p.date, p.value);
        }
    }
    by_date
        .into_iter()
        .map(|(date, value)| SeriesPoint { date, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn replace_sorts_dedups_and_drops_non_finite() {
        let mut data = SalesData::new();
        let sku = Sku::new("S1");
        let kept = data.replace(
            &sku,
            vec![
                SeriesPoint::new(d(3), 30.0),
                SeriesPoint::new(d(1), 10.0),
                SeriesPoint::new(d(2), f64::NAN),
                SeriesPoint::new(d(1), 11.0),
            ],
        );
        assert_eq!(kept, 2);
        let s = data.series(&sku).unwrap();
        assert_eq!(s[0], SeriesPoint::new(d(1), 11.0));
        assert_eq!(s[1], SeriesPoint::new(d(3), 30.0));
    }

    #[test]
    fn digest_changes_with_data() {
        let mut data = SalesData::new();
        let sku = Sku::new("S1");
        data.replace(&sku, vec![SeriesPoint::new(d(1), 1.0)]);
        let a = data.digest(&sku).unwrap();
        data.replace(&sku, vec![SeriesPoint::new(d(1), 2.0)]);
        assert_ne!(a, data.digest(&sku).unwrap());
        data.replace(&sku, vec![]);
        assert!(data.digest(&sku).is_none());
    }
}
