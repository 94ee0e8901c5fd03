//! Content fingerprints used as cache validity keys and queue dedup keys.
//!
//! Both digests are SHA-256 over canonical JSON. `ParamMap` is a `BTreeMap`,
//! so parameter order never leaks into the output.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{Method, MetricWeights, ModelId, ParamMap, SeriesPoint, Sku};

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintInput<'a> {
    pub sku: &'a Sku,
    pub model_id: &'a ModelId,
    pub method: Option<Method>,
    pub parameters: Option<&'a ParamMap>,
    pub weights: &'a MetricWeights,
    pub series_digest: &'a str,
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of the ordered `(date, value)` pairs of a series. Any edit,
/// addition or removal changes it.
pub fn series_digest(points: &[SeriesPoint]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((points.len() as u64).to_le_bytes());
    for p in points {
        hasher.update(p.date.to_string().as_bytes());
        hasher.update([0u8]);
        // Bit pattern keeps -0.0/0.0 and NaN payloads distinct.
        hasher.update(p.value.to_bits().to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn fingerprint(input: &FingerprintInput<'_>) -> String {
    // Serializing plain strings, floats and maps cannot fail; fall back to the
    // debug form so the function stays total.
    match serde_json::to_vec(input) {
        Ok(json) => hex_digest(&json),
        Err(_) => hex_digest(format!("{input:?}").as_bytes()),
    }
}

/// Method-independent fingerprint stored as `OptimizationRecord::data_hash`.
pub fn data_hash(
    sku: &Sku,
    model_id: &ModelId,
    weights: &MetricWeights,
    series_digest: &str,
) -> String {
    fingerprint(&FingerprintInput {
        sku,
        model_id,
        method: None,
        parameters: None,
        weights,
        series_digest,
    })
}

/// Fingerprint of a queued job; two jobs with equal fingerprints would
/// produce the same cache write.
pub fn job_fingerprint(
    sku: &Sku,
    model_id: &ModelId,
    method: Method,
    parameters: &ParamMap,
    weights: &MetricWeights,
    series_digest: &str,
) -> String {
    fingerprint(&FingerprintInput {
        sku,
        model_id,
        method: Some(method),
        parameters: Some(parameters),
        weights,
        series_digest,
    })
}
