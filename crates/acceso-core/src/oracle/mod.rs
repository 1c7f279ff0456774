#[cfg(feature = "dlib")]
pub mod dlib;
pub mod thumbnail;

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "dlib")]
pub use dlib::{DlibOracle, EnvModelPathResolver, FaceModelConfig, FaceModelPaths, ModelPathResolver};
pub use thumbnail::ThumbnailOracle;

/// Default cosine-distance cut-off applied by the bundled oracles' own verdict.
pub const DEFAULT_ORACLE_THRESHOLD: f64 = 0.40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceComparison {
    pub verified: bool,
    pub distance: f64,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to decode {role} image: {message}")]
    Decode { role: ImageRole, message: String },
    #[error("no face detected in {0} image")]
    NoFace(ImageRole),
    #[error("{0} image carries no usable signal")]
    Featureless(ImageRole),
    #[error("embedding length mismatch: probe {probe}, reference {reference}")]
    DimensionMismatch { probe: usize, reference: usize },
    #[error("face comparison backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Probe,
    Reference,
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRole::Probe => f.write_str("probe"),
            ImageRole::Reference => f.write_str("reference"),
        }
    }
}

/// Face comparison capability consumed by the verification engine.
///
/// Lower `distance` means more similar. `verified` is the implementation's own
/// judgment; callers apply their own threshold on top of the distance.
pub trait FaceOracle: Send + Sync {
    fn compare(&self, probe: &[u8], reference: &[u8]) -> Result<FaceComparison, OracleError>;
}

pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    dot / (norm_lhs.sqrt() * norm_rhs.sqrt())
}

pub fn cosine_distance(lhs: &[f64], rhs: &[f64]) -> Result<f64, OracleError> {
    if lhs.len() != rhs.len() {
        return Err(OracleError::DimensionMismatch {
            probe: lhs.len(),
            reference: rhs.len(),
        });
    }
    let distance = 1.0 - cosine_similarity(lhs, rhs);
    if distance.is_finite() {
        Ok(distance.max(0.0))
    } else {
        Err(OracleError::Backend("cosine distance is not finite".into()))
    }
}

/// Remembers the features of the most recent probe.
///
/// A verify call compares one probe against every sample, so oracles
/// extract the probe once and reuse it for the rest of the scan.
#[derive(Debug, Default)]
pub struct ProbeCache {
    last: Mutex<Option<(Vec<u8>, Vec<f64>)>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert<F>(&self, probe: &[u8], extract: F) -> Result<Vec<f64>, OracleError>
    where
        F: FnOnce() -> Result<Vec<f64>, OracleError>,
    {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((bytes, features)) = last.as_ref() {
            if bytes.as_slice() == probe {
                return Ok(features.clone());
            }
        }
        let features = extract()?;
        *last = Some((probe.to_vec(), features.clone()));
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn probe_cache_extracts_each_probe_once() {
        let cache = ProbeCache::new();
        let calls = Cell::new(0);
        let extract = |value: f64| -> Result<Vec<f64>, OracleError> {
            calls.set(calls.get() + 1);
            Ok(vec![value])
        };

        assert_eq!(cache.get_or_try_insert(b"a", || extract(1.0)).unwrap(), vec![1.0]);
        assert_eq!(cache.get_or_try_insert(b"a", || extract(9.0)).unwrap(), vec![1.0]);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.get_or_try_insert(b"b", || extract(2.0)).unwrap(), vec![2.0]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn probe_cache_does_not_keep_failures() {
        let cache = ProbeCache::new();
        let err = cache
            .get_or_try_insert(b"a", || Err(OracleError::NoFace(ImageRole::Probe)))
            .unwrap_err();
        assert!(matches!(err, OracleError::NoFace(ImageRole::Probe)));
        assert_eq!(cache.get_or_try_insert(b"a", || Ok(vec![3.0])).unwrap(), vec![3.0]);
    }

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        let distance = cosine_distance(&[0.3, 0.4, 0.5], &[0.3, 0.4, 0.5]).unwrap();
        assert!(distance.abs() < 1e-9);
    }

    #[test]
    fn cosine_distance_of_orthogonal_vectors_is_one() {
        let distance = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_distance_rejects_mismatched_lengths() {
        let err = cosine_distance(&[1.0, 0.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            OracleError::DimensionMismatch {
                probe: 2,
                reference: 1
            }
        ));
    }

    #[test]
    fn cosine_distance_rejects_zero_vectors() {
        assert!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).is_err());
    }
}
