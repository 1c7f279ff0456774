use image::imageops::FilterType;

use crate::oracle::{
    cosine_distance, FaceComparison, FaceOracle, ImageRole, OracleError, ProbeCache,
    DEFAULT_ORACLE_THRESHOLD,
};

const THUMBNAIL_SIDE: u32 = 32;

/// Model-free comparison of mean-centred grayscale thumbnails.
///
/// Useful as a default when no embedding model is installed and for
/// exercising the gallery end to end; it does not locate faces.
#[derive(Debug)]
pub struct ThumbnailOracle {
    threshold: f64,
    probe_cache: ProbeCache,
}

impl ThumbnailOracle {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            probe_cache: ProbeCache::new(),
        }
    }
}

impl Default for ThumbnailOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_THRESHOLD)
    }
}

impl FaceOracle for ThumbnailOracle {
    fn compare(&self, probe: &[u8], reference: &[u8]) -> Result<FaceComparison, OracleError> {
        let probe = self
            .probe_cache
            .get_or_try_insert(probe, || thumbnail_signal(probe, ImageRole::Probe))?;
        let reference = thumbnail_signal(reference, ImageRole::Reference)?;
        let distance = cosine_distance(&probe, &reference)?;
        Ok(FaceComparison {
            verified: distance <= self.threshold,
            distance,
        })
    }
}

fn thumbnail_signal(bytes: &[u8], role: ImageRole) -> Result<Vec<f64>, OracleError> {
    let image = image::load_from_memory(bytes).map_err(|err| OracleError::Decode {
        role,
        message: err.to_string(),
    })?;
    let gray = image
        .resize_exact(THUMBNAIL_SIDE, THUMBNAIL_SIDE, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<f64> = gray.pixels().map(|pixel| f64::from(pixel[0])).collect();
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
    let centred: Vec<f64> = pixels.iter().map(|value| value - mean).collect();
    let energy = centred.iter().map(|value| value * value).sum::<f64>();
    if energy <= f64::EPSILON {
        return Err(OracleError::Featureless(role));
    }
    Ok(centred)
}
