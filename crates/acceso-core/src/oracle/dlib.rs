use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use dlib_face_recognition::{
    FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
    LandmarkPredictor, LandmarkPredictorTrait,
};
use image::RgbImage;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::oracle::{
    cosine_distance, FaceComparison, FaceOracle, ImageRole, OracleError, ProbeCache,
};

const LANDMARK_ENV: &str = "DLIB_LANDMARK_MODEL";
const ENCODER_ENV: &str = "DLIB_ENCODER_MODEL";

#[derive(Debug, Clone, Default)]
pub struct FaceModelConfig {
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

pub trait ModelPathResolver {
    fn resolve(&self, config: &FaceModelConfig) -> AppResult<FaceModelPaths>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModelPathResolver;

impl ModelPathResolver for EnvModelPathResolver {
    fn resolve(&self, config: &FaceModelConfig) -> AppResult<FaceModelPaths> {
        let landmark = config
            .landmark_model
            .clone()
            .or_else(|| env::var(LANDMARK_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "landmark predictor",
                flag: "landmark_model",
                env: LANDMARK_ENV,
            })?;

        let encoder = config
            .encoder_model
            .clone()
            .or_else(|| env::var(ENCODER_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "face encoding network",
                flag: "encoder_model",
                env: ENCODER_ENV,
            })?;

        Ok(FaceModelPaths { landmark, encoder })
    }
}

struct DlibBackend {
    detector: FaceDetector,
    predictor: LandmarkPredictor,
    encoder: FaceEncoderNetwork,
}

impl DlibBackend {
    fn new(models: &FaceModelPaths) -> AppResult<Self> {
        debug!(path = %models.landmark.display(), "loading landmark model");
        let predictor =
            LandmarkPredictor::open(&models.landmark).map_err(|message| AppError::ModelLoad {
                path: models.landmark.clone(),
                message,
            })?;
        debug!(path = %models.encoder.display(), "loading encoder model");
        let encoder =
            FaceEncoderNetwork::open(&models.encoder).map_err(|message| AppError::ModelLoad {
                path: models.encoder.clone(),
                message,
            })?;

        Ok(Self {
            detector: FaceDetector::new(),
            predictor,
            encoder,
        })
    }

    /// Embedding of the first detected face.
    fn embed(&self, image: &RgbImage, jitters: u32) -> Option<Vec<f64>> {
        let matrix = ImageMatrix::from_image(image);
        let locations = self.detector.face_locations(&matrix);
        let rect = locations.iter().next()?;
        let landmarks = vec![self.predictor.face_landmarks(&matrix, rect)];
        let encodings = self.encoder.get_face_encodings(&matrix, &landmarks, jitters);
        encodings.iter().next().map(|encoding| encoding.as_ref().to_vec())
    }
}

/// Face-embedding oracle backed by dlib's ResNet encoder.
///
/// The dlib models are not shared between threads, so extraction runs one
/// image at a time and a parallel scan only overlaps sample reads. The probe
/// is embedded once per capture.
pub struct DlibOracle {
    backend: Mutex<DlibBackend>,
    probe_cache: ProbeCache,
    jitters: u32,
    threshold: f64,
}

impl DlibOracle {
    pub fn new(models: &FaceModelPaths, jitters: u32, threshold: f64) -> AppResult<Self> {
        Ok(Self {
            backend: Mutex::new(DlibBackend::new(models)?),
            probe_cache: ProbeCache::new(),
            jitters,
            threshold,
        })
    }

    pub fn from_config(config: &FaceModelConfig, jitters: u32, threshold: f64) -> AppResult<Self> {
        let models = EnvModelPathResolver.resolve(config)?;
        Self::new(&models, jitters, threshold)
    }

    fn embedding(&self, bytes: &[u8], role: ImageRole) -> Result<Vec<f64>, OracleError> {
        let rgb = image::load_from_memory(bytes)
            .map_err(|err| OracleError::Decode {
                role,
                message: err.to_string(),
            })?
            .to_rgb8();
        let backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        backend
            .embed(&rgb, self.jitters)
            .ok_or(OracleError::NoFace(role))
    }
}

impl FaceOracle for DlibOracle {
    fn compare(&self, probe: &[u8], reference: &[u8]) -> Result<FaceComparison, OracleError> {
        let probe = self
            .probe_cache
            .get_or_try_insert(probe, || self.embedding(probe, ImageRole::Probe))?;
        let reference = self.embedding(reference, ImageRole::Reference)?;
        let distance = cosine_distance(&probe, &reference)?;
        Ok(FaceComparison {
            verified: distance <= self.threshold,
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_model_paths_take_precedence() {
        let config = FaceModelConfig {
            landmark_model: Some(PathBuf::from("/models/landmark.dat")),
            encoder_model: Some(PathBuf::from("/models/encoder.dat")),
        };
        let models = EnvModelPathResolver.resolve(&config).unwrap();
        assert_eq!(models.landmark, PathBuf::from("/models/landmark.dat"));
        assert_eq!(models.encoder, PathBuf::from("/models/encoder.dat"));
    }

    #[test]
    fn missing_model_paths_are_reported() {
        if env::var(LANDMARK_ENV).is_ok() {
            return;
        }
        let err = EnvModelPathResolver
            .resolve(&FaceModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, AppError::MissingModel { env: LANDMARK_ENV, .. }));
    }
}
