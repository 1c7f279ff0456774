use std::sync::Arc;

use acceso_config::{OracleKind, ResolvedConfig};
use acceso_core::oracle::{FaceOracle, ThumbnailOracle};
use tracing::info;

use crate::errors::AppResult;

/// Builds the comparison oracle once per process; callers share the handle.
pub fn build_oracle(config: &ResolvedConfig) -> AppResult<Arc<dyn FaceOracle>> {
    match config.oracle {
        OracleKind::Thumbnail => {
            info!(threshold = config.oracle_threshold, "using thumbnail oracle");
            Ok(Arc::new(ThumbnailOracle::new(config.oracle_threshold)))
        }
        OracleKind::Dlib => build_dlib_oracle(config),
    }
}

#[cfg(feature = "dlib")]
fn build_dlib_oracle(config: &ResolvedConfig) -> AppResult<Arc<dyn FaceOracle>> {
    use acceso_core::oracle::{DlibOracle, FaceModelConfig};

    let models = FaceModelConfig {
        landmark_model: config.landmark_model.clone(),
        encoder_model: config.encoder_model.clone(),
    };
    let oracle = DlibOracle::from_config(&models, config.jitters, config.oracle_threshold)?;
    info!(jitters = config.jitters, "using dlib oracle");
    Ok(Arc::new(oracle))
}

#[cfg(not(feature = "dlib"))]
fn build_dlib_oracle(_config: &ResolvedConfig) -> AppResult<Arc<dyn FaceOracle>> {
    Err(crate::errors::AppError::OracleInit(
        "this build does not include dlib support; rebuild with --features dlib".into(),
    ))
}
