use std::path::{Path, PathBuf};

use acceso_config::{ConfigError, ResolvedConfig, ResolvedConfigWithSource};
use acceso_core::enrollment::EnrollmentSettings;
use acceso_core::gallery::{EnvGalleryDirResolver, GalleryDirResolver};
use acceso_core::verification::EngineSettings;
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub fn load_config() -> AppResult<ResolvedConfig> {
    announce(acceso_config::load_resolved_config().map_err(map_config_error)?)
}

pub fn load_config_from(paths: &[PathBuf]) -> AppResult<ResolvedConfig> {
    announce(acceso_config::load_resolved_from_paths(paths).map_err(map_config_error)?)
}

fn announce(loaded: ResolvedConfigWithSource) -> AppResult<ResolvedConfig> {
    match &loaded.source {
        Some(path) => debug!(path = %path.display(), "loaded configuration"),
        None => debug!("no configuration file found; using defaults"),
    }
    Ok(loaded.resolved)
}

/// Flag, then config file, then `ACCESO_GALLERY_DIR`, then the built-in default.
pub fn resolve_gallery_dir(cli_value: Option<&Path>, config: &ResolvedConfig) -> PathBuf {
    let override_dir = cli_value.or(config.gallery_dir.as_deref());
    EnvGalleryDirResolver.resolve(override_dir)
}

pub fn engine_settings(config: &ResolvedConfig) -> EngineSettings {
    EngineSettings {
        match_threshold: config.match_threshold,
        scan_timeout: config.scan_timeout,
        max_concurrent_comparisons: config.max_concurrent_comparisons,
        parallel_scan: config.parallel_scan,
    }
}

pub fn enrollment_settings(config: &ResolvedConfig) -> EnrollmentSettings {
    EnrollmentSettings {
        max_images: config.max_enrollment_images,
        require_identity_key: config.require_identity_key,
    }
}

fn map_config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
        ConfigError::Parse { path, message } | ConfigError::Invalid { path, message } => {
            AppError::ConfigParse { path, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn cli_value_wins_over_config() {
        let config = ResolvedConfig {
            gallery_dir: Some(PathBuf::from("/srv/config")),
            ..ResolvedConfig::default()
        };
        let resolved = resolve_gallery_dir(Some(Path::new("/tmp/cli")), &config);
        assert_eq!(resolved, PathBuf::from("/tmp/cli"));

        let resolved = resolve_gallery_dir(None, &config);
        assert_eq!(resolved, PathBuf::from("/srv/config"));
    }

    #[test]
    fn config_values_feed_core_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "match_threshold = 0.3\nscan_timeout_secs = 7\nmax_enrollment_images = 5\nrequire_identity_key = true\n",
        )
        .unwrap();

        let config = load_config_from(&[path]).unwrap();
        let engine = engine_settings(&config);
        assert_eq!(engine.match_threshold, 0.3);
        assert_eq!(engine.scan_timeout, Duration::from_secs(7));
        let enrollment = enrollment_settings(&config);
        assert_eq!(enrollment.max_images, 5);
        assert!(enrollment.require_identity_key);
    }

    #[test]
    fn parse_error_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "gallery_dir = { not = 'toml' }").unwrap();

        let err = load_config_from(&[path.clone()]).unwrap_err();
        match err {
            AppError::ConfigParse { path: err_path, .. } => assert_eq!(err_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn io_error_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::create_dir_all(&path).unwrap();

        let err = load_config_from(&[path.clone()]).unwrap_err();
        assert!(matches!(err, AppError::ConfigRead { .. }));
    }
}
