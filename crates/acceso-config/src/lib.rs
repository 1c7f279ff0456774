use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/acceso-facial/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/acceso-facial/config.toml";
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.35;
pub const DEFAULT_ORACLE_THRESHOLD: f64 = 0.40;
pub const DEFAULT_MAX_ENROLLMENT_IMAGES: usize = 3;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_JITTERS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    #[default]
    Thumbnail,
    Dlib,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub gallery_dir: Option<PathBuf>,
    pub match_threshold: Option<f64>,
    pub oracle_threshold: Option<f64>,
    pub max_enrollment_images: Option<usize>,
    pub scan_timeout_secs: Option<u64>,
    pub max_concurrent_comparisons: Option<usize>,
    pub parallel_scan: Option<bool>,
    pub require_identity_key: Option<bool>,
    pub oracle: Option<OracleKind>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// `None` defers to `ACCESO_GALLERY_DIR`, then the built-in default.
    pub gallery_dir: Option<PathBuf>,
    pub match_threshold: f64,
    pub oracle_threshold: f64,
    pub max_enrollment_images: usize,
    pub scan_timeout: Duration,
    pub max_concurrent_comparisons: usize,
    pub parallel_scan: bool,
    pub require_identity_key: bool,
    pub oracle: OracleKind,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: u32,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            gallery_dir: raw.gallery_dir,
            match_threshold: raw.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            oracle_threshold: raw.oracle_threshold.unwrap_or(DEFAULT_ORACLE_THRESHOLD),
            max_enrollment_images: raw
                .max_enrollment_images
                .unwrap_or(DEFAULT_MAX_ENROLLMENT_IMAGES),
            scan_timeout: Duration::from_secs(
                raw.scan_timeout_secs
                    .unwrap_or(DEFAULT_SCAN_TIMEOUT_SECS)
                    .max(1),
            ),
            max_concurrent_comparisons: raw
                .max_concurrent_comparisons
                .unwrap_or_else(default_concurrency)
                .max(1),
            parallel_scan: raw.parallel_scan.unwrap_or(false),
            require_identity_key: raw.require_identity_key.unwrap_or(false),
            oracle: raw.oracle.unwrap_or_default(),
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS),
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        for (key, value) in [
            ("match_threshold", self.match_threshold),
            ("oracle_threshold", self.oracle_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("{key} must be a positive number, got {value}"),
                });
            }
        }
        if self.max_enrollment_images == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "max_enrollment_images must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

fn default_concurrency() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid setting in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

pub fn default_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_paths())
}

/// First existing file wins; later paths are not merged.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig {
                    contents: parsed,
                    source: path.clone(),
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let resolved = ResolvedConfig::from_raw(entry.contents);
            resolved.validate(&entry.source)?;
            Ok(ResolvedConfigWithSource {
                resolved,
                source: Some(entry.source),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
