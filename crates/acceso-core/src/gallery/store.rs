use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::ImageFormat;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::keys::{GalleryScope, IdentityKey, IdentityScope};

pub const DEFAULT_GALLERY_DIR: &str = "/var/lib/acceso-facial/rostros";
pub const GALLERY_DIR_ENV: &str = "ACCESO_GALLERY_DIR";
const MAX_APPEND_ATTEMPTS: u32 = 64;

/// One stored reference image, as returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRef {
    pub identity: IdentityKey,
    pub sample_id: u32,
    pub location: PathBuf,
}

pub trait GalleryStore: Send + Sync {
    fn ensure_scope(&self, scope: &IdentityScope) -> AppResult<()>;
    fn append_sample(
        &self,
        scope: &IdentityScope,
        bytes: &[u8],
        extension: &str,
    ) -> AppResult<SampleRef>;
    /// Ordered by identity key, then sample id. Unknown scopes are empty.
    fn list_samples(&self, scope: &GalleryScope) -> AppResult<Vec<SampleRef>>;
    fn read_sample(&self, sample: &SampleRef) -> AppResult<Vec<u8>>;
    fn remove_identity(&self, scope: &IdentityScope) -> AppResult<usize>;
}

pub trait GalleryDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvGalleryDirResolver;

impl GalleryDirResolver for EnvGalleryDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(env_value) = env::var(GALLERY_DIR_ENV) {
            PathBuf::from(env_value)
        } else {
            PathBuf::from(DEFAULT_GALLERY_DIR)
        }
    }
}

/// Layout: `root/category/subcategory/identity/<sample_id>.<ext>`.
#[derive(Debug, Default)]
pub struct FilesystemGallery {
    root: PathBuf,
    identity_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FilesystemGallery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(override_dir: Option<&Path>) -> Self {
        Self::new(EnvGalleryDirResolver.resolve(override_dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope_dir(&self, scope: &GalleryScope) -> PathBuf {
        self.root
            .join(scope.category.key())
            .join(scope.subcategory.as_str())
    }

    pub fn identity_dir(&self, scope: &IdentityScope) -> PathBuf {
        self.scope_dir(&scope.gallery).join(scope.identity.as_str())
    }

    fn identity_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .identity_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }

    /// Drops the lock entry of a removed identity unless another caller holds it.
    fn forget_identity_lock(&self, dir: &Path) {
        let mut locks = self
            .identity_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(dir)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(dir);
        }
    }
}

impl GalleryStore for FilesystemGallery {
    fn ensure_scope(&self, scope: &IdentityScope) -> AppResult<()> {
        let dir = self.identity_dir(scope);
        create_private_dir(&dir).map_err(|source| AppError::StoreUnavailable {
            path: dir.clone(),
            source,
        })
    }

    fn append_sample(
        &self,
        scope: &IdentityScope,
        bytes: &[u8],
        extension: &str,
    ) -> AppResult<SampleRef> {
        let dir = self.identity_dir(scope);
        self.ensure_scope(scope)?;

        let lock = self.identity_lock(&dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tmp = write_temp_sample(&dir, bytes)?;
        let mut sample_id = next_sample_id(&dir)?;
        for _ in 0..MAX_APPEND_ATTEMPTS {
            let target = dir.join(format!("{sample_id}.{extension}"));
            match tmp.persist_noclobber(&target) {
                Ok(_) => {
                    debug!(path = %target.display(), "stored sample");
                    return Ok(SampleRef {
                        identity: scope.identity.clone(),
                        sample_id,
                        location: target,
                    });
                }
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %target.display(), "sample id taken; retrying");
                    tmp = err.file;
                    sample_id = following_id(&dir, sample_id)?;
                }
                Err(err) => {
                    return Err(AppError::StoreUnavailable {
                        path: target,
                        source: err.error,
                    })
                }
            }
        }

        Err(AppError::StoreInconsistent {
            path: dir,
            message: format!("no free sample id after {MAX_APPEND_ATTEMPTS} attempts"),
        })
    }

    fn list_samples(&self, scope: &GalleryScope) -> AppResult<Vec<SampleRef>> {
        let base = self.scope_dir(scope);
        let mut identities = Vec::new();
        for (name, path) in read_dir_sorted(&base)? {
            if path.is_dir() {
                identities.push((name, path));
            }
        }

        let mut samples = Vec::new();
        for (name, dir) in identities {
            let identity = IdentityKey::from_stored(name);
            for (sample_id, location) in stored_samples(&dir)? {
                samples.push(SampleRef {
                    identity: identity.clone(),
                    sample_id,
                    location,
                });
            }
        }
        Ok(samples)
    }

    fn read_sample(&self, sample: &SampleRef) -> AppResult<Vec<u8>> {
        fs::read(&sample.location).map_err(|source| AppError::StoreUnavailable {
            path: sample.location.clone(),
            source,
        })
    }

    fn remove_identity(&self, scope: &IdentityScope) -> AppResult<usize> {
        let dir = self.identity_dir(scope);
        if !dir.is_dir() {
            return Err(AppError::IdentityNotFound {
                category: scope.gallery.category.to_string(),
                subcategory: scope.gallery.subcategory.to_string(),
                identity: scope.identity.to_string(),
            });
        }

        let lock = self.identity_lock(&dir);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = stored_samples(&dir)?.len();
        fs::remove_dir_all(&dir).map_err(|source| AppError::StoreUnavailable {
            path: dir.clone(),
            source,
        })?;
        drop(guard);
        drop(lock);
        self.forget_identity_lock(&dir);
        Ok(removed)
    }
}

fn write_temp_sample(dir: &Path, bytes: &[u8]) -> AppResult<NamedTempFile> {
    let store_err = |source: io::Error| AppError::StoreUnavailable {
        path: dir.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(store_err)?;
    {
        let file = tmp.as_file_mut();
        file.write_all(bytes).map_err(store_err)?;
        file.flush().map_err(store_err)?;
        file.sync_all().map_err(store_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(store_err)?;
        }
    }
    Ok(tmp)
}

fn next_sample_id(dir: &Path) -> AppResult<u32> {
    let highest = stored_samples(dir)?
        .into_iter()
        .map(|(sample_id, _)| sample_id)
        .max();
    match highest {
        Some(highest) => following_id(dir, highest),
        None => Ok(1),
    }
}

fn following_id(dir: &Path, sample_id: u32) -> AppResult<u32> {
    sample_id
        .checked_add(1)
        .ok_or_else(|| AppError::StoreInconsistent {
            path: dir.to_path_buf(),
            message: "sample id space is exhausted".into(),
        })
}

/// Samples of one identity directory ordered by id; foreign files are ignored.
fn stored_samples(dir: &Path) -> AppResult<Vec<(u32, PathBuf)>> {
    let mut samples = Vec::new();
    for (name, path) in read_dir_sorted(dir)? {
        if !path.is_file() {
            continue;
        }
        match parse_sample_name(&name) {
            Some(sample_id) => samples.push((sample_id, path)),
            None => debug!(path = %path.display(), "ignoring non-sample file"),
        }
    }
    samples.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(samples)
}

fn parse_sample_name(name: &str) -> Option<u32> {
    let (stem, extension) = name.rsplit_once('.')?;
    ImageFormat::from_extension(extension)?;
    let sample_id = stem.parse::<u32>().ok()?;
    (sample_id > 0).then_some(sample_id)
}

fn read_dir_sorted(dir: &Path) -> AppResult<Vec<(String, PathBuf)>> {
    let store_err = |source: io::Error| AppError::StoreUnavailable {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(store_err(err)),
    };

    let mut named = Vec::new();
    for entry in entries {
        let entry = entry.map_err(store_err)?;
        match entry.file_name().into_string() {
            Ok(name) => named.push((name, entry.path())),
            Err(raw) => debug!(name = ?raw, "skipping non UTF-8 entry"),
        }
    }
    named.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(named)
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
