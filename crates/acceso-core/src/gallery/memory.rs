use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{AppError, AppResult};
use crate::gallery::store::{GalleryStore, SampleRef};
use crate::keys::{GalleryScope, IdentityKey, IdentityScope};

type ScopeKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    scopes: BTreeMap<ScopeKey, BTreeMap<IdentityKey, BTreeMap<u32, PathBuf>>>,
    blobs: BTreeMap<PathBuf, Vec<u8>>,
}

/// In-process gallery with the same ordering and id rules as the filesystem layout.
#[derive(Debug, Default)]
pub struct MemoryGallery {
    inner: Mutex<Inner>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_count(&self, scope: &IdentityScope) -> usize {
        self.lock()
            .scopes
            .get(&scope_key(&scope.gallery))
            .and_then(|identities| identities.get(&scope.identity))
            .map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GalleryStore for MemoryGallery {
    fn ensure_scope(&self, scope: &IdentityScope) -> AppResult<()> {
        self.lock()
            .scopes
            .entry(scope_key(&scope.gallery))
            .or_default()
            .entry(scope.identity.clone())
            .or_default();
        Ok(())
    }

    fn append_sample(
        &self,
        scope: &IdentityScope,
        bytes: &[u8],
        extension: &str,
    ) -> AppResult<SampleRef> {
        let mut inner = self.lock();
        let samples = inner
            .scopes
            .entry(scope_key(&scope.gallery))
            .or_default()
            .entry(scope.identity.clone())
            .or_default();
        let sample_id = match samples.keys().next_back() {
            Some(highest) => highest
                .checked_add(1)
                .ok_or_else(|| AppError::StoreInconsistent {
                    path: PathBuf::from(format!("memory://{scope}")),
                    message: "sample id space is exhausted".into(),
                })?,
            None => 1,
        };
        let location = PathBuf::from(format!("memory://{scope}/{sample_id}.{extension}"));
        samples.insert(sample_id, location.clone());
        inner.blobs.insert(location.clone(), bytes.to_vec());

        Ok(SampleRef {
            identity: scope.identity.clone(),
            sample_id,
            location,
        })
    }

    fn list_samples(&self, scope: &GalleryScope) -> AppResult<Vec<SampleRef>> {
        let inner = self.lock();
        let Some(identities) = inner.scopes.get(&scope_key(scope)) else {
            return Ok(Vec::new());
        };
        let mut listed = Vec::new();
        for (identity, samples) in identities {
            for (sample_id, location) in samples {
                listed.push(SampleRef {
                    identity: identity.clone(),
                    sample_id: *sample_id,
                    location: location.clone(),
                });
            }
        }
        Ok(listed)
    }

    fn read_sample(&self, sample: &SampleRef) -> AppResult<Vec<u8>> {
        self.lock()
            .blobs
            .get(&sample.location)
            .cloned()
            .ok_or_else(|| AppError::StoreInconsistent {
                path: sample.location.clone(),
                message: "sample is not present in the in-memory gallery".into(),
            })
    }

    fn remove_identity(&self, scope: &IdentityScope) -> AppResult<usize> {
        let mut inner = self.lock();
        let removed = inner
            .scopes
            .get_mut(&scope_key(&scope.gallery))
            .and_then(|identities| identities.remove(&scope.identity))
            .ok_or_else(|| AppError::IdentityNotFound {
                category: scope.gallery.category.to_string(),
                subcategory: scope.gallery.subcategory.to_string(),
                identity: scope.identity.to_string(),
            })?;
        for location in removed.values() {
            inner.blobs.remove(location);
        }
        Ok(removed.len())
    }
}

fn scope_key(scope: &GalleryScope) -> ScopeKey {
    (
        scope.category.key().to_string(),
        scope.subcategory.as_str().to_string(),
    )
}
