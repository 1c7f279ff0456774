//! Operator-facing gallery inspection and cleanup.

use serde::Serialize;
use tracing::info;

use crate::errors::AppResult;
use crate::gallery::{GalleryStore, SampleRef};
use crate::keys::{GalleryScope, IdentityKey, IdentityScope};

#[derive(Debug, Serialize)]
pub struct GalleryListing {
    pub scope: GalleryScope,
    pub identities: usize,
    pub samples: Vec<SampleRef>,
}

#[derive(Debug, Serialize)]
pub struct IdentityRemoval {
    pub scope: IdentityScope,
    pub removed: usize,
    #[serde(skip)]
    pub logs: Vec<String>,
}

pub fn list_gallery_with<S>(
    store: &S,
    category: Option<&str>,
    subcategory: Option<&str>,
) -> AppResult<GalleryListing>
where
    S: GalleryStore + ?Sized,
{
    let scope = GalleryScope::from_labels(category, subcategory)?;
    let samples = store.list_samples(&scope)?;
    let mut identities = 0;
    let mut previous: Option<&IdentityKey> = None;
    for sample in &samples {
        if previous != Some(&sample.identity) {
            identities += 1;
            previous = Some(&sample.identity);
        }
    }
    Ok(GalleryListing {
        scope,
        identities,
        samples,
    })
}

pub fn remove_identity_with<S>(
    store: &S,
    category: Option<&str>,
    subcategory: Option<&str>,
    identity: &str,
) -> AppResult<IdentityRemoval>
where
    S: GalleryStore + ?Sized,
{
    let scope = GalleryScope::from_labels(category, subcategory)?
        .identity(IdentityKey::parse(Some(identity), true)?);
    let removed = store.remove_identity(&scope)?;
    info!(scope = %scope, removed, "removed identity");
    let logs = vec![format!("Removed {removed} sample(s) for {scope}")];
    Ok(IdentityRemoval {
        scope,
        removed,
        logs,
    })
}
