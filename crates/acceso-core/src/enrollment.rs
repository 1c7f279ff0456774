use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppResult;
use crate::gallery::GalleryStore;
use crate::keys::{GalleryScope, IdentityKey, IdentityScope};
use crate::payload::decode_data_uri;

pub const DEFAULT_MAX_ENROLLMENT_IMAGES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentSettings {
    pub max_images: usize,
    pub require_identity_key: bool,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_ENROLLMENT_IMAGES,
            require_identity_key: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentRequest {
    pub category: Option<String>,
    pub identity: Option<String>,
    pub subcategory: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Accepted from front ends but not stored.
    pub semester: Option<String>,
    /// Data-URI encoded images.
    pub images: Vec<String>,
}

impl EnrollmentRequest {
    fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentRecord {
    pub sample_id: u32,
    pub location: String,
    pub byte_len: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPayload {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentOutcome {
    pub scope: IdentityScope,
    pub display_name: Option<String>,
    pub committed: usize,
    pub records: Vec<EnrollmentRecord>,
    pub skipped: Vec<SkippedPayload>,
    #[serde(skip)]
    pub logs: Vec<String>,
}

pub fn run_enrollment_with<S>(
    request: &EnrollmentRequest,
    store: &S,
    settings: &EnrollmentSettings,
) -> AppResult<EnrollmentOutcome>
where
    S: GalleryStore + ?Sized,
{
    let gallery =
        GalleryScope::from_labels(request.category.as_deref(), request.subcategory.as_deref())?;
    let identity =
        IdentityKey::parse(request.identity.as_deref(), settings.require_identity_key)?;
    let scope = gallery.identity(identity);
    let display_name = request.display_name();

    let mut logs = Vec::new();
    logs.push(format!(
        "Enrolling {} image payload(s) for {scope} (limit {})",
        request.images.len(),
        settings.max_images
    ));

    store.ensure_scope(&scope)?;

    let mut records = Vec::with_capacity(settings.max_images.min(request.images.len()));
    let mut skipped = Vec::new();
    for (index, payload) in request.images.iter().enumerate() {
        if records.len() >= settings.max_images {
            logs.push(format!(
                "Ignoring {} payload(s) beyond the limit of {}",
                request.images.len() - index,
                settings.max_images
            ));
            break;
        }

        let image = match decode_data_uri(payload) {
            Ok(image) => image,
            Err(err) => {
                warn!(index, error = %err, "skipping malformed enrollment payload");
                logs.push(format!("Skipped payload #{}: {err}", index + 1));
                skipped.push(SkippedPayload {
                    index,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let sample = store.append_sample(&scope, &image.bytes, image.extension())?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        logs.push(format!(
            "Stored sample #{} ({} bytes) at {}",
            sample.sample_id,
            image.bytes.len(),
            sample.location.display()
        ));
        records.push(EnrollmentRecord {
            sample_id: sample.sample_id,
            location: sample.location.display().to_string(),
            byte_len: image.bytes.len(),
            created_at,
        });
    }

    info!(
        scope = %scope,
        committed = records.len(),
        skipped = skipped.len(),
        "enrollment finished"
    );
    logs.push(format!("Committed {} sample(s) for {scope}", records.len()));

    Ok(EnrollmentOutcome {
        scope,
        display_name,
        committed: records.len(),
        records,
        skipped,
        logs,
    })
}
