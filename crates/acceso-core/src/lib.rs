pub mod decision;
pub mod enrollment;
pub mod errors;
pub mod gallery;
pub mod keys;
pub mod maintenance;
pub mod oracle;
pub mod payload;
pub mod verification;

pub use decision::{AccessDecision, DecisionKind};
pub use enrollment::{
    run_enrollment_with, EnrollmentOutcome, EnrollmentRecord, EnrollmentRequest,
    EnrollmentSettings, DEFAULT_MAX_ENROLLMENT_IMAGES,
};
pub use errors::{AppError, AppResult};
pub use gallery::{FilesystemGallery, GalleryStore, MemoryGallery, SampleRef};
pub use keys::{normalize, Category, GalleryScope, IdentityKey, IdentityScope};
pub use maintenance::{list_gallery_with, remove_identity_with, GalleryListing, IdentityRemoval};
pub use oracle::{FaceComparison, FaceOracle, OracleError, ThumbnailOracle};
pub use verification::{
    DenialReason, EngineSettings, VerificationEngine, VerificationRequest, VerificationResult,
    DEFAULT_MATCH_THRESHOLD,
};
