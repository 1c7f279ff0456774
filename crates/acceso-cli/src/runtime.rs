//! Default wiring from parsed arguments to the core operations.

use std::sync::Arc;

use acceso_core::enrollment::{run_enrollment_with, EnrollmentOutcome, EnrollmentRequest};
use acceso_core::gallery::FilesystemGallery;
use acceso_core::maintenance::{
    list_gallery_with, remove_identity_with, GalleryListing, IdentityRemoval,
};
use acceso_core::verification::{VerificationEngine, VerificationRequest, VerificationResult};
use tracing::debug;

use crate::capture::read_capture;
use crate::cli::{EnrollArgs, GalleryListArgs, GalleryRemoveArgs, VerifyArgs};
use crate::config::{
    enrollment_settings, engine_settings, load_config, resolve_gallery_dir,
};
use crate::errors::AppResult;
use crate::oracle::build_oracle;

pub fn run_enroll(args: &EnrollArgs) -> AppResult<EnrollmentOutcome> {
    let config = load_config()?;
    let root = resolve_gallery_dir(args.gallery_dir.as_deref(), &config);
    debug!(root = %root.display(), "enrolling into gallery");
    let store = FilesystemGallery::new(root);

    let images = args
        .fotos
        .iter()
        .map(|path| read_capture(path))
        .collect::<AppResult<Vec<_>>>()?;
    let request = EnrollmentRequest {
        category: Some(args.tipo.clone()),
        identity: args.matricula.clone(),
        subcategory: args.carrera.clone(),
        first_name: args.nombre.clone(),
        last_name: args.apellidos.clone(),
        semester: args.semestre.clone(),
        images,
    };
    run_enrollment_with(&request, &store, &enrollment_settings(&config))
}

pub fn run_verify(args: &VerifyArgs) -> AppResult<VerificationResult> {
    let config = load_config()?;
    let root = resolve_gallery_dir(args.gallery_dir.as_deref(), &config);
    debug!(root = %root.display(), "verifying against gallery");

    let capture = args.foto.as_deref().map(read_capture).transpose()?;
    let engine = VerificationEngine::new(
        Arc::new(FilesystemGallery::new(root)),
        build_oracle(&config)?,
        engine_settings(&config),
    )?;
    engine.verify(&VerificationRequest {
        capture,
        category: Some(args.tipo.clone()),
        subcategory: args.carrera.clone(),
    })
}

pub fn run_gallery_list(args: &GalleryListArgs) -> AppResult<GalleryListing> {
    let config = load_config()?;
    let store = FilesystemGallery::new(resolve_gallery_dir(args.gallery_dir.as_deref(), &config));
    list_gallery_with(&store, Some(args.tipo.as_str()), args.carrera.as_deref())
}

pub fn run_gallery_remove(args: &GalleryRemoveArgs) -> AppResult<IdentityRemoval> {
    let config = load_config()?;
    let store = FilesystemGallery::new(resolve_gallery_dir(args.gallery_dir.as_deref(), &config));
    remove_identity_with(
        &store,
        Some(args.tipo.as_str()),
        args.carrera.as_deref(),
        &args.matricula,
    )
}
