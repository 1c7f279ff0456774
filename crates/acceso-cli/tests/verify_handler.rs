use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acceso_cli::cli::{OutputMode, VerifyArgs};
use acceso_cli::commands::{CommandHandler, VerifyHandler, ACCESS_DENIED_EXIT};
use acceso_cli::errors::AppError;
use acceso_core::decision::AccessDecision;
use acceso_core::keys::{GalleryScope, IdentityKey};
use acceso_core::verification::{DenialReason, VerificationResult};

fn sample_args() -> VerifyArgs {
    VerifyArgs {
        tipo: "alumno".into(),
        carrera: Some("cs".into()),
        foto: Some(PathBuf::from("capture.png")),
        gallery_dir: None,
    }
}

fn result(identity: Option<&str>, reason: Option<DenialReason>) -> VerificationResult {
    VerificationResult {
        request_id: "req".into(),
        scope: GalleryScope::from_labels(Some("alumno"), Some("cs")).unwrap(),
        matched: identity.is_some(),
        identity: identity.map(|id| IdentityKey::parse(Some(id), true).unwrap()),
        distance: identity.map(|_| 0.2),
        reason,
        comparisons: 1,
        skipped: 0,
        logs: vec![],
    }
}

type Rendered = Arc<Mutex<Vec<(AccessDecision, bool)>>>;

fn handler_with(
    run: impl Fn(&VerifyArgs) -> Result<VerificationResult, AppError> + Send + Sync + 'static,
) -> (VerifyHandler, Rendered) {
    let rendered: Rendered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rendered);
    let handler = VerifyHandler::with_dependencies(
        sample_args(),
        run,
        move |decision, result, _mode, _verbose| {
            sink.lock()
                .unwrap()
                .push((decision.clone(), result.is_some()));
            Ok(())
        },
    );
    (handler, rendered)
}

#[test]
fn granted_access_exits_successfully() {
    let (handler, rendered) = handler_with(|_args| Ok(result(Some("A1"), None)));
    let exit = handler.execute(OutputMode::Json, false).unwrap();
    assert_eq!(exit, ExitCode::SUCCESS);
    let rendered = rendered.lock().unwrap();
    assert_eq!(rendered[0].0.mensaje, "ACCESO CONFIRMADO – MATRÍCULA: A1");
    assert!(rendered[0].1);
}

#[test]
fn denied_access_uses_denied_exit_code() {
    let (handler, rendered) =
        handler_with(|_args| Ok(result(None, Some(DenialReason::NoCoincidence))));
    let exit = handler.execute(OutputMode::Human, false).unwrap();
    assert_eq!(exit, ExitCode::from(ACCESS_DENIED_EXIT));
    assert_eq!(
        rendered.lock().unwrap()[0].0.mensaje,
        "ACCESO DENEGADO – NO SE ENCONTRÓ COINCIDENCIA."
    );
}

#[test]
fn missing_capture_renders_a_decision_with_error_exit() {
    let (handler, rendered) = handler_with(|_args| Err(AppError::MissingCapture));
    let exit = handler.execute(OutputMode::Json, false).unwrap();
    assert_eq!(exit, ExitCode::from(2));
    let rendered = rendered.lock().unwrap();
    assert!(!rendered[0].0.exito);
    assert_eq!(rendered[0].0.mensaje, "No se recibió la foto.");
    assert!(!rendered[0].1);
}

#[test]
fn store_failures_and_timeouts_are_not_denials() {
    let (handler, _) = handler_with(|_args| {
        Err(AppError::StoreUnavailable {
            path: PathBuf::from("/srv/rostros"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        })
    });
    assert_eq!(handler.execute(OutputMode::Json, false).unwrap(), ExitCode::from(3));

    let (handler, _) = handler_with(|_args| {
        Err(AppError::Timeout {
            elapsed: Duration::from_secs(31),
            limit: Duration::from_secs(30),
        })
    });
    assert_eq!(handler.execute(OutputMode::Json, false).unwrap(), ExitCode::from(4));
}

#[test]
fn setup_errors_propagate() {
    let (handler, rendered) = handler_with(|_args| {
        Err(AppError::ConfigParse {
            path: PathBuf::from("/etc/acceso-facial/config.toml"),
            message: "bad".into(),
        })
    });
    let err = handler.execute(OutputMode::Human, false).unwrap_err();
    assert!(matches!(err, AppError::ConfigParse { .. }));
    assert!(rendered.lock().unwrap().is_empty());
}
