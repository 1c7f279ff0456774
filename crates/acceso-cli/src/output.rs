use std::error::Error;
use std::io::{self, Write};

use acceso_core::decision::AccessDecision;
use acceso_core::enrollment::EnrollmentOutcome;
use acceso_core::maintenance::{GalleryListing, IdentityRemoval};
use acceso_core::verification::VerificationResult;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::errors::{AppError, AppResult};

fn write_json_line<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_enrollment(
    outcome: &EnrollmentOutcome,
    mode: OutputMode,
    verbose: bool,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if verbose {
                for line in &outcome.logs {
                    println!("{line}");
                }
            }
            let who = outcome
                .display_name
                .as_deref()
                .unwrap_or(outcome.scope.identity.as_str());
            println!(
                "Enrollment successful: {} photo(s) stored for {who} ({})",
                outcome.committed, outcome.scope
            );
            if !outcome.skipped.is_empty() {
                println!("Skipped {} unreadable photo(s)", outcome.skipped.len());
            }
        }
        OutputMode::Json => write_json_line(outcome)?,
    }
    Ok(())
}

pub fn render_decision(
    decision: &AccessDecision,
    result: Option<&VerificationResult>,
    mode: OutputMode,
    verbose: bool,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if let (true, Some(result)) = (verbose, result) {
                for line in &result.logs {
                    println!("{line}");
                }
            }
            println!("{}", decision.mensaje);
        }
        OutputMode::Json => write_json_line(&decision_json_payload(decision, result, verbose))?,
    }
    Ok(())
}

pub(crate) fn decision_json_payload(
    decision: &AccessDecision,
    result: Option<&VerificationResult>,
    verbose: bool,
) -> Value {
    let mut payload = json!({
        "exito": decision.exito,
        "mensaje": decision.mensaje,
    });
    if verbose {
        if let Some(result) = result {
            payload["detalle"] = json!(result);
        }
    }
    payload
}

pub fn render_gallery_listing(listing: &GalleryListing, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "{}: {} identit{} / {} sample(s)",
                listing.scope,
                listing.identities,
                if listing.identities == 1 { "y" } else { "ies" },
                listing.samples.len()
            );
            for sample in &listing.samples {
                println!(
                    "  {} #{} {}",
                    sample.identity,
                    sample.sample_id,
                    sample.location.display()
                );
            }
        }
        OutputMode::Json => write_json_line(listing)?,
    }
    Ok(())
}

pub fn render_identity_removal(removal: &IdentityRemoval, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &removal.logs {
                println!("{line}");
            }
        }
        OutputMode::Json => write_json_line(removal)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}
