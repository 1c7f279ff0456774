//! `{exito, mensaje}` access decisions shown to the person at the gate.

use serde::Serialize;

use crate::errors::AppError;
use crate::verification::{DenialReason, VerificationResult};

pub const MSG_NO_COINCIDENCE: &str = "ACCESO DENEGADO – NO SE ENCONTRÓ COINCIDENCIA.";
pub const MSG_EMPTY_SCOPE: &str = "No hay registros para ese tipo/carrera.";
pub const MSG_MISSING_CAPTURE: &str = "No se recibió la foto.";
pub const MSG_MALFORMED_CAPTURE: &str = "Error procesando la foto.";
pub const MSG_INVALID_REQUEST: &str = "Solicitud inválida.";
pub const MSG_TIMEOUT: &str = "ERROR DEL SERVICIO – la verificación excedió el tiempo límite.";
pub const MSG_SERVICE_ERROR: &str = "ERROR DEL SERVICIO – no se pudo consultar el registro.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Granted,
    Denied,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub exito: bool,
    pub mensaje: String,
    #[serde(skip)]
    pub kind: DecisionKind,
}

impl AccessDecision {
    pub fn from_result(result: &VerificationResult) -> Self {
        match (&result.identity, result.reason) {
            (Some(identity), _) if result.matched => Self {
                exito: true,
                mensaje: format!("ACCESO CONFIRMADO – MATRÍCULA: {identity}"),
                kind: DecisionKind::Granted,
            },
            (_, Some(DenialReason::EmptyScope)) => Self::denied(MSG_EMPTY_SCOPE),
            _ => Self::denied(MSG_NO_COINCIDENCE),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let mensaje = match err {
            AppError::MissingCapture => MSG_MISSING_CAPTURE,
            AppError::MalformedCapture(_) | AppError::CaptureRead { .. } => MSG_MALFORMED_CAPTURE,
            AppError::Timeout { .. } => MSG_TIMEOUT,
            err if err.is_invalid_input() => MSG_INVALID_REQUEST,
            _ => MSG_SERVICE_ERROR,
        };
        Self {
            exito: false,
            mensaje: mensaje.to_string(),
            kind: DecisionKind::Error,
        }
    }

    fn denied(mensaje: &str) -> Self {
        Self {
            exito: false,
            mensaje: mensaje.to_string(),
            kind: DecisionKind::Denied,
        }
    }
}
