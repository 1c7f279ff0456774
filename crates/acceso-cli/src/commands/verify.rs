use std::any::Any;
use std::process::ExitCode;

use acceso_core::decision::AccessDecision;
use acceso_core::verification::VerificationResult;
use tracing::warn;

use crate::cli::{OutputMode, VerifyArgs};
use crate::commands::CommandHandler;
use crate::errors::{AppError, AppResult};
use crate::output::render_decision;
use crate::runtime;

pub const ACCESS_DENIED_EXIT: u8 = 1;

type RenderDecision = dyn Fn(&AccessDecision, Option<&VerificationResult>, OutputMode, bool) -> AppResult<()>
    + Send
    + Sync;

pub struct VerifyHandler {
    args: VerifyArgs,
    run: Box<dyn Fn(&VerifyArgs) -> AppResult<VerificationResult> + Send + Sync>,
    render: Box<RenderDecision>,
}

impl VerifyHandler {
    pub fn new(args: VerifyArgs) -> Self {
        Self::with_dependencies(args, runtime::run_verify, render_decision)
    }

    pub fn with_dependencies(
        args: VerifyArgs,
        run: impl Fn(&VerifyArgs) -> AppResult<VerificationResult> + Send + Sync + 'static,
        render: impl Fn(&AccessDecision, Option<&VerificationResult>, OutputMode, bool) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for VerifyHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        match (self.run)(&self.args) {
            Ok(result) => {
                let decision = AccessDecision::from_result(&result);
                (self.render)(&decision, Some(&result), mode, verbose)?;
                if decision.exito {
                    Ok(ExitCode::SUCCESS)
                } else {
                    Ok(ExitCode::from(ACCESS_DENIED_EXIT))
                }
            }
            Err(err) if resolves_to_decision(&err) => {
                warn!(error = %err, "verification request failed");
                let decision = AccessDecision::from_error(&err);
                (self.render)(&decision, None, mode, verbose)?;
                Ok(err.exit_code())
            }
            Err(err) => Err(err),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-request failures the gate shows as a message; setup failures propagate.
fn resolves_to_decision(err: &AppError) -> bool {
    err.is_invalid_input()
        || matches!(
            err,
            AppError::StoreUnavailable { .. }
                | AppError::StoreInconsistent { .. }
                | AppError::Timeout { .. }
        )
}
