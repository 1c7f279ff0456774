use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod enroll;
mod gallery;
mod verify;

pub use enroll::EnrollHandler;
pub use gallery::{GalleryHandler, GalleryHandlerDeps};
pub use verify::{VerifyHandler, ACCESS_DENIED_EXIT};

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Enroll(args) => Box::new(EnrollHandler::new(args)),
            Commands::Verify(args) => Box::new(VerifyHandler::new(args)),
            Commands::Gallery(cmd) => Box::new(GalleryHandler::new(cmd)),
        }
    }
}
