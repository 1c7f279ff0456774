use std::any::Any;
use std::process::ExitCode;

use acceso_core::maintenance::{GalleryListing, IdentityRemoval};

use crate::cli::{GalleryCommands, GalleryListArgs, GalleryRemoveArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::output::{render_gallery_listing, render_identity_removal};
use crate::runtime;

pub struct GalleryHandler {
    command: GalleryCommands,
    deps: GalleryHandlerDeps,
}

pub struct GalleryHandlerDeps {
    pub list: Box<dyn Fn(&GalleryListArgs) -> AppResult<GalleryListing> + Send + Sync>,
    pub remove: Box<dyn Fn(&GalleryRemoveArgs) -> AppResult<IdentityRemoval> + Send + Sync>,
    pub render_list: Box<dyn Fn(&GalleryListing, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_remove: Box<dyn Fn(&IdentityRemoval, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl GalleryHandlerDeps {
    pub fn new(
        list: impl Fn(&GalleryListArgs) -> AppResult<GalleryListing> + Send + Sync + 'static,
        remove: impl Fn(&GalleryRemoveArgs) -> AppResult<IdentityRemoval> + Send + Sync + 'static,
        render_list: impl Fn(&GalleryListing, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_remove: impl Fn(&IdentityRemoval, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            list: Box::new(list),
            remove: Box::new(remove),
            render_list: Box::new(render_list),
            render_remove: Box::new(render_remove),
        }
    }
}

impl Default for GalleryHandlerDeps {
    fn default() -> Self {
        Self::new(
            runtime::run_gallery_list,
            runtime::run_gallery_remove,
            render_gallery_listing,
            render_identity_removal,
        )
    }
}

impl GalleryHandler {
    pub fn new(command: GalleryCommands) -> Self {
        Self {
            command,
            deps: GalleryHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(command: GalleryCommands, deps: GalleryHandlerDeps) -> Self {
        Self { command, deps }
    }
}

impl CommandHandler for GalleryHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        match &self.command {
            GalleryCommands::List(args) => {
                let listing = (self.deps.list)(args)?;
                (self.deps.render_list)(&listing, mode)?;
            }
            GalleryCommands::Remove(args) => {
                let removal = (self.deps.remove)(args)?;
                (self.deps.render_remove)(&removal, mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
