use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_CATEGORY: &str = "alumno";

#[derive(Debug, Parser)]
#[command(
    name = "acceso-facial",
    version,
    about = "Face-verification access control for campus gates"
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store reference photos for one person
    Enroll(EnrollArgs),
    /// Check a capture against the enrolled gallery and decide access
    Verify(VerifyArgs),
    /// Inspect or clean up the enrolled gallery
    #[command(subcommand)]
    Gallery(GalleryCommands),
}

#[derive(Debug, Clone, Args)]
pub struct EnrollArgs {
    /// Category: alumno, profesor or trabajador
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    pub tipo: String,

    /// Given name (informational)
    #[arg(long)]
    pub nombre: Option<String>,

    /// Family names (informational)
    #[arg(long)]
    pub apellidos: Option<String>,

    /// Enrollment or employee number identifying the person
    #[arg(long)]
    pub matricula: Option<String>,

    /// Academic program, only used for students
    #[arg(long)]
    pub carrera: Option<String>,

    /// Semester (accepted for compatibility, not stored)
    #[arg(long)]
    pub semestre: Option<String>,

    /// Photo file holding a data URI or raw image bytes; repeat for several photos
    #[arg(long = "foto", required = true)]
    pub fotos: Vec<PathBuf>,

    /// Override the gallery root directory
    #[arg(long)]
    pub gallery_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Category: alumno, profesor or trabajador
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    pub tipo: String,

    /// Academic program, only used for students
    #[arg(long)]
    pub carrera: Option<String>,

    /// Capture file holding a data URI or raw image bytes
    #[arg(long)]
    pub foto: Option<PathBuf>,

    /// Override the gallery root directory
    #[arg(long)]
    pub gallery_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum GalleryCommands {
    /// List enrolled samples for a category/program
    List(GalleryListArgs),
    /// Delete every sample of one enrolled person
    Remove(GalleryRemoveArgs),
}

#[derive(Debug, Clone, Args)]
pub struct GalleryListArgs {
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    pub tipo: String,

    #[arg(long)]
    pub carrera: Option<String>,

    #[arg(long)]
    pub gallery_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct GalleryRemoveArgs {
    #[arg(long, default_value = DEFAULT_CATEGORY)]
    pub tipo: String,

    #[arg(long)]
    pub carrera: Option<String>,

    /// Identity key to remove
    #[arg(long)]
    pub matricula: String,

    #[arg(long)]
    pub gallery_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
