pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod oracle;
pub mod output;
pub mod runtime;

pub use acceso_core::errors;
