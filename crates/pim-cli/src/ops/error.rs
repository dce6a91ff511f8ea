//! Errors surfaced by a run.

use pim_core::PluginError;
use thiserror::Error;

use crate::input::InputError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Invalid plugin list: {0}")]
    Input(#[from] InputError),

    #[error("Unable to render output: {0}")]
    Output(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}
