//! Run orchestration.

pub mod context;
pub mod error;
pub mod install;

pub use context::Context;
pub use error::InstallError;
