//! IO modules - side effects (network, filesystem)

pub mod archive;
pub mod artifacts;
pub mod download;
pub mod install;
