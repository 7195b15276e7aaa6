//! Domain types shared by the build orchestrator, its event model and its
//! persistence layer.

pub mod domain;
mod error;

pub use domain::*;
pub use error::CoreError;
