mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::{
    BuildSession, BuildSessionStatus, CreateErrorRecord, ErrorRecord, ErrorResolution,
};
pub use pool::*;
pub use repositories::*;
