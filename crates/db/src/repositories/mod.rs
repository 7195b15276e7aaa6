mod build_session_repository;
mod error_record_repository;

pub use build_session_repository::*;
pub use error_record_repository::*;
