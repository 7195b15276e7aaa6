mod agent;
mod classification;
mod plan;
mod request;

pub use agent::*;
pub use classification::*;
pub use plan::*;
pub use request::*;
