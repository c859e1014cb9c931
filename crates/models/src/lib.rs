pub mod config;
pub mod environment;
pub mod error;

pub use config::*;
pub use environment::*;
pub use error::*;
