pub mod config;
pub mod environment;
pub mod error;
pub mod types;

pub use config::Config;
pub use environment::*;
pub use error::CitySenseError;
pub use types::*;
