//! Shared foundations for the campaign phase builder: configuration,
//! the error type and the builder event bus.

pub mod config;
pub mod error;
pub mod event_bus;

pub use config::AppConfig;
pub use error::{BuilderError, BuilderResult};
