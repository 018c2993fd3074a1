//! HTTP API: configuration, routing, and request/response mapping.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

pub use app::build_app;
pub use config::{AppConfig, ConfigError};
