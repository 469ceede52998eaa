//! HTTP surface for the lineage service.
//!
//! `api` serves the read endpoints, `client` consumes them for views and
//! `config` resolves server settings.

pub mod api;
pub mod client;
pub mod config;

pub use api::{
    create_router, ApiError, ApiResponse, ApiSettings, ApiWarning, ErrorEnvelope, SharedState,
};
pub use client::{ClientConfig, ClientError, FetchState, LineageClient, ViewFetch};
pub use config::{ConfigError, ConfigOverrides, ServerConfig};
