//! # Keystone
//!
//! Lifecycle manager for a backend service process.
//!
//! Keystone owns the process-wide handles to the service's backing resources:
//! a relational database pool, a cache pool, an embedded key-value store, an
//! identity-provider client, the HTTP router and a profiler. Each resource is
//! optional. Whatever is configured is opened once, checked for liveness and
//! shared; whatever is not configured is skipped without error.
//!
//! ## Features
//!
//! - **Single bootstrap**: one [`Service`] per [`ServiceHost`], safe under concurrent `init`
//! - **Optional resources**: "not configured" is a soft outcome, setup failures are hard
//! - **Tagged errors**: compare [`ServiceError`]s by resource and condition, not by message
//! - **Environment defaults**: [`Options::from_env`](config::Options::from_env) reads the usual variables
//! - **Graceful shutdown**: [`Service::serve`] closes every resource after the server stops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone::prelude::*;
//!
//! async fn pong() -> Json<serde_json::Value> {
//!     Json(serde_json::json!({ "status": "OK", "message": "pong" }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = start_default_service().await?;
//!     service.group("/v1/ping", Router::new().route("/", get(pong)))?;
//!     service.serve("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod resources;

// Re-export core types
pub use config::Options;
pub use error::{Condition, ResourceKind, Result, ServiceError};
pub use lifecycle::{Service, ServiceHost, start_default_service, start_service};

// Re-export commonly used types from dependencies
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use keystone::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{
        CacheOptions, DbOptions, EmbeddedStoreOptions, FailurePolicy, IdentityOptions,
        LoggerOptions, Options, RouterOptions, ServiceMeta,
    };
    pub use crate::error::{Condition, ResourceKind, Result, ServiceError};
    pub use crate::lifecycle::{
        ResourceState, Service, ServiceHost, shutdown_signal, start_default_service,
        start_service,
    };
    pub use crate::resources::{CachePool, EmbeddedStore, IdentityClient, ProfilerStarter};
    pub use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{delete, get, patch, post, put},
    };
    pub use std::sync::Arc;
}
