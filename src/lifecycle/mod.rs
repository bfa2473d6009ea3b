//! Service Lifecycle Module
//!
//! Bootstraps the process-wide [`Service`], exposes its resources and tears
//! them down again.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Options (explicit or from environment)
//!    ↓
//! 2. Logging
//!    ↓
//! 3. Database                ← skipped when unconfigured
//!    ↓
//! 4. Identity provider       ← skipped when unconfigured
//!    ↓
//! 5. Router                  ← always created
//!    ↓
//! 6. Cache                   ← skipped when unconfigured
//!    ↓
//! 7. Profiler                ← needs service metadata
//!    ↓
//! 8. Embedded store          ← skipped when unconfigured
//!    ↓
//! [Running...]
//!    ↓
//! 9. close_all: embedded store, cache, identity provider, database
//! ```
//!
//! A configured resource that fails to open aborts the sequence. Under
//! [`FailurePolicy::FailFast`](crate::config::FailurePolicy) the process
//! exits; under `ReturnError` the resources opened so far are closed and the
//! error is returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone::config::{CacheOptions, Options};
//! use keystone::lifecycle::ServiceHost;
//!
//! let service = ServiceHost::global()
//!     .init(Options::new().cache(CacheOptions::new("127.0.0.1:6379", "")))
//!     .await?;
//!
//! let pool = service.cache()?;
//! let mut conn = pool.get().await?;
//! ```

mod host;
mod service;
mod shutdown;
mod slot;

pub use host::{ServiceHost, start_default_service, start_service};
pub use service::Service;
pub use shutdown::shutdown_signal;
pub use slot::ResourceState;
