//! Backing resources and their initializers.
//!
//! Each initializer adopts an injected handle when the sub-configuration
//! carries one, otherwise it opens a live handle and runs a liveness check
//! before the handle is handed to the service.

pub mod cache;
pub(crate) mod database;
pub mod identity;
pub(crate) mod logging;
pub mod profiler;
pub mod router;
pub mod store;

pub use cache::CachePool;
pub use identity::{IdentityClient, ServiceAccount};
pub use profiler::{HeartbeatProfiler, ProfilerStarter};
pub use router::RouterHandle;
pub use store::EmbeddedStore;
