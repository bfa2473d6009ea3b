//! Single-instance holder for the [`Service`].

use super::Service;
use crate::config::Options;
use crate::error::{ResourceKind, Result, ServiceError};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Holds at most one bootstrapped [`Service`].
///
/// Concurrent callers of [`init`](ServiceHost::init) share a single bootstrap
/// run: one of them performs it, the others wait and receive the same
/// service. Any call after the service exists fails with
/// `AlreadyInitialized` and leaves the service untouched.
///
/// The process-wide instance is [`ServiceHost::global`]. Private hosts are
/// useful in tests.
pub struct ServiceHost {
    cell: OnceCell<Arc<Service>>,
}

impl Default for ServiceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHost {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn global() -> &'static ServiceHost {
        static GLOBAL: OnceLock<ServiceHost> = OnceLock::new();
        GLOBAL.get_or_init(ServiceHost::new)
    }

    /// Bootstrap the service with `options`.
    ///
    /// A failed bootstrap leaves the host empty, so `init` may be retried.
    pub async fn init(&self, options: Options) -> Result<Arc<Service>> {
        if self.cell.initialized() {
            tracing::warn!("Service already initialized, ignoring new options");
            return Err(ServiceError::already_initialized(ResourceKind::Service));
        }

        let service = self
            .cell
            .get_or_try_init(|| Service::bootstrap(options))
            .await?;
        Ok(Arc::clone(service))
    }

    pub fn get(&self) -> Result<Arc<Service>> {
        self.cell
            .get()
            .cloned()
            .ok_or_else(|| ServiceError::not_yet_initialized(ResourceKind::Service))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

/// Bootstrap the global service from environment variables.
pub async fn start_default_service() -> Result<Arc<Service>> {
    ServiceHost::global().init(Options::from_env()).await
}

/// Bootstrap the global service with explicit options.
pub async fn start_service(options: Options) -> Result<Arc<Service>> {
    ServiceHost::global().init(options).await
}
