//! The running service and its bootstrap sequence.

use super::shutdown::shutdown_signal;
use super::slot::{ResourceSlot, ResourceState, initialize};
use crate::config::{
    CacheOptions, DbOptions, EmbeddedStoreOptions, FailurePolicy, IdentityOptions, Options,
    RouterOptions, ServiceMeta,
};
use crate::error::{ResourceKind, Result, ServiceError};
use crate::resources::{
    CachePool, EmbeddedStore, HeartbeatProfiler, IdentityClient, ProfilerStarter, RouterHandle,
    cache, database, identity, logging, store,
};
use axum::Router;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, PoisonError};

/// Owns every resource handle of the process.
///
/// A `Service` only exists once bootstrap has completed: every configured
/// resource is `Ready` and every other one is `Unconfigured`. Obtain it from
/// [`ServiceHost::init`](super::ServiceHost::init) and pass the `Arc` to
/// whatever needs a resource.
pub struct Service {
    database: ResourceSlot<PgPool>,
    identity_provider: ResourceSlot<IdentityClient>,
    router: ResourceSlot<RouterHandle>,
    cache: ResourceSlot<CachePool>,
    embedded_store: ResourceSlot<EmbeddedStore>,
    profiler: Mutex<Option<Arc<dyn ProfilerStarter>>>,
    meta: Option<ServiceMeta>,
    policy: FailurePolicy,
}

impl Service {
    pub(crate) fn new(meta: Option<ServiceMeta>, policy: FailurePolicy) -> Self {
        Self {
            database: ResourceSlot::new(ResourceKind::Database),
            identity_provider: ResourceSlot::new(ResourceKind::IdentityProvider),
            router: ResourceSlot::new(ResourceKind::Router),
            cache: ResourceSlot::new(ResourceKind::Cache),
            embedded_store: ResourceSlot::new(ResourceKind::EmbeddedStore),
            profiler: Mutex::new(None),
            meta,
            policy,
        }
    }

    /// Run the whole bootstrap sequence.
    ///
    /// The order is fixed: logging, database, identity provider, router,
    /// cache, profiler, embedded store. Unconfigured steps are skipped; the
    /// first setup failure stops the sequence and is handled per the
    /// configured [`FailurePolicy`].
    pub(crate) async fn bootstrap(options: Options) -> Result<Arc<Service>> {
        logging::init(options.logger.as_ref());
        tracing::info!("Bootstrapping service...");

        let service = Service::new(options.service_meta.clone(), options.policy);
        if let Err(e) = service.run_steps(&options).await {
            return Err(service.abort(e).await);
        }

        tracing::info!(
            "Service bootstrap complete (database: {}, identity_provider: {}, cache: {}, embedded_store: {})",
            service.database.state(),
            service.identity_provider.state(),
            service.cache.state(),
            service.embedded_store.state(),
        );
        Ok(Arc::new(service))
    }

    async fn run_steps(&self, options: &Options) -> Result<()> {
        let outcome = self.init_database(options.db.as_ref()).await;
        self.settle(ResourceKind::Database, outcome)?;

        let outcome = self
            .init_identity_provider(options.identity_provider.as_ref())
            .await;
        self.settle(ResourceKind::IdentityProvider, outcome)?;

        let outcome = self.init_router(options.router.as_ref());
        self.settle(ResourceKind::Router, outcome)?;

        let outcome = self.init_cache(options.cache.as_ref()).await;
        self.settle(ResourceKind::Cache, outcome)?;

        let starter: Arc<dyn ProfilerStarter> = match &options.profiler {
            Some(starter) => Arc::clone(starter),
            None => Arc::new(HeartbeatProfiler::default()),
        };
        let outcome = self.init_profiler(starter);
        self.settle(ResourceKind::Profiler, outcome)?;

        let outcome = self
            .init_embedded_store(options.embedded_store.as_ref())
            .await;
        self.settle(ResourceKind::EmbeddedStore, outcome)
    }

    /// Absorb "not configured"; let everything else through.
    fn settle(&self, kind: ResourceKind, outcome: Result<()>) -> Result<()> {
        match outcome {
            Err(e) if e.is_unconfigured() => {
                if kind == ResourceKind::Router {
                    tracing::debug!("Router config not provided. Default router initialized");
                } else {
                    tracing::debug!("{} config not provided. Skipping initialization", kind);
                }
                Ok(())
            }
            other => other,
        }
    }

    async fn abort(&self, error: ServiceError) -> ServiceError {
        tracing::error!(
            resource = %error.kind(),
            error = %error,
            "Can't bootstrap service"
        );
        match self.policy {
            FailurePolicy::FailFast => std::process::exit(1),
            FailurePolicy::ReturnError => {
                if let Err(e) = self.close_all().await {
                    tracing::warn!("Teardown after failed bootstrap did not finish: {}", e);
                }
                error
            }
        }
    }

    pub(crate) async fn init_database(&self, options: Option<&DbOptions>) -> Result<()> {
        let options = options.ok_or_else(|| ServiceError::unconfigured(ResourceKind::Database))?;
        initialize(&self.database, || database::open(options)).await?;
        tracing::info!("Database connection ready");
        Ok(())
    }

    pub(crate) async fn init_identity_provider(
        &self,
        options: Option<&IdentityOptions>,
    ) -> Result<()> {
        let options =
            options.ok_or_else(|| ServiceError::unconfigured(ResourceKind::IdentityProvider))?;
        initialize(&self.identity_provider, || identity::open(options)).await?;
        tracing::info!("Identity provider configured");
        Ok(())
    }

    /// The router always exists. Missing options only mean "no middleware",
    /// which is still reported as unconfigured.
    pub(crate) fn init_router(&self, options: Option<&RouterOptions>) -> Result<()> {
        self.router.begin()?;
        self.router.publish(RouterHandle::new(options));
        match options {
            Some(_) => {
                tracing::info!("Router configured");
                Ok(())
            }
            None => Err(ServiceError::unconfigured(ResourceKind::Router)),
        }
    }

    pub(crate) async fn init_cache(&self, options: Option<&CacheOptions>) -> Result<()> {
        let options = options.ok_or_else(|| ServiceError::unconfigured(ResourceKind::Cache))?;
        initialize(&self.cache, || cache::open(options)).await?;
        tracing::info!("Cache connection ready");
        Ok(())
    }

    pub(crate) fn init_profiler(&self, starter: Arc<dyn ProfilerStarter>) -> Result<()> {
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| ServiceError::unconfigured(ResourceKind::Profiler))?;
        if !meta.profiler {
            tracing::debug!("Profiler disabled for environment {:?}", meta.environment);
            return Ok(());
        }
        let mut running = self.profiler.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(ServiceError::already_initialized(ResourceKind::Profiler));
        }
        starter.start(meta);
        *running = Some(starter);
        Ok(())
    }

    pub(crate) async fn init_embedded_store(
        &self,
        options: Option<&EmbeddedStoreOptions>,
    ) -> Result<()> {
        let options =
            options.ok_or_else(|| ServiceError::unconfigured(ResourceKind::EmbeddedStore))?;
        initialize(&self.embedded_store, || store::open(options)).await?;
        tracing::info!("Embedded store configured");
        Ok(())
    }

    /// The relational database pool.
    pub fn database(&self) -> Result<Arc<PgPool>> {
        self.database.get().inspect_err(|e| {
            tracing::warn!("Can't retrieve database. Was a database config supplied? {}", e)
        })
    }

    /// A sea-orm view of the database pool.
    #[cfg(feature = "sea-orm-db")]
    pub fn orm(&self) -> Result<sea_orm::DatabaseConnection> {
        let pool = self.database()?;
        Ok(sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(
            (*pool).clone(),
        ))
    }

    pub fn is_using_database(&self) -> bool {
        self.database.state() == ResourceState::Ready
    }

    pub fn cache(&self) -> Result<Arc<CachePool>> {
        self.cache.get().inspect_err(|e| {
            tracing::warn!("Can't retrieve cache pool. Was a cache config supplied? {}", e)
        })
    }

    pub fn embedded_store(&self) -> Result<Arc<EmbeddedStore>> {
        self.embedded_store.get().inspect_err(|e| {
            tracing::warn!("Can't retrieve embedded store. Is it enabled? {}", e)
        })
    }

    pub fn identity_provider(&self) -> Result<Arc<IdentityClient>> {
        self.identity_provider.get().inspect_err(|e| {
            tracing::warn!("Can't retrieve identity provider. Were credentials supplied? {}", e)
        })
    }

    pub fn router(&self) -> Result<Arc<RouterHandle>> {
        self.router.get()
    }

    /// Mount a route group on the service router.
    pub fn group(&self, path: &str, routes: Router) -> Result<()> {
        self.router()?.group(path, routes)
    }

    /// Register router middleware, e.g. `|router| router.layer(...)`.
    pub fn use_middleware<F>(&self, middleware: F) -> Result<()>
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.router()?.use_middleware(middleware);
        Ok(())
    }

    pub fn meta(&self) -> Option<&ServiceMeta> {
        self.meta.as_ref()
    }

    /// Current state of a resource, `None` for kinds without a handle.
    pub fn state(&self, kind: ResourceKind) -> Option<ResourceState> {
        match kind {
            ResourceKind::Database => Some(self.database.state()),
            ResourceKind::IdentityProvider => Some(self.identity_provider.state()),
            ResourceKind::Router => Some(self.router.state()),
            ResourceKind::Cache => Some(self.cache.state()),
            ResourceKind::EmbeddedStore => Some(self.embedded_store.state()),
            _ => None,
        }
    }

    /// Release every ready resource, last initialized first.
    ///
    /// Stops at the first failure and returns it. The failing resource is
    /// marked failed and its handle dropped; resources after it stay ready, so
    /// calling `close_all` again resumes the teardown with the next one.
    /// Nothing ready means nothing to do.
    pub async fn close_all(&self) -> Result<()> {
        if let Some(handle) = self.embedded_store.take_for_close() {
            if let Err(e) = store::close(&handle).await {
                self.embedded_store.fail(&e);
                return Err(e);
            }
            tracing::info!("Embedded store closed");
        }
        let profiler = self
            .profiler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(profiler) = profiler {
            profiler.stop();
            tracing::info!("Profiler stopped");
        }
        if self.cache.take_for_close().is_some() {
            tracing::info!("Cache pool released");
        }
        if self.identity_provider.take_for_close().is_some() {
            tracing::info!("Identity provider released");
        }
        if let Some(pool) = self.database.take_for_close() {
            if let Err(e) = database::close(&pool).await {
                self.database.fail(&e);
                return Err(e);
            }
            tracing::info!("Database connections closed");
        }
        Ok(())
    }

    /// Serve the router on `addr` until a shutdown signal, then close everything.
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let app = self.router()?.build();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::setup(ResourceKind::Router, e))?;
        tracing::info!("Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::setup(ResourceKind::Router, e))?;

        tracing::info!("Server stopped, releasing resources...");
        self.close_all().await
    }
}
