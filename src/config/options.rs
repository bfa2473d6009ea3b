//! Service options
//!
//! Every backing resource has its own optional sub-configuration. A `None`
//! sub-configuration is a valid state meaning "do not initialize this resource";
//! connectivity is only checked later, when the service bootstraps.

use super::EnvSource;
use crate::resources::cache::CachePool;
use crate::resources::identity::IdentityClient;
use crate::resources::profiler::ProfilerStarter;
use crate::resources::store::EmbeddedStore;
use axum::http::{HeaderName, Method, header};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub(crate) const ENV_KEY: &str = "ENV";
const LOCAL_ENV: &str = "local";

const MIGRATIONS_DIR_KEY: &str = "DATABASE_MIGRATIONS_DIR";
const DATABASE_HOST_KEY: &str = "DATABASE_HOST";
const DATABASE_USER_KEY: &str = "DATABASE_USER";
const DATABASE_PASSWORD_KEY: &str = "DATABASE_PASSWORD";
const DATABASE_SSL_MODE_KEY: &str = "DATABASE_SSL_MODE";
const DATABASE_NAME_KEY: &str = "SERVICE_DATABASE_NAME";

const REDIS_ADDRESS_KEY: &str = "REDIS_ADDRESS";
const REDIS_PASSWORD_KEY: &str = "REDIS_PASSWORD";

const IDENTITY_BUCKET_KEY: &str = "FIREBASE_BUCKET";
const IDENTITY_BUCKET_FILE_KEY: &str = "FIREBASE_BUCKET_FILE_NAME";
const IDENTITY_CONFIG_PATH_KEY: &str = "FIREBASE_CONFIG_PATH";

const SERVICE_NAME_KEY: &str = "SERVICE_NAME";
const SERVICE_VERSION_KEY: &str = "SERVICE_VERSION";
const SERVICE_PATH_KEY: &str = "SERVICE_BASE_PATH";

const EMBEDDED_STORE_FLAG_KEY: &str = "ENABLE_EMBEDDED_STORE";

/// What bootstrap does when a configured resource cannot be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and terminate the process.
    #[default]
    FailFast,
    /// Tear down what was opened and hand the error back to the caller.
    ReturnError,
}

/// The options aggregate handed to [`ServiceHost::init`](crate::ServiceHost::init).
///
/// # Example
///
/// ```rust,ignore
/// let options = Options::new()
///     .cache(CacheOptions::new("127.0.0.1:6379", "secret"))
///     .failure_policy(FailurePolicy::ReturnError);
/// ```
#[derive(Default)]
pub struct Options {
    pub(crate) logger: Option<LoggerOptions>,
    pub(crate) db: Option<DbOptions>,
    pub(crate) cache: Option<CacheOptions>,
    pub(crate) embedded_store: Option<EmbeddedStoreOptions>,
    pub(crate) identity_provider: Option<IdentityOptions>,
    pub(crate) router: Option<RouterOptions>,
    pub(crate) service_meta: Option<ServiceMeta>,
    pub(crate) policy: FailurePolicy,
    pub(crate) profiler: Option<Arc<dyn ProfilerStarter>>,
}

impl Options {
    /// Empty options: every resource is skipped and the router is bare.
    /// Logging still follows the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options built from the process environment.
    pub fn from_env() -> Self {
        Self::new().with_defaults(&EnvSource::from_process())
    }

    /// Fill every sub-configuration from `env`.
    ///
    /// A resource whose variables are not all present is left unconfigured.
    pub fn with_defaults(self, env: &EnvSource) -> Self {
        self.logger(LoggerOptions::from_env(env))
            .db(DbOptions::from_env(env))
            .cache(CacheOptions::from_env(env))
            .identity_provider(IdentityOptions::from_env(env))
            .router(RouterOptions::default())
            .service_meta(ServiceMeta::from_env(env))
            .embedded_store(EmbeddedStoreOptions::from_env(env))
    }

    pub fn logger(mut self, logger: impl Into<Option<LoggerOptions>>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn db(mut self, db: impl Into<Option<DbOptions>>) -> Self {
        self.db = db.into();
        self
    }

    pub fn cache(mut self, cache: impl Into<Option<CacheOptions>>) -> Self {
        self.cache = cache.into();
        self
    }

    pub fn embedded_store(mut self, store: impl Into<Option<EmbeddedStoreOptions>>) -> Self {
        self.embedded_store = store.into();
        self
    }

    pub fn identity_provider(mut self, identity: impl Into<Option<IdentityOptions>>) -> Self {
        self.identity_provider = identity.into();
        self
    }

    pub fn router(mut self, router: impl Into<Option<RouterOptions>>) -> Self {
        self.router = router.into();
        self
    }

    pub fn service_meta(mut self, meta: impl Into<Option<ServiceMeta>>) -> Self {
        self.service_meta = meta.into();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the default heartbeat profiler.
    pub fn profiler_starter(mut self, starter: Arc<dyn ProfilerStarter>) -> Self {
        self.profiler = Some(starter);
        self
    }
}

/// Logging subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub environment: String,
    /// An `EnvFilter` directive such as `info` or `keystone=debug`. `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl LoggerOptions {
    pub fn from_env(env: &EnvSource) -> Self {
        let environment = env.get_or(ENV_KEY, "");
        let production = matches!(environment.as_str(), "prod" | "PROD" | "production");
        Self {
            environment,
            level: if production { "info" } else { "debug" }.to_string(),
            json: production,
        }
    }
}

/// Relational database settings.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub migrations_dir: Option<PathBuf>,
    /// `host` or `host:port`.
    pub host: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: String,
    pub database: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    injected: Option<PgPool>,
}

impl DbOptions {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            migrations_dir: None,
            host: host.into(),
            user: user.into(),
            password: password.into(),
            ssl_mode: "prefer".to_string(),
            database: database.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            injected: None,
        }
    }

    pub fn from_env(env: &EnvSource) -> Option<Self> {
        if !env.all_exist(&[
            MIGRATIONS_DIR_KEY,
            DATABASE_HOST_KEY,
            DATABASE_USER_KEY,
            DATABASE_PASSWORD_KEY,
            DATABASE_SSL_MODE_KEY,
            DATABASE_NAME_KEY,
        ]) {
            return None;
        }

        Some(
            Self::new(
                env.get_or(DATABASE_HOST_KEY, ""),
                env.get_or(DATABASE_USER_KEY, ""),
                env.get_or(DATABASE_PASSWORD_KEY, ""),
                env.get_or(DATABASE_NAME_KEY, ""),
            )
            .ssl_mode(env.get_or(DATABASE_SSL_MODE_KEY, ""))
            .migrations_dir(env.get_or(MIGRATIONS_DIR_KEY, "")),
        )
    }

    pub fn ssl_mode(mut self, ssl_mode: impl Into<String>) -> Self {
        self.ssl_mode = ssl_mode.into();
        self
    }

    /// Directory of SQL migrations, relative to the working directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(dir.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Adopt an existing pool instead of dialing the database.
    pub fn with_injected_pool(mut self, pool: PgPool) -> Self {
        self.injected = Some(pool);
        self
    }

    pub fn injected_pool(&self) -> Option<&PgPool> {
        self.injected.as_ref()
    }
}

/// Cache server settings.
#[derive(Clone)]
pub struct CacheOptions {
    /// `host:port` of the server.
    pub address: String,
    pub password: String,
    pub connect_timeout: Duration,
    injected: Option<CachePool>,
}

impl CacheOptions {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            connect_timeout: Duration::from_secs(5),
            injected: None,
        }
    }

    pub fn from_env(env: &EnvSource) -> Option<Self> {
        if !env.all_exist(&[REDIS_ADDRESS_KEY, REDIS_PASSWORD_KEY]) {
            return None;
        }
        Some(Self::new(
            env.get_or(REDIS_ADDRESS_KEY, ""),
            env.get_or(REDIS_PASSWORD_KEY, ""),
        ))
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Adopt an existing pool instead of dialing the server.
    pub fn with_injected_pool(mut self, pool: CachePool) -> Self {
        self.injected = Some(pool);
        self
    }

    pub fn injected_pool(&self) -> Option<&CachePool> {
        self.injected.as_ref()
    }
}

/// Where the identity provider credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Bucket { bucket: String, object: String },
}

pub const DEFAULT_CREDENTIALS_OBJECT: &str = "firebase.json";
pub const DEFAULT_SIGNING_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Identity provider settings.
#[derive(Clone)]
pub struct IdentityOptions {
    pub source: CredentialSource,
    pub signing_keys_url: String,
    pub storage_url: String,
    pub request_timeout: Duration,
    injected: Option<IdentityClient>,
}

impl IdentityOptions {
    fn with_source(source: CredentialSource) -> Self {
        Self {
            source,
            signing_keys_url: DEFAULT_SIGNING_KEYS_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            injected: None,
        }
    }

    /// Credentials from a local JSON file. The path must include the file name.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(CredentialSource::File(path.into()))
    }

    /// Credentials stored as an object in a bucket. An empty `object` means `firebase.json`.
    pub fn from_bucket(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        let object = object.into();
        let object = if object.is_empty() {
            DEFAULT_CREDENTIALS_OBJECT.to_string()
        } else {
            object
        };
        Self::with_source(CredentialSource::Bucket {
            bucket: bucket.into(),
            object,
        })
    }

    pub fn from_env(env: &EnvSource) -> Option<Self> {
        if let Some(bucket) = env.get(IDENTITY_BUCKET_KEY) {
            return Some(Self::from_bucket(
                bucket,
                env.get_or(IDENTITY_BUCKET_FILE_KEY, ""),
            ));
        }
        env.get(IDENTITY_CONFIG_PATH_KEY).map(Self::from_file)
    }

    pub fn signing_keys_url(mut self, url: impl Into<String>) -> Self {
        self.signing_keys_url = url.into();
        self
    }

    pub fn storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Adopt an existing client instead of loading credentials.
    pub fn with_injected_client(mut self, client: IdentityClient) -> Self {
        self.injected = Some(client);
        self
    }

    pub fn injected_client(&self) -> Option<&IdentityClient> {
        self.injected.as_ref()
    }
}

/// Middleware attached to the router when it is created.
#[derive(Clone)]
pub struct RouterOptions {
    pub trace_requests: bool,
    pub cors: Option<CorsLayer>,
}

impl RouterOptions {
    /// A router with no middleware at all.
    pub fn bare() -> Self {
        Self {
            trace_requests: false,
            cors: None,
        }
    }

    pub fn trace_requests(mut self, enabled: bool) -> Self {
        self.trace_requests = enabled;
        self
    }

    pub fn cors(mut self, cors: impl Into<Option<CorsLayer>>) -> Self {
        self.cors = cors.into();
        self
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            trace_requests: true,
            cors: Some(default_cors()),
        }
    }
}

fn default_cors() -> CorsLayer {
    let headers: [HeaderName; 4] = [
        header::ORIGIN,
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
    ];
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::HEAD,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(headers)
}

/// Process metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMeta {
    pub environment: String,
    pub name: String,
    pub version: String,
    pub base_path: String,
    pub profiler: bool,
}

impl ServiceMeta {
    pub fn new(
        environment: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        let environment = environment.into();
        Self {
            profiler: environment != LOCAL_ENV,
            environment,
            name: name.into(),
            version: version.into(),
            base_path: base_path.into(),
        }
    }

    pub fn from_env(env: &EnvSource) -> Option<Self> {
        if !env.all_exist(&[
            ENV_KEY,
            SERVICE_NAME_KEY,
            SERVICE_VERSION_KEY,
            SERVICE_PATH_KEY,
        ]) {
            return None;
        }
        Some(Self::new(
            env.get_or(ENV_KEY, ""),
            env.get_or(SERVICE_NAME_KEY, ""),
            env.get_or(SERVICE_VERSION_KEY, ""),
            env.get_or(SERVICE_PATH_KEY, ""),
        ))
    }

    pub fn profiler(mut self, enabled: bool) -> Self {
        self.profiler = enabled;
        self
    }
}

/// Where the embedded store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Nothing touches the disk; the data lives as long as the process.
    InMemory,
    Path(PathBuf),
}

/// Embedded key-value store settings.
#[derive(Clone)]
pub struct EmbeddedStoreOptions {
    pub location: StoreLocation,
    injected: Option<EmbeddedStore>,
}

impl EmbeddedStoreOptions {
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            injected: None,
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::Path(path.into()),
            injected: None,
        }
    }

    /// In-memory store when the enable flag is true, otherwise `None`.
    pub fn from_env(env: &EnvSource) -> Option<Self> {
        env.flag(EMBEDDED_STORE_FLAG_KEY).then(Self::in_memory)
    }

    /// Adopt an already opened store.
    pub fn with_injected_store(mut self, store: EmbeddedStore) -> Self {
        self.injected = Some(store);
        self
    }

    pub fn injected_store(&self) -> Option<&EmbeddedStore> {
        self.injected.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env() -> EnvSource {
        EnvSource::from_pairs([
            ("ENV", "staging"),
            ("DATABASE_MIGRATIONS_DIR", "migrations"),
            ("DATABASE_HOST", "db.internal:5433"),
            ("DATABASE_USER", "svc"),
            ("DATABASE_PASSWORD", "secret"),
            ("DATABASE_SSL_MODE", "disable"),
            ("SERVICE_DATABASE_NAME", "main"),
            ("REDIS_ADDRESS", "cache.internal:6379"),
            ("REDIS_PASSWORD", "hunter2"),
            ("FIREBASE_CONFIG_PATH", "/etc/firebase.json"),
            ("SERVICE_NAME", "orders"),
            ("SERVICE_VERSION", "1.2.3"),
            ("SERVICE_BASE_PATH", "/v1/orders"),
            ("ENABLE_EMBEDDED_STORE", "true"),
        ])
    }

    #[test]
    fn test_with_defaults_populates_everything() {
        let options = Options::new().with_defaults(&full_env());

        let db = options.db.as_ref().unwrap();
        assert_eq!(db.host, "db.internal:5433");
        assert_eq!(db.ssl_mode, "disable");
        assert_eq!(db.migrations_dir, Some(PathBuf::from("migrations")));

        let cache = options.cache.as_ref().unwrap();
        assert_eq!(cache.address, "cache.internal:6379");

        let identity = options.identity_provider.as_ref().unwrap();
        assert_eq!(
            identity.source,
            CredentialSource::File(PathBuf::from("/etc/firebase.json"))
        );

        let meta = options.service_meta.as_ref().unwrap();
        assert_eq!(meta.name, "orders");
        assert!(meta.profiler);

        assert!(options.router.is_some());
        assert!(options.logger.is_some());
        assert_eq!(
            options.embedded_store.as_ref().unwrap().location,
            StoreLocation::InMemory
        );
        assert_eq!(options.policy, FailurePolicy::FailFast);
    }

    #[test]
    fn test_partial_database_env_is_absent() {
        let env = EnvSource::from_pairs([
            ("DATABASE_HOST", "db.internal"),
            ("DATABASE_USER", "svc"),
            ("DATABASE_PASSWORD", "secret"),
        ]);
        let options = Options::new().with_defaults(&env);
        assert!(options.db.is_none());
        assert!(options.cache.is_none());
        assert!(options.identity_provider.is_none());
        assert!(options.service_meta.is_none());
        assert!(options.embedded_store.is_none());
    }

    #[test]
    fn test_cache_requires_password() {
        let env = EnvSource::from_pairs([("REDIS_ADDRESS", "cache.internal:6379")]);
        assert!(CacheOptions::from_env(&env).is_none());
    }

    #[test]
    fn test_identity_bucket_wins_over_path() {
        let env = EnvSource::from_pairs([
            ("FIREBASE_BUCKET", "secrets"),
            ("FIREBASE_CONFIG_PATH", "/etc/firebase.json"),
        ]);
        let identity = IdentityOptions::from_env(&env).unwrap();
        assert_eq!(
            identity.source,
            CredentialSource::Bucket {
                bucket: "secrets".to_string(),
                object: DEFAULT_CREDENTIALS_OBJECT.to_string(),
            }
        );
    }

    #[test]
    fn test_local_environment_disables_profiler() {
        let meta = ServiceMeta::new("local", "orders", "dev", "/");
        assert!(!meta.profiler);
    }

    #[test]
    fn test_production_logger_uses_json() {
        let env = EnvSource::from_pairs([("ENV", "PROD")]);
        let logger = LoggerOptions::from_env(&env);
        assert!(logger.json);
        assert_eq!(logger.level, "info");

        let logger = LoggerOptions::from_env(&EnvSource::default());
        assert!(!logger.json);
        assert_eq!(logger.level, "debug");
    }

    #[test]
    fn test_store_flag_false_is_absent() {
        let env = EnvSource::from_pairs([("ENABLE_EMBEDDED_STORE", "false")]);
        assert!(EmbeddedStoreOptions::from_env(&env).is_none());
    }
}
