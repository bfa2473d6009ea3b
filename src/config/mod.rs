mod env;
mod options;

pub use env::EnvSource;
pub use options::{
    CacheOptions, CredentialSource, DEFAULT_CREDENTIALS_OBJECT, DEFAULT_SIGNING_KEYS_URL,
    DEFAULT_STORAGE_URL, DbOptions, EmbeddedStoreOptions, FailurePolicy, IdentityOptions,
    LoggerOptions, Options, RouterOptions, ServiceMeta, StoreLocation,
};
