use std::error::Error as StdError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Boxed cause attached to setup failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The parts of the service that can fail or be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Service,
    Logger,
    Database,
    Cache,
    EmbeddedStore,
    IdentityProvider,
    Router,
    Profiler,
}

/// What went wrong with a [`ResourceKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Condition {
    /// No sub-configuration was supplied. Bootstrap treats this as "skip".
    #[strum(to_string = "configuration not supplied")]
    Unconfigured,

    #[strum(to_string = "already initialized")]
    AlreadyInitialized,

    /// Another caller is in the middle of initializing the same resource.
    #[strum(to_string = "initialization already in progress")]
    AlreadyInitializing,

    #[strum(to_string = "not yet initialized")]
    NotYetInitialized,

    #[strum(to_string = "already closed")]
    Closed,

    /// The resource was configured but could not be opened or failed its liveness check.
    #[strum(to_string = "setup failed")]
    SetupFailed,
}

impl Condition {
    /// Conditions meaning "this resource is simply not there".
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            Condition::Unconfigured | Condition::NotYetInitialized | Condition::Closed
        )
    }
}

/// Tagged lifecycle error. Compare with [`ServiceError::is`], not by message.
#[derive(Debug, Error)]
#[error("{kind}: {condition}{}", .cause.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct ServiceError {
    kind: ResourceKind,
    condition: Condition,
    #[source]
    cause: Option<BoxError>,
}

impl ServiceError {
    pub fn new(kind: ResourceKind, condition: Condition) -> Self {
        Self {
            kind,
            condition,
            cause: None,
        }
    }

    pub fn unconfigured(kind: ResourceKind) -> Self {
        Self::new(kind, Condition::Unconfigured)
    }

    pub fn already_initialized(kind: ResourceKind) -> Self {
        Self::new(kind, Condition::AlreadyInitialized)
    }

    pub fn already_initializing(kind: ResourceKind) -> Self {
        Self::new(kind, Condition::AlreadyInitializing)
    }

    pub fn not_yet_initialized(kind: ResourceKind) -> Self {
        Self::new(kind, Condition::NotYetInitialized)
    }

    pub fn closed(kind: ResourceKind) -> Self {
        Self::new(kind, Condition::Closed)
    }

    /// Create a hard failure carrying the underlying cause.
    pub fn setup(kind: ResourceKind, cause: impl Into<BoxError>) -> Self {
        Self {
            kind,
            condition: Condition::SetupFailed,
            cause: Some(cause.into()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn is(&self, kind: ResourceKind, condition: Condition) -> bool {
        self.kind == kind && self.condition == condition
    }

    /// Soft outcome: bootstrap skips the resource instead of aborting.
    pub fn is_unconfigured(&self) -> bool {
        self.condition == Condition::Unconfigured
    }
}

impl axum::response::IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.condition.is_absence() {
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        } else {
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use std::error::Error as _;

    #[test]
    fn test_compare_by_tag() {
        let err = ServiceError::not_yet_initialized(ResourceKind::Database);
        assert!(err.is(ResourceKind::Database, Condition::NotYetInitialized));
        assert!(!err.is(ResourceKind::Cache, Condition::NotYetInitialized));
        assert!(!err.is_unconfigured());
    }

    #[test]
    fn test_display_includes_cause() {
        let err = ServiceError::setup(ResourceKind::Cache, "connection refused");
        assert_eq!(err.to_string(), "cache: setup failed (connection refused)");
        assert!(err.source().is_some());

        let err = ServiceError::unconfigured(ResourceKind::EmbeddedStore);
        assert_eq!(err.to_string(), "embedded_store: configuration not supplied");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_status_codes() {
        let response = ServiceError::not_yet_initialized(ResourceKind::Cache).into_response();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

        let response = ServiceError::setup(ResourceKind::Database, "boom").into_response();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
