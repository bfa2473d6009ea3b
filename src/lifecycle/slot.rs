//! Per-resource state machine.
//!
//! ```text
//! Unconfigured ──begin──▶ Initializing ──publish──▶ Ready ──take_for_close──▶ Closed
//!       ▲                      │
//!       └──── begin ◀── Failed ◀┘ fail
//! ```

use crate::error::{ResourceKind, Result, ServiceError};
use std::sync::{Arc, Mutex, PoisonError};

/// Observable state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceState {
    Unconfigured,
    Initializing,
    Ready,
    Failed,
    Closed,
}

enum SlotState<T> {
    Unconfigured,
    Initializing,
    Ready(Arc<T>),
    Failed(String),
    Closed,
}

/// Holds at most one handle of a resource kind.
pub(crate) struct ResourceSlot<T> {
    kind: ResourceKind,
    state: Mutex<SlotState<T>>,
}

impl<T> ResourceSlot<T> {
    pub(crate) fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState::Unconfigured),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for initialization. Only one caller can hold the claim.
    pub(crate) fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        match &*state {
            SlotState::Unconfigured | SlotState::Failed(_) => {
                *state = SlotState::Initializing;
                Ok(())
            }
            SlotState::Initializing => Err(ServiceError::already_initializing(self.kind)),
            SlotState::Ready(_) => Err(ServiceError::already_initialized(self.kind)),
            SlotState::Closed => Err(ServiceError::closed(self.kind)),
        }
    }

    pub(crate) fn publish(&self, handle: T) -> Arc<T> {
        let handle = Arc::new(handle);
        *self.lock() = SlotState::Ready(Arc::clone(&handle));
        handle
    }

    pub(crate) fn fail(&self, error: &ServiceError) {
        *self.lock() = SlotState::Failed(error.to_string());
    }

    pub(crate) fn get(&self) -> Result<Arc<T>> {
        match &*self.lock() {
            SlotState::Ready(handle) => Ok(Arc::clone(handle)),
            SlotState::Closed => Err(ServiceError::closed(self.kind)),
            _ => Err(ServiceError::not_yet_initialized(self.kind)),
        }
    }

    /// Move a ready handle out for teardown. The slot ends up closed.
    pub(crate) fn take_for_close(&self) -> Option<Arc<T>> {
        let mut state = self.lock();
        if !matches!(&*state, SlotState::Ready(_)) {
            return None;
        }
        match std::mem::replace(&mut *state, SlotState::Closed) {
            SlotState::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub(crate) fn state(&self) -> ResourceState {
        match &*self.lock() {
            SlotState::Unconfigured => ResourceState::Unconfigured,
            SlotState::Initializing => ResourceState::Initializing,
            SlotState::Ready(_) => ResourceState::Ready,
            SlotState::Failed(_) => ResourceState::Failed,
            SlotState::Closed => ResourceState::Closed,
        }
    }

    /// Reason recorded by the last failed initialization.
    pub(crate) fn failure(&self) -> Option<String> {
        match &*self.lock() {
            SlotState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Run `open` under the slot's claim and publish its handle.
pub(crate) async fn initialize<T, F, Fut>(slot: &ResourceSlot<T>, open: F) -> Result<Arc<T>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    if let Some(reason) = slot.failure() {
        tracing::debug!("Retrying {} after earlier failure: {}", slot.kind(), reason);
    }
    slot.begin()?;
    match open().await {
        Ok(handle) => Ok(slot.publish(handle)),
        Err(e) => {
            tracing::error!(resource = %slot.kind(), error = %e, "Resource setup failed");
            slot.fail(&e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Condition;

    #[test]
    fn test_begin_is_exclusive() {
        let slot: ResourceSlot<u32> = ResourceSlot::new(ResourceKind::Cache);
        slot.begin().unwrap();
        let err = slot.begin().unwrap_err();
        assert!(err.is(ResourceKind::Cache, Condition::AlreadyInitializing));
        assert_eq!(slot.state(), ResourceState::Initializing);

        slot.publish(7);
        let err = slot.begin().unwrap_err();
        assert!(err.is(ResourceKind::Cache, Condition::AlreadyInitialized));
    }

    #[test]
    fn test_get_before_and_after_publish() {
        let slot: ResourceSlot<u32> = ResourceSlot::new(ResourceKind::Database);
        let err = slot.get().unwrap_err();
        assert!(err.is(ResourceKind::Database, Condition::NotYetInitialized));

        slot.begin().unwrap();
        let published = slot.publish(42);
        let first = slot.get().unwrap();
        let second = slot.get().unwrap();
        assert!(Arc::ptr_eq(&published, &first));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_slot_can_retry() {
        let slot: ResourceSlot<u32> = ResourceSlot::new(ResourceKind::EmbeddedStore);
        slot.begin().unwrap();
        slot.fail(&ServiceError::setup(ResourceKind::EmbeddedStore, "disk full"));
        assert_eq!(slot.state(), ResourceState::Failed);
        assert!(slot.failure().unwrap().contains("disk full"));
        assert!(slot.get().is_err());

        slot.begin().unwrap();
        slot.publish(1);
        assert_eq!(slot.state(), ResourceState::Ready);
    }

    #[test]
    fn test_take_for_close_only_once() {
        let slot: ResourceSlot<u32> = ResourceSlot::new(ResourceKind::Cache);
        assert!(slot.take_for_close().is_none());

        slot.begin().unwrap();
        slot.publish(5);
        assert_eq!(*slot.take_for_close().unwrap(), 5);
        assert!(slot.take_for_close().is_none());
        assert_eq!(slot.state(), ResourceState::Closed);

        let err = slot.get().unwrap_err();
        assert!(err.is(ResourceKind::Cache, Condition::Closed));
        let err = slot.begin().unwrap_err();
        assert!(err.is(ResourceKind::Cache, Condition::Closed));
    }

    #[tokio::test]
    async fn test_initialize_records_failure() {
        let slot: ResourceSlot<u32> = ResourceSlot::new(ResourceKind::Cache);
        let err = initialize(&slot, || async {
            Err(ServiceError::setup(ResourceKind::Cache, "refused"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.condition(), Condition::SetupFailed);
        assert_eq!(slot.state(), ResourceState::Failed);

        let handle = initialize(&slot, || async { Ok(9) }).await.unwrap();
        assert_eq!(*handle, 9);
    }
}
