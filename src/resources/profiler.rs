//! Process profiler starter.

use crate::config::ServiceMeta;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Profiler hook run once during bootstrap and stopped during teardown.
pub trait ProfilerStarter: Send + Sync {
    fn start(&self, meta: &ServiceMeta);

    /// Release whatever `start` spawned.
    fn stop(&self) {}
}

/// Default starter: a background task logging uptime at a fixed interval.
pub struct HeartbeatProfiler {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatProfiler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Default for HeartbeatProfiler {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl ProfilerStarter for HeartbeatProfiler {
    fn start(&self, meta: &ServiceMeta) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime available, profiler not started");
            return;
        };

        let service = format!("{}@{}", meta.name, meta.version);
        let interval = self.interval;
        let task = runtime.spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracing::debug!(
                    service = %service,
                    uptime_secs = started.elapsed().as_secs(),
                    "heartbeat"
                );
            }
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!("Profiler started for {}@{}", meta.name, meta.version);
    }

    fn stop(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
