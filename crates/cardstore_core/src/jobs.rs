//! Periodic background jobs.
//!
//! A [`PeriodicJob`] runs an async action on a fixed interval until it is
//! cancelled or dropped. An action that is already running when the job is
//! cancelled finishes first.

use crate::engine::StorageEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A named task that repeats on an interval.
#[derive(Debug)]
pub struct PeriodicJob {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl PeriodicJob {
    /// Spawns `action` to run every `period`, first after one period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut runs = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        action().await;
                        runs += 1;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(job = name, runs, "periodic job stopped");
            runs
        });
        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    /// The job's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the job and waits for it. Returns how many times it ran.
    pub async fn cancel(mut self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(job = self.name, error = %e, "periodic job panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// The engine's maintenance jobs.
#[derive(Debug)]
pub struct Maintenance {
    health_probe: PeriodicJob,
    sweeper: PeriodicJob,
}

impl Maintenance {
    /// Starts the health probe and the orphan sweeper for `engine`, using
    /// the intervals from its configuration.
    pub fn start(engine: &Arc<StorageEngine>) -> Self {
        let config = engine.config();

        let probe_engine = Arc::clone(engine);
        let health_probe = PeriodicJob::spawn("health-probe", config.health_probe_interval, move || {
            let engine = Arc::clone(&probe_engine);
            async move {
                let was_healthy = engine.is_healthy();
                let healthy = engine.reconnect().await;
                if healthy && !was_healthy {
                    info!("health probe restored backend");
                }
            }
        });

        let sweep_engine = Arc::clone(engine);
        let sweeper = PeriodicJob::spawn("orphan-sweeper", config.sweep_interval, move || {
            let engine = Arc::clone(&sweep_engine);
            async move {
                match engine.sweep_orphans().await {
                    Ok(report) if report.total() > 0 => {
                        info!(removed = report.total(), "orphan sweep removed segments");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "orphan sweep failed"),
                }
            }
        });

        Self {
            health_probe,
            sweeper,
        }
    }

    /// Stops both jobs and waits for them.
    pub async fn shutdown(self) {
        self.health_probe.cancel().await;
        self.sweeper.cancel().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use cardstore_storage::{BackendKind, FaultInjectingBackend, InMemoryBackend, StorageBackend};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_until_cancelled() {
        let counter = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&counter);
        let job = PeriodicJob::spawn("count", Duration::from_secs(10), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(job.name(), "count");
        assert_eq!(job.cancel().await, 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn health_probe_reconnects() {
        let primary = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new(
            BackendKind::Primary,
        )));
        let legacy = Arc::new(InMemoryBackend::new(BackendKind::Legacy));
        let engine = Arc::new(StorageEngine::new(
            primary.clone(),
            legacy,
            EngineConfig::default().health_probe_interval(Duration::from_secs(5)),
        ));
        engine.put_document("user", json!({ "id": "u1" })).await.unwrap();

        primary.fail_reads(true);
        engine.get_document("user").await;
        assert!(!engine.is_healthy());

        primary.fail_reads(false);
        let maintenance = Maintenance::start(&engine);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(engine.is_healthy());
        assert!(primary.get("user").await.unwrap().is_some());
        maintenance.shutdown().await;
    }
}
