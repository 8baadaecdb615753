use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{RegistryConfig, UploadRegistry};

/// What a single sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_sessions: Vec<String>,
    pub evicted_artifacts: Vec<Uuid>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_sessions.is_empty() && self.evicted_artifacts.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct SweepPolicy {
    interval: Duration,
    session_idle_timeout: Duration,
    artifact_ttl: Option<Duration>,
}

impl SweepPolicy {
    fn sweep(&self, registry: &UploadRegistry, now: Instant) -> SweepReport {
        let expired_sessions = registry.expire_stale_sessions(now, self.session_idle_timeout);
        let evicted_artifacts = match self.artifact_ttl {
            Some(ttl) => registry.store().evict_older_than(now, ttl),
            None => Vec::new(),
        };

        let report = SweepReport {
            expired_sessions,
            evicted_artifacts,
        };
        if !report.is_empty() {
            tracing::info!(
                expired = ?report.expired_sessions,
                evicted = report.evicted_artifacts.len(),
                "sweep reclaimed uploads"
            );
        }
        report
    }
}

/// Periodically expires idle sessions and, if configured, old artifacts.
pub struct SessionSweeper {
    registry: Arc<UploadRegistry>,
    policy: SweepPolicy,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl SessionSweeper {
    /// Creates a stopped sweeper using the timeouts in `config`.
    pub fn new(registry: Arc<UploadRegistry>, config: &RegistryConfig) -> Self {
        Self {
            registry,
            policy: SweepPolicy {
                interval: config.sweep_interval(),
                session_idle_timeout: config.session_idle_timeout(),
                artifact_ttl: config.artifact_ttl(),
            },
            stop: Mutex::new(None),
        }
    }

    /// Runs one sweep at `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        self.policy.sweep(&self.registry, now)
    }

    /// Starts periodic sweeps in a background tokio task.
    ///
    /// Must be called from within a tokio runtime. Call [`stop`](Self::stop)
    /// to cancel; starting again replaces the running task.
    pub fn start(&self) {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        {
            let mut stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
            // Stop any existing task.
            drop(stop.take());
            *stop = Some(tx);
        }

        let registry = Arc::clone(&self.registry);
        let policy = self.policy;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(policy.interval);
            tracing::debug!(interval_secs = policy.interval.as_secs(), "session sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        policy.sweep(&registry, Instant::now());
                    }
                    _ = &mut rx => {
                        break;
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        });
    }

    /// Stops the periodic sweep task.
    pub fn stop(&self) {
        let mut stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        // Dropping the sender signals the task to exit.
        drop(stop.take());
    }

    /// Returns `true` while a background task is running.
    pub fn is_running(&self) -> bool {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
