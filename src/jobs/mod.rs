//! Scheduled Jobs
//!
//! Periodic duplicate sweep over the unified ledger. Each cycle analyzes,
//! raises an advisory alert above the configured threshold, then removes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::dedup::{DedupReport, DeduplicationEngine};
use crate::domain::Notification;
use crate::gateway::GatewayError;
use crate::notify::Notifier;

// =========================================================================
// Configuration
// =========================================================================

/// Configuration for the dedup scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Time between cycles (default: 5 minutes)
    pub interval_ms: u64,
    /// Duplicates above this raise a `DuplicateAlert` (default: 10)
    pub alert_threshold: usize,
    /// Quiet cycle logs and no alerts
    pub silent: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5 * 60 * 1000,
            alert_threshold: 10,
            silent: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn merge(&self, patch: &SchedulerConfigPatch) -> Self {
        Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            interval_ms: patch.interval_ms.unwrap_or(self.interval_ms),
            alert_threshold: patch.alert_threshold.unwrap_or(self.alert_threshold),
            silent: patch.silent.unwrap_or(self.silent),
        }
    }
}

/// Partial update for `DedupScheduler::update_config`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfigPatch {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub alert_threshold: Option<usize>,
    pub silent: Option<bool>,
}

// =========================================================================
// Dedup Cycle
// =========================================================================

/// Report from one sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Surplus entries seen before removal
    pub duplicates_found: usize,
    pub alerted: bool,
    pub removal: DedupReport,
    pub completed_at: DateTime<Utc>,
}

/// Analyze, alert if needed, then remove
pub async fn dedup_cycle(
    engine: &DeduplicationEngine,
    notifier: &Notifier,
    config: &SchedulerConfig,
) -> Result<CycleReport, GatewayError> {
    let analysis = match engine.analyze().await {
        Ok(analysis) => analysis,
        Err(e) => return Err(cycle_failed(notifier, e)),
    };
    let duplicates_found = analysis.total_duplicates;

    let alerted = !config.silent && duplicates_found > config.alert_threshold;
    if alerted {
        tracing::warn!(
            duplicates = duplicates_found,
            threshold = config.alert_threshold,
            "Duplicate count above alert threshold"
        );
        notifier.emit(Notification::DuplicateAlert {
            duplicates: duplicates_found,
            threshold: config.alert_threshold,
            time: Utc::now(),
        });
    }

    let removal = if analysis.has_duplicates() {
        match engine.remove().await {
            Ok(removal) => removal,
            Err(e) => return Err(cycle_failed(notifier, e)),
        }
    } else {
        DedupReport::default()
    };

    let completed_at = Utc::now();
    notifier.emit(Notification::DeduplicationCompleted {
        removed: removal.duplicates_removed,
        kept: removal.kept,
        errors: removal.errors.len(),
        time: completed_at,
    });

    if config.silent {
        tracing::debug!(
            found = duplicates_found,
            removed = removal.duplicates_removed,
            errors = removal.errors.len(),
            "Dedup cycle complete"
        );
    } else {
        tracing::info!(
            found = duplicates_found,
            removed = removal.duplicates_removed,
            errors = removal.errors.len(),
            "Dedup cycle complete"
        );
    }

    Ok(CycleReport {
        duplicates_found,
        alerted,
        removal,
        completed_at,
    })
}

/// A cycle that could not scan the ledger still reports its outcome
fn cycle_failed(notifier: &Notifier, error: GatewayError) -> GatewayError {
    tracing::warn!(error = %error, "Dedup cycle could not scan the ledger");
    notifier.emit(Notification::DeduplicationCompleted {
        removed: 0,
        kept: 0,
        errors: 1,
        time: Utc::now(),
    });
    error
}

// =========================================================================
// Job Scheduler
// =========================================================================

struct RunningJob {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    running: Option<RunningJob>,
}

/// Dedup Scheduler - runs the sweep on a fixed interval
#[derive(Clone)]
pub struct DedupScheduler {
    engine: DeduplicationEngine,
    notifier: Notifier,
    inner: Arc<Mutex<SchedulerInner>>,
}

impl DedupScheduler {
    pub fn new(engine: DeduplicationEngine, notifier: Notifier) -> Self {
        Self::with_config(engine, notifier, SchedulerConfig::default())
    }

    pub fn with_config(
        engine: DeduplicationEngine,
        notifier: Notifier,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            notifier,
            inner: Arc::new(Mutex::new(SchedulerInner {
                config,
                running: None,
            })),
        }
    }

    pub async fn config(&self) -> SchedulerConfig {
        self.inner.lock().await.config
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.running.is_some()
    }

    /// Start with the given configuration, replacing a running loop.
    /// Returns false when the configuration is disabled.
    pub async fn start(&self, config: SchedulerConfig) -> bool {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.running.take() {
            Self::shutdown(job).await;
        }
        inner.config = config;

        if !config.enabled {
            tracing::info!("Dedup scheduler disabled");
            return false;
        }

        inner.running = Some(self.spawn(config));
        tracing::info!(interval_ms = config.interval_ms, "Dedup scheduler started");
        true
    }

    /// Cancel the timer; an in-flight sweep finishes first
    pub async fn stop(&self) {
        let job = self.inner.lock().await.running.take();
        if let Some(job) = job {
            Self::shutdown(job).await;
            tracing::info!("Dedup scheduler stopped");
        }
    }

    /// Merge a partial configuration; a running loop restarts with it
    pub async fn update_config(&self, patch: SchedulerConfigPatch) -> SchedulerConfig {
        let (config, was_running) = {
            let inner = self.inner.lock().await;
            (inner.config.merge(&patch), inner.running.is_some())
        };

        if was_running {
            self.start(config).await;
        } else {
            self.inner.lock().await.config = config;
        }
        tracing::debug!(?config, "Dedup scheduler config updated");
        config
    }

    /// Run one cycle now, whether or not the scheduler is enabled
    pub async fn force_check(&self) -> Result<CycleReport, GatewayError> {
        let config = self.config().await;
        dedup_cycle(&self.engine, &self.notifier, &config).await
    }

    fn spawn(&self, config: SchedulerConfig) -> RunningJob {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let engine = self.engine.clone();
        let notifier = self.notifier.clone();

        let task = tokio::spawn(async move {
            // first tick completes immediately
            let mut ticker = interval(config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = dedup_cycle(&engine, &notifier, &config).await {
                            tracing::error!(error = %e, "Dedup cycle failed");
                        }
                    }
                }
            }
        });

        RunningJob { shutdown, task }
    }

    async fn shutdown(job: RunningJob) {
        // stores a permit if the loop is mid-cycle
        job.shutdown.notify_one();
        if let Err(e) = job.task.await {
            tracing::error!(error = %e, "Dedup scheduler task panicked");
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
