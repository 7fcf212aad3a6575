//! Fixed-delay timers driving the crawl phases
//!
//! Each phase gets its own tokio task. The task waits the phase's initial
//! delay, then alternates between running the phase and sleeping the repeat
//! interval, so a slow run of one phase never delays another phase.

use super::{CrawlEngine, PhaseOutcome};
use crate::config::ScheduleConfig;
use crate::model::Phase;
use crate::storage::Storage;
use crate::upstream::UpstreamClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timing of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimer {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl PhaseTimer {
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }
}

/// Drives the phases of a [`CrawlEngine`] on independent timers
pub struct Scheduler<S, U> {
    engine: Arc<CrawlEngine<S, U>>,
    timers: BTreeMap<Phase, PhaseTimer>,
}

impl<S, U> Scheduler<S, U>
where
    S: Storage + Send + 'static,
    U: UpstreamClient + 'static,
{
    /// Creates a scheduler with no phases
    pub fn new(engine: Arc<CrawlEngine<S, U>>) -> Self {
        Self {
            engine,
            timers: BTreeMap::new(),
        }
    }

    /// Creates a scheduler with all three phases timed from the configuration
    pub fn from_config(engine: Arc<CrawlEngine<S, U>>, schedule: &ScheduleConfig) -> Self {
        Self::new(engine)
            .with_timer(
                Phase::Ingest,
                PhaseTimer::new(schedule.ingest.initial_delay(), schedule.ingest.interval()),
            )
            .with_timer(
                Phase::Refresh,
                PhaseTimer::new(schedule.refresh.initial_delay(), schedule.refresh.interval()),
            )
            .with_timer(
                Phase::Prune,
                PhaseTimer::new(schedule.prune.initial_delay(), schedule.prune.interval()),
            )
    }

    /// Sets (or replaces) the timer of a phase
    pub fn with_timer(mut self, phase: Phase, timer: PhaseTimer) -> Self {
        self.timers.insert(phase, timer);
        self
    }

    pub fn timers(&self) -> &BTreeMap<Phase, PhaseTimer> {
        &self.timers
    }

    /// Starts one timer task per configured phase
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .timers
            .into_iter()
            .map(|(phase, timer)| {
                tracing::info!(
                    "Scheduling {} after {:?}, then every {:?}",
                    phase,
                    timer.initial_delay,
                    timer.interval
                );
                let engine = Arc::clone(&self.engine);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(run_timer(engine, phase, timer, shutdown))
            })
            .collect();

        SchedulerHandle { shutdown_tx, tasks }
    }
}

/// Handle to the running timer tasks
///
/// Dropping the handle also stops the timers.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Returns true while any timer task is alive
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stops every timer and waits for the tasks to exit
    ///
    /// A phase run in progress is cancelled at its next await point. Its run
    /// record stays in the running state until the next startup marks it
    /// interrupted; finished languages keep their checkpoints.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!("Scheduler task panicked: {}", e);
                }
            }
        }
    }
}

async fn run_timer<S, U>(
    engine: Arc<CrawlEngine<S, U>>,
    phase: Phase,
    timer: PhaseTimer,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Storage + Send + 'static,
    U: UpstreamClient + 'static,
{
    let mut delay = timer.initial_delay;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = trigger(&engine, phase) => {}
            _ = shutdown.changed() => {
                tracing::info!("Shutdown requested, cancelling {} run", phase);
                break;
            }
        }

        delay = timer.interval;
    }

    tracing::debug!("{} timer stopped", phase);
}

async fn trigger<S, U>(engine: &CrawlEngine<S, U>, phase: Phase)
where
    S: Storage + Send,
    U: UpstreamClient,
{
    match engine.run_phase(phase).await {
        Ok(PhaseOutcome::Skipped) => {}
        Ok(PhaseOutcome::RateLimited(_)) => {
            tracing::info!("{} will resume on its next tick", phase);
        }
        Ok(PhaseOutcome::Completed(_)) => {}
        Err(e) => tracing::error!("{} run failed: {}", phase, e),
    }
}
