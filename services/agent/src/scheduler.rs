use crate::pipeline::{SyncAgent, TickOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Poll interval must be greater than zero")]
    ZeroInterval,
}

/// Single-flight flag: at most one tick holds the guard at a time
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a tick; releases the flag on drop, including on panic
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a tick is already running
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                busy: self.busy.clone(),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drives [`SyncAgent::tick`] on a fixed interval until cancelled
///
/// Each tick runs in its own task. A tick that comes due while the previous
/// one is still running is skipped rather than queued.
pub struct Scheduler {
    agent: Arc<SyncAgent>,
    interval: Duration,
    in_flight: InFlight,
}

impl Scheduler {
    pub fn new(agent: Arc<SyncAgent>, interval: Duration) -> Result<Self, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        Ok(Self {
            agent,
            interval,
            in_flight: InFlight::new(),
        })
    }

    /// Run until `shutdown` is cancelled, then wait for any in-flight tick
    pub async fn run(&self, shutdown: CancellationToken) {
        // First tick one full interval after start
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs_f64(), "Scheduler started");

        let mut current: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            metrics::counter!("agent.ticks").increment(1);

            let Some(guard) = self.in_flight.try_begin() else {
                debug!("Previous tick still running, skipping this one");
                metrics::counter!("agent.ticks.overlapped").increment(1);
                continue;
            };

            let agent = self.agent.clone();
            current = Some(tokio::spawn(async move {
                let _guard = guard;
                run_tick(&agent).await;
            }));
        }

        if let Some(handle) = current {
            if !handle.is_finished() {
                info!("Waiting for in-flight tick to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Tick task failed");
            }
        }

        info!("Scheduler stopped");
    }
}

/// Run one tick, logging and absorbing any error
pub async fn run_tick(agent: &SyncAgent) -> Option<TickOutcome> {
    match agent.tick().await {
        Ok(outcome) => {
            debug!(outcome = ?outcome, "Tick finished");
            Some(outcome)
        }
        Err(e) => {
            error!(error = %e, "Tick failed");
            metrics::counter!("agent.ticks.failed").increment(1);
            None
        }
    }
}
