//! Scheduler loop: read, publish, sleep, repeat.
//!
//! The `Executor` owns the sensor reader and the reading publisher. A cycle
//! is never interrupted once started; cancellation is only observed while
//! sleeping between cycles, so shutdown never leaves half a reading on the
//! broker.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    publisher::{PublishReport, ReadingPublisher},
    sensor::SensorReader,
};
use crate::config::publish::PublishConfig;

/// Lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
}

/// Result of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(PublishReport),
    SensorFailed,
    PublishFailed,
}

/// Timing settings for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,

    /// Wake on wall-clock multiples of `interval` instead of `interval` after the
    /// previous cycle.
    pub align_to_interval: bool,
}

impl Schedule {
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval),
            align_to_interval: config.align_to_interval,
        }
    }

    /// Time to wait after a cycle that took `elapsed`.
    pub fn delay_after(&self, elapsed: Duration) -> Duration {
        if self.align_to_interval {
            self.delay_until_aligned(wall_clock())
        } else {
            self.interval.saturating_sub(elapsed)
        }
    }

    /// Time from `since_epoch` to the next multiple of the interval. A time
    /// exactly on a boundary waits a full interval.
    pub fn delay_until_aligned(&self, since_epoch: Duration) -> Duration {
        let interval_ms = self.interval.as_millis().max(1);
        let into_period = since_epoch.as_millis() % interval_ms;
        Duration::from_millis((interval_ms - into_period) as u64)
    }
}

fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Periodic read and publish loop.
pub struct Executor {
    reader: SensorReader,
    publisher: ReadingPublisher,
    schedule: Schedule,
    cancel: CancellationToken,
    state: LoopState,
}

impl Executor {
    pub fn new(
        reader: SensorReader,
        publisher: ReadingPublisher,
        schedule: Schedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            publisher,
            schedule,
            cancel,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs one read and publish cycle. Failures are logged, never propagated.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let reading = match self.reader.read().await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Sensor read failed, skipping cycle: {}", e);
                return CycleOutcome::SensorFailed;
            }
        };

        info!("{}", reading);

        match self.publisher.publish(&reading).await {
            Ok(report) => CycleOutcome::Published(report),
            Err(e) => {
                warn!("Publish failed, reading dropped: {}", e);
                CycleOutcome::PublishFailed
            }
        }
    }

    /// Sleeps for `delay` unless cancelled first. Returns `false` on cancellation.
    async fn sleep_or_cancel(&mut self, delay: Duration) -> bool {
        debug!("Next cycle in {:.3}s", delay.as_secs_f64());
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.state = LoopState::Stopping;
                false
            }
            _ = sleep(delay) => true,
        }
    }

    /// Runs until the cancellation token fires. Returns the number of cycles run.
    pub async fn run(&mut self) -> u64 {
        info!(
            "Reading {} every {}s{}",
            self.reader.describe(),
            self.schedule.interval.as_secs(),
            if self.schedule.align_to_interval {
                " (aligned to wall clock)"
            } else {
                ""
            }
        );

        if self.schedule.align_to_interval {
            let delay = self.schedule.delay_until_aligned(wall_clock());
            if !self.sleep_or_cancel(delay).await {
                info!("Executor stopped before the first cycle");
                return 0;
            }
        }

        let mut cycles = 0u64;
        while self.state == LoopState::Running {
            if self.cancel.is_cancelled() {
                self.state = LoopState::Stopping;
                break;
            }

            let start = Instant::now();
            let outcome = self.run_cycle().await;
            cycles += 1;
            debug!("Cycle {} finished: {:?}", cycles, outcome);

            let delay = self.schedule.delay_after(start.elapsed());
            self.sleep_or_cancel(delay).await;
        }

        info!("Executor stopped after {} cycles", cycles);
        cycles
    }
}
