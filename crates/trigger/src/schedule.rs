use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use manna_engine::RetentionSweeper;

use crate::listener::TriggerAdapter;

/// Runs the retention sweeper on a fixed period.
///
/// The first sweep happens immediately on start. A failed sweep is logged and
/// the next tick runs as usual.
pub struct SweepScheduler {
    sweeper: RetentionSweeper,
    period: Duration,
}

impl SweepScheduler {
    pub fn new(sweeper: RetentionSweeper, period: Duration) -> Self {
        Self {
            sweeper,
            period: period.max(Duration::from_secs(1)),
        }
    }

    /// Run forever. Cancel by dropping the future.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            period_secs = self.period.as_secs(),
            "Retention sweep scheduler started"
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.sweeper.sweep().await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    }
}

/// Replays the unprocessed backlog on a fixed period.
///
/// Picks up records whose write-back failed and records whose in-flight claim
/// was left behind by a crashed process once that claim has expired. The
/// first replay happens one period after start.
pub struct ReplayScheduler {
    adapter: TriggerAdapter,
    period: Duration,
}

impl ReplayScheduler {
    pub fn new(adapter: TriggerAdapter, period: Duration) -> Self {
        Self {
            adapter,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Run forever. Cancel by dropping the future.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            period_secs = self.period.as_secs(),
            "Backlog replay scheduler started"
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.adapter.replay_backlog().await {
                tracing::error!(error = %e, "Backlog replay failed");
            }
        }
    }
}
