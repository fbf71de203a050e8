//! # Poll Scheduler
//!
//! Activity-adaptive wait between synchronization passes.
//!
//! After every pass the scheduler is told how many entries were newly marked
//! done (`delta`):
//!
//! - `delta > 0` resets the interval to the base and clears the streak
//! - `delta == 0` grows the no-change streak; once it reaches the threshold the
//!   interval is multiplied by the backoff factor, capped at the maximum
//!
//! A failed pass forces the interval back to the base and asks the loop to
//! wait the short error cooldown instead.
//!
//! Scheduler state is never persisted; a restart begins at the base interval.

use chrono::{DateTime, Utc};
use core_runtime::config::PollingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub interval_secs: f64,
    pub no_change_streak: u32,
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PollScheduler {
    config: PollingConfig,
    interval: Duration,
    streak: u32,
    last_check: Option<DateTime<Utc>>,
}

impl PollScheduler {
    pub fn new(config: PollingConfig) -> Self {
        let interval = config.base_interval;
        Self {
            config,
            interval,
            streak: 0,
            last_check: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Fold a finished pass into the state and return the next wait.
    pub fn record_pass(&mut self, delta: usize, at: DateTime<Utc>) -> Duration {
        self.last_check = Some(at);

        if delta > 0 {
            self.interval = self.config.base_interval;
            self.streak = 0;
        } else {
            self.streak = self.streak.saturating_add(1);
            if self.streak >= self.config.backoff_threshold {
                let max = self.config.max_interval;
                let grown = Duration::try_from_secs_f64(
                    self.interval.as_secs_f64() * self.config.backoff_factor,
                )
                .unwrap_or(max);
                self.interval = grown.min(max);
            }
        }

        debug!(
            delta,
            streak = self.streak,
            interval_secs = self.interval.as_secs_f64(),
            "Scheduler updated"
        );
        self.interval
    }

    /// A pass failed: drop back to the base interval and return the cooldown.
    pub fn record_error(&mut self, at: DateTime<Utc>) -> Duration {
        self.last_check = Some(at);
        self.interval = self.config.base_interval;
        self.streak = 0;
        self.config.error_cooldown
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            interval_secs: self.interval.as_secs_f64(),
            no_change_streak: self.streak,
            last_check: self.last_check,
        }
    }
}
