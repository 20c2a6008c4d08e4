//! Rate governor: hour/day call budgets and minimum inter-call spacing.
//!
//! The governor never sleeps. `check` returns an admission decision and the
//! caller decides whether to wait; that keeps the check side-effect free and
//! lets an outer driver interleave other work during spacing waits.
//!
//! Explicitly constructed and injectable: tests instantiate isolated
//! instances, and persistence goes through [`crate::state::StateStore`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::warn;

use crate::config::GovernorConfig;
use crate::state::RateWindow;

/// Admission decision for one governed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Call now.
    Proceed,
    /// Call after waiting this long (spacing; within the policy ceiling).
    Wait(Duration),
    /// Do not call this pass.
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Inside the failure backoff window.
    Backoff { remaining: Duration },
    /// Day budget exhausted.
    DailyLimit { used: usize, limit: usize },
    /// Hour budget exhausted.
    HourlyLimit { used: usize, limit: usize },
    /// Required spacing exceeds the policy ceiling.
    SpacingTooLong { required: Duration },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::Backoff { remaining } => {
                write!(f, "in backoff for {} more seconds", remaining.as_secs())
            }
            DenyReason::DailyLimit { used, limit } => {
                write!(f, "daily limit reached ({used}/{limit})")
            }
            DenyReason::HourlyLimit { used, limit } => {
                write!(f, "hourly limit reached ({used}/{limit})")
            }
            DenyReason::SpacingTooLong { required } => {
                write!(f, "would need to wait {}s for spacing", required.as_secs())
            }
        }
    }
}

/// Point-in-time snapshot for operators.
#[derive(Debug, Clone)]
pub struct GovernorStatus {
    pub daily_used: usize,
    pub daily_limit: usize,
    pub hourly_used: usize,
    pub hourly_limit: usize,
    pub consecutive_failures: u32,
    pub in_backoff: bool,
    pub backoff_remaining: Option<Duration>,
}

/// Enforces call budgets with persisted state.
///
/// One caller at a time: check-then-record is not atomic under concurrency.
pub struct RateGovernor {
    config: GovernorConfig,
    window: RateWindow,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig, window: RateWindow) -> Self {
        Self { config, window }
    }

    /// Snapshot the window for persistence.
    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    /// Admission order: backoff, day budget, hour budget, spacing.
    pub fn check(&mut self, now: DateTime<Utc>) -> Admission {
        if let Some(until) = self.window.backoff_until {
            if now < until {
                let remaining = (until - now).to_std().unwrap_or_default();
                return Admission::Deny(DenyReason::Backoff { remaining });
            }
        }

        self.purge_old(now);

        let daily = self.window.recent.len();
        if daily >= self.config.max_per_day {
            return Admission::Deny(DenyReason::DailyLimit {
                used: daily,
                limit: self.config.max_per_day,
            });
        }

        let hour_ago = now - ChronoDuration::hours(1);
        let hourly = self.window.recent.iter().filter(|t| **t > hour_ago).count();
        if hourly >= self.config.max_per_hour {
            return Admission::Deny(DenyReason::HourlyLimit {
                used: hourly,
                limit: self.config.max_per_hour,
            });
        }

        if let Some(last) = self.window.last_call {
            let required = self.config.min_delay.as_secs_f64()
                * self
                    .config
                    .backoff_multiplier
                    .powi(self.window.consecutive_failures as i32);
            let elapsed = (now - last).to_std().unwrap_or_default().as_secs_f64();
            if elapsed < required {
                let wait = Duration::from_secs_f64(required - elapsed);
                if wait > self.config.max_wait {
                    return Admission::Deny(DenyReason::SpacingTooLong { required: wait });
                }
                return Admission::Wait(wait);
            }
        }

        Admission::Proceed
    }

    /// Record a governed call and its outcome.
    ///
    /// Three or more consecutive failures set a backoff window of
    /// `min(60, 5 * 2^(failures-3))` minutes.
    pub fn record_outcome(&mut self, success: bool, now: DateTime<Utc>) {
        self.window.recent.push(now);
        self.window.last_call = Some(now);

        if success {
            self.window.consecutive_failures = 0;
            self.window.backoff_until = None;
        } else {
            self.window.consecutive_failures += 1;
            let failures = self.window.consecutive_failures;
            if failures >= 3 {
                // Clamp the exponent: past 2^4 the cap already wins, and an
                // unclamped pow overflows once the persisted failure count
                // grows past 33.
                let exp = (failures - 3).min(10);
                let minutes = std::cmp::min(60u32, 5u32.saturating_mul(2u32.saturating_pow(exp)));
                self.window.backoff_until = Some(now + ChronoDuration::minutes(i64::from(minutes)));
                warn!(failures, backoff_minutes = minutes, "governor entering backoff");
            }
        }
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> GovernorStatus {
        self.purge_old(now);

        let hour_ago = now - ChronoDuration::hours(1);
        let hourly = self.window.recent.iter().filter(|t| **t > hour_ago).count();
        let backoff_remaining = self
            .window
            .backoff_until
            .filter(|until| *until > now)
            .map(|until| (until - now).to_std().unwrap_or_default());

        GovernorStatus {
            daily_used: self.window.recent.len(),
            daily_limit: self.config.max_per_day,
            hourly_used: hourly,
            hourly_limit: self.config.max_per_hour,
            consecutive_failures: self.window.consecutive_failures,
            in_backoff: backoff_remaining.is_some(),
            backoff_remaining,
        }
    }

    /// Drop entries older than the day window. Lazy, on every check.
    fn purge_old(&mut self, now: DateTime<Utc>) {
        let cutoff = now - ChronoDuration::hours(24);
        self.window.recent.retain(|t| *t > cutoff);
    }
}
