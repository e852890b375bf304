//! 会话停滞检测 - 业务能力层

use crate::config::Config;
use crate::models::{BatchStatus, SessionStatus};
use std::time::Duration;
use tokio::time::Instant;

/// 判定会话卡死的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// 一直 processing 但完成数和失败数都是 0
    NoProgress,
    /// 一直 processing 但没有任何页在处理
    NothingInFlight,
    /// 轮询总时长超限
    GlobalTimeout,
}

impl std::fmt::Display for StallReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StallReason::NoProgress => "长时间没有任何页面完成",
            StallReason::NothingInFlight => "长时间没有页面在处理",
            StallReason::GlobalTimeout => "轮询总时长超限",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    pub no_progress_timeout: Duration,
    pub idle_timeout: Duration,
    pub global_timeout: Duration,
}

impl From<&Config> for StalenessPolicy {
    fn from(config: &Config) -> Self {
        Self {
            no_progress_timeout: config.no_progress_timeout,
            idle_timeout: config.idle_timeout,
            global_timeout: config.global_poll_timeout,
        }
    }
}

/// 按快照序列判断会话是否卡死
#[derive(Debug)]
pub struct StalenessTracker {
    policy: StalenessPolicy,
    started_at: Instant,
    last_finished: u32,
    idle_since: Option<Instant>,
}

impl StalenessTracker {
    pub fn new(policy: StalenessPolicy, now: Instant) -> Self {
        Self {
            policy,
            started_at: now,
            last_finished: 0,
            idle_since: None,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// 只看总时长，用于查询失败、拿不到快照的轮次
    pub fn check_deadline(&self, now: Instant) -> Option<StallReason> {
        (self.elapsed(now) >= self.policy.global_timeout).then_some(StallReason::GlobalTimeout)
    }

    /// 记录一次快照并判定
    pub fn observe(&mut self, status: &BatchStatus, now: Instant) -> Option<StallReason> {
        let finished = status.finished_pages();
        let progressed = finished > self.last_finished;
        if progressed {
            self.last_finished = finished;
        }

        if let Some(reason) = self.check_deadline(now) {
            return Some(reason);
        }
        if status.status != SessionStatus::Processing {
            self.idle_since = None;
            return None;
        }

        if finished == 0 && self.elapsed(now) > self.policy.no_progress_timeout {
            return Some(StallReason::NoProgress);
        }

        if status.in_flight_pages().is_empty() && !progressed {
            let idle_since = *self.idle_since.get_or_insert(now);
            if now.saturating_duration_since(idle_since) > self.policy.idle_timeout {
                return Some(StallReason::NothingInFlight);
            }
        } else {
            self.idle_since = None;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> StalenessPolicy {
        StalenessPolicy {
            no_progress_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
            global_timeout: Duration::from_secs(600),
        }
    }

    fn snapshot(completed: u32, in_flight: &[u32]) -> BatchStatus {
        serde_json::from_value(json!({
            "status": "processing",
            "total_pages": 10,
            "completed_pages": completed,
            "processing_pages": in_flight,
        }))
        .unwrap()
    }

    #[test]
    fn zero_progress_trips_after_window() {
        let t0 = Instant::now();
        let mut tracker = StalenessTracker::new(policy(), t0);
        assert_eq!(tracker.observe(&snapshot(0, &[1]), t0 + Duration::from_secs(119)), None);
        assert_eq!(
            tracker.observe(&snapshot(0, &[1]), t0 + Duration::from_secs(121)),
            Some(StallReason::NoProgress)
        );
    }

    #[test]
    fn idle_window_starts_when_nothing_is_in_flight() {
        let t0 = Instant::now();
        let mut tracker = StalenessTracker::new(policy(), t0);
        assert_eq!(tracker.observe(&snapshot(2, &[3]), t0), None);
        assert_eq!(tracker.observe(&snapshot(2, &[]), t0 + Duration::from_secs(10)), None);
        assert_eq!(tracker.observe(&snapshot(2, &[]), t0 + Duration::from_secs(70)), None);
        assert_eq!(
            tracker.observe(&snapshot(2, &[]), t0 + Duration::from_secs(71)),
            Some(StallReason::NothingInFlight)
        );
    }

    #[test]
    fn progress_resets_idle_window() {
        let t0 = Instant::now();
        let mut tracker = StalenessTracker::new(policy(), t0);
        assert_eq!(tracker.observe(&snapshot(1, &[]), t0), None);
        assert_eq!(tracker.observe(&snapshot(1, &[]), t0 + Duration::from_secs(50)), None);
        assert_eq!(tracker.observe(&snapshot(2, &[]), t0 + Duration::from_secs(100)), None);
        assert_eq!(tracker.observe(&snapshot(2, &[]), t0 + Duration::from_secs(150)), None);
    }

    #[test]
    fn global_deadline_applies_even_with_progress() {
        let t0 = Instant::now();
        let mut tracker = StalenessTracker::new(policy(), t0);
        assert_eq!(
            tracker.observe(&snapshot(5, &[6]), t0 + Duration::from_secs(600)),
            Some(StallReason::GlobalTimeout)
        );
        assert_eq!(tracker.check_deadline(t0 + Duration::from_secs(599)), None);
    }
}
