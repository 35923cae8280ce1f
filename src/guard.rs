//! Origin-keyed abuse tracking.
//!
//! Failed credential validations are counted per origin fingerprint,
//! not per credential — an attacker rotating keys from one origin is
//! still caught. State is a DashMap keyed by origin, so contention is
//! naturally sharded and each fingerprint is independent.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Tuning for the guard. Defaults: block after 5 failures inside a
/// 15-minute window, block lasts 30 minutes, alert after 3 denylisted
/// attempts.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub failure_threshold: u32,
    pub tracking_window: Duration,
    pub block_duration: Duration,
    pub denylist_alert_threshold: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            tracking_window: Duration::minutes(15),
            block_duration: Duration::minutes(30),
            denylist_alert_threshold: 3,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct OriginEntry {
    failure_count: u32,
    window_start: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
    manually_blocked: bool,
    denylist_count: u32,
    denylist_window_start: Option<DateTime<Utc>>,
}

/// Snapshot of one origin's state, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct OriginStatus {
    pub origin: String,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub manually_blocked: bool,
}

pub struct RateAndAbuseGuard {
    origins: DashMap<String, OriginEntry>,
    config: GuardConfig,
}

impl RateAndAbuseGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            origins: DashMap::new(),
            config,
        }
    }

    /// True when the origin is under an automatic or manual block.
    /// Stale automatic blocks are cleared lazily here, the same
    /// read-time policy as credential expiry.
    pub fn is_blocked(&self, origin: &str) -> bool {
        let Some(mut entry) = self.origins.get_mut(origin) else {
            return false;
        };
        if entry.manually_blocked {
            return true;
        }
        match entry.blocked_until {
            Some(until) if Utc::now() < until => true,
            Some(_) => {
                entry.blocked_until = None;
                false
            }
            None => false,
        }
    }

    /// Count a failed validation. Returns the block expiry if this
    /// failure breached the threshold and a block was just applied.
    ///
    /// The counter resets to zero when a block is applied — one block
    /// per breach, not an escalating block on every failure while
    /// already blocked.
    pub fn record_failure(&self, origin: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let mut entry = self.origins.entry(origin.to_string()).or_default();

        // Failures outside the tracking window start a fresh count.
        let window_expired = entry
            .window_start
            .is_none_or(|start| now - start > self.config.tracking_window);
        if window_expired {
            entry.failure_count = 0;
            entry.window_start = Some(now);
        }

        entry.failure_count += 1;
        entry.last_failure_at = Some(now);

        if entry.failure_count >= self.config.failure_threshold {
            let until = now + self.config.block_duration;
            entry.blocked_until = Some(until);
            entry.failure_count = 0;
            entry.window_start = None;
            tracing::warn!(origin, blocked_until = %until, "origin blocked after repeated validation failures");
            Some(until)
        } else {
            None
        }
    }

    /// A successful validation clears the failure count and any
    /// automatic block. Manual blocks stay — they are an
    /// administrative override.
    pub fn record_success(&self, origin: &str) {
        if let Some(mut entry) = self.origins.get_mut(origin) {
            entry.failure_count = 0;
            entry.window_start = None;
            entry.blocked_until = None;
        }
    }

    /// Count a denylisted verdict for this origin. Returns the attempt
    /// count when it reaches the alert threshold (the counter then
    /// restarts), so the caller can raise a security event once per
    /// burst instead of on every attempt.
    pub fn note_denylisted(&self, origin: &str) -> Option<u32> {
        let now = Utc::now();
        let mut entry = self.origins.entry(origin.to_string()).or_default();

        let window_expired = entry
            .denylist_window_start
            .is_none_or(|start| now - start > self.config.tracking_window);
        if window_expired {
            entry.denylist_count = 0;
            entry.denylist_window_start = Some(now);
        }

        entry.denylist_count += 1;
        if entry.denylist_count >= self.config.denylist_alert_threshold {
            let count = entry.denylist_count;
            entry.denylist_count = 0;
            entry.denylist_window_start = None;
            Some(count)
        } else {
            None
        }
    }

    /// Administrative block with no expiry. Idempotent.
    pub fn manual_block(&self, origin: &str, reason: &str) {
        let mut entry = self.origins.entry(origin.to_string()).or_default();
        if !entry.manually_blocked {
            tracing::warn!(origin, reason, "origin manually blocked");
        }
        entry.manually_blocked = true;
    }

    /// Lift a manual or automatic block and reset counters. Idempotent.
    pub fn manual_unblock(&self, origin: &str) {
        if let Some(mut entry) = self.origins.get_mut(origin) {
            entry.manually_blocked = false;
            entry.blocked_until = None;
            entry.failure_count = 0;
            entry.window_start = None;
        }
    }

    pub fn status(&self, origin: &str) -> Option<OriginStatus> {
        self.origins.get(origin).map(|entry| OriginStatus {
            origin: origin.to_string(),
            failure_count: entry.failure_count,
            last_failure_at: entry.last_failure_at,
            blocked_until: entry.blocked_until,
            manually_blocked: entry.manually_blocked,
        })
    }
}

impl Default for RateAndAbuseGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
