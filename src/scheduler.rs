//! Scheduler: decides the next execution instant for every enabled monitor
//! and hands `Job`s to the dispatch queue at that instant. Grounded on
//! `checker::run_checker`'s polling loop, restructured around the explicit
//! `idle -> queued -> running -> idle` per-monitor state machine.

use crate::config::Config;
use crate::models::{Monitor, MonitorStatus};
use crate::queue::{DispatchQueue, Job};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightState {
    Idle,
    Queued,
    Running,
}

struct Entry {
    monitor: Monitor,
    next_fire: DateTime<Utc>,
    state: FlightState,
    current_interval_seconds: u32,
    consecutive_up_at_interval: u32,
    last_content_hash: Option<String>,
    /// Highest resend index already sent for this monitor's current
    /// incident, so the resend sweep doesn't re-emit `incident.created`
    /// every time it ticks past an already-handled multiple of
    /// `resend_interval`.
    last_resend_nth: Option<u64>,
}

pub struct Scheduler {
    table: RwLock<HashMap<String, Entry>>,
    config: Config,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        Scheduler { table: RwLock::new(HashMap::new()), config }
    }

    /// Rebuilds the in-memory monitor table. Idempotent and safe to call
    /// concurrently with ticking; replaces the table atomically under the
    /// write lock so readers never observe a torn view. Existing in-flight
    /// state and adaptive interval are preserved across reload for monitors
    /// that still exist; new monitors fire immediately.
    pub fn reload_monitors(&self, monitors: Vec<Monitor>) {
        let now = Utc::now();
        let mut table = self.table.write().unwrap();
        let mut next_table = HashMap::with_capacity(monitors.len());
        for monitor in monitors {
            let id = monitor.id.clone();
            let entry = match table.remove(&id) {
                Some(mut existing) => {
                    existing.monitor = monitor;
                    existing
                }
                None => Entry {
                    current_interval_seconds: monitor.interval_seconds,
                    next_fire: now,
                    state: FlightState::Idle,
                    consecutive_up_at_interval: 0,
                    last_content_hash: None,
                    last_resend_nth: None,
                    monitor,
                },
            };
            next_table.insert(id, entry);
        }
        *table = next_table;
    }

    /// Evaluate due monitors at `now`, attempt to enqueue each as a `Job`.
    /// Returns the number of jobs dropped this tick because the queue was
    /// full (the scheduler never blocks on a full queue).
    pub fn tick(&self, now: DateTime<Utc>, queue: &DispatchQueue) -> usize {
        let mut table = self.table.write().unwrap();
        let mut dropped = 0usize;
        let mut ids: Vec<String> = table
            .iter()
            .filter(|(_, e)| e.state == FlightState::Idle && e.monitor.enabled && now >= e.next_fire)
            .map(|(id, _)| id.clone())
            .collect();
        // Ties broken by monitor id for deterministic test ordering.
        ids.sort();

        for id in ids {
            let entry = table.get_mut(&id).unwrap();
            let deadline = Instant::now() + Duration::from_secs(entry.monitor.timeout_seconds as u64);
            let job = Job { monitor: entry.monitor.clone(), deadline };
            if queue.try_push(job) {
                entry.state = FlightState::Queued;
            } else {
                dropped += 1;
                // Leave next_fire untouched; retried next tick per the
                // scheduler's backpressure contract.
            }
        }
        dropped
    }

    pub fn mark_running(&self, monitor_id: &str) {
        let mut table = self.table.write().unwrap();
        if let Some(entry) = table.get_mut(monitor_id) {
            entry.state = FlightState::Running;
        }
    }

    /// Called by a worker once a check completes. `consecutive_failures` and
    /// `consecutive_successes` are the classifier's freshly computed
    /// counters — the cached `entry.monitor` copy only otherwise gets these
    /// from `reload_monitors`, so without passing them here `apply_adaptive`
    /// would keep reading stale (typically zero) counters between reloads.
    /// Schedules the next fire (with jitter) and applies adaptive-interval
    /// adjustment if enabled.
    pub fn mark_idle(
        &self,
        monitor_id: &str,
        result_status: MonitorStatus,
        consecutive_failures: u32,
        consecutive_successes: u32,
        now: DateTime<Utc>,
    ) {
        let mut table = self.table.write().unwrap();
        let Some(entry) = table.get_mut(monitor_id) else { return };

        entry.monitor.consecutive_failures = consecutive_failures;
        entry.monitor.consecutive_successes = consecutive_successes;

        if self.config.adaptive_intervals {
            apply_adaptive(entry, result_status);
        }
        // Keep the cached monitor snapshot's status current so the resend
        // sweep (which reads `down_monitor_ids` off this table) doesn't
        // need a dedicated store round-trip every tick.
        entry.monitor.status = result_status;

        let jitter = jitter_seconds(entry.current_interval_seconds);
        entry.next_fire = now + chrono::Duration::seconds(entry.current_interval_seconds as i64 + jitter as i64);
        entry.state = FlightState::Idle;
    }

    /// Previous content hash observed for this monitor, used by
    /// `track_changes` detection. Kept here rather than in the store since
    /// it's a transient comparison aid, not part of the enumerated store
    /// contract.
    pub fn previous_content_hash(&self, monitor_id: &str) -> Option<String> {
        let table = self.table.read().unwrap();
        table.get(monitor_id).and_then(|e| e.last_content_hash.clone())
    }

    pub fn set_content_hash(&self, monitor_id: &str, hash: String) {
        let mut table = self.table.write().unwrap();
        if let Some(entry) = table.get_mut(monitor_id) {
            entry.last_content_hash = Some(hash);
        }
    }

    /// Highest resend index already delivered for this monitor's current
    /// incident; `None` if no resend has fired yet.
    pub fn last_resend_nth(&self, monitor_id: &str) -> Option<u64> {
        let table = self.table.read().unwrap();
        table.get(monitor_id).and_then(|e| e.last_resend_nth)
    }

    pub fn set_last_resend_nth(&self, monitor_id: &str, nth: u64) {
        let mut table = self.table.write().unwrap();
        if let Some(entry) = table.get_mut(monitor_id) {
            entry.last_resend_nth = Some(nth);
        }
    }

    /// Clears resend bookkeeping — called when an incident opens or
    /// resolves so the next incident's resends start counting from zero.
    pub fn reset_resend(&self, monitor_id: &str) {
        let mut table = self.table.write().unwrap();
        if let Some(entry) = table.get_mut(monitor_id) {
            entry.last_resend_nth = None;
        }
    }

    /// Snapshot of every enabled monitor currently `down`, for the resend
    /// sweep — avoids a dedicated store query by reusing the in-memory
    /// schedule table, which already mirrors `status` from the last check.
    pub fn down_monitor_ids(&self) -> Vec<String> {
        let table = self.table.read().unwrap();
        table
            .values()
            .filter(|e| e.monitor.enabled && e.monitor.status == MonitorStatus::Down && e.monitor.resend_interval > 0)
            .map(|e| e.monitor.id.clone())
            .collect()
    }

    #[cfg(test)]
    pub fn state_for(&self, monitor_id: &str) -> Option<&'static str> {
        let table = self.table.read().unwrap();
        table.get(monitor_id).map(|e| match e.state {
            FlightState::Idle => "idle",
            FlightState::Queued => "queued",
            FlightState::Running => "running",
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.read().unwrap().len()
    }
}

/// Offset in `[0, min(interval/10, 5s)]`, avoiding global synchronization
/// after bulk monitor creation.
fn jitter_seconds(interval_seconds: u32) -> u32 {
    let cap = (interval_seconds / 10).min(5);
    if cap == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=cap)
    }
}

/// Speed up failing monitors, never slow healthy ones below their declared
/// interval. See DESIGN.md for the resolved ambiguity in the source spec
/// (accelerate-only; slow-down caps at, never exceeds, the configured value).
fn apply_adaptive(entry: &mut Entry, result_status: MonitorStatus) {
    let declared = entry.monitor.interval_seconds;
    match result_status {
        MonitorStatus::Down => {
            if entry.monitor.consecutive_failures >= entry.monitor.failure_threshold {
                entry.current_interval_seconds = (entry.current_interval_seconds / 2).max(5);
                entry.consecutive_up_at_interval = 0;
            }
        }
        MonitorStatus::Up => {
            entry.consecutive_up_at_interval += 1;
            if entry.consecutive_up_at_interval >= 20 {
                let widened = (entry.current_interval_seconds as f64 * 1.5) as u32;
                entry.current_interval_seconds = widened.min(declared);
                entry.consecutive_up_at_interval = 0;
            }
        }
        MonitorStatus::Degraded | MonitorStatus::Pending => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonitorType;

    fn test_monitor(id: &str) -> Monitor {
        Monitor {
            id: id.to_string(),
            name: "test".into(),
            monitor_type: MonitorType::Http,
            target: "https://example.com".into(),
            interval_seconds: 60,
            timeout_seconds: 5,
            enabled: true,
            settings: serde_json::json!({}),
            assertions: serde_json::json!([]),
            track_changes: false,
            failure_threshold: 3,
            success_threshold: 1,
            upside_down: false,
            resend_interval: 0,
            group_id: None,
            proxy_id: None,
            tags: vec![],
            status: MonitorStatus::Pending,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_checked_at: None,
            notification_channel_ids: vec![],
            created_at: crate::models::now_str(),
            updated_at: crate::models::now_str(),
        }
    }

    #[test]
    fn new_monitor_fires_immediately() {
        let scheduler = Scheduler::new(Config::from_env());
        scheduler.reload_monitors(vec![test_monitor("m1")]);
        let (queue, mut rx) = DispatchQueue::bounded(64);
        let dropped = scheduler.tick(Utc::now(), &queue);
        assert_eq!(dropped, 0);
        assert_eq!(scheduler.state_for("m1"), Some("queued"));
        assert!(rx.try_recv().is_some());
    }

    #[test]
    fn queued_monitor_is_skipped_by_next_tick() {
        let scheduler = Scheduler::new(Config::from_env());
        scheduler.reload_monitors(vec![test_monitor("m1")]);
        let (queue, _rx) = DispatchQueue::bounded(64);
        scheduler.tick(Utc::now(), &queue);
        assert_eq!(scheduler.state_for("m1"), Some("queued"));
        let dropped = scheduler.tick(Utc::now(), &queue);
        assert_eq!(dropped, 0);
        // still queued, not re-enqueued
        assert_eq!(scheduler.state_for("m1"), Some("queued"));
    }

    #[test]
    fn reload_preserves_in_flight_state() {
        let scheduler = Scheduler::new(Config::from_env());
        scheduler.reload_monitors(vec![test_monitor("m1")]);
        let (queue, _rx) = DispatchQueue::bounded(64);
        scheduler.tick(Utc::now(), &queue);
        scheduler.mark_running("m1");
        scheduler.reload_monitors(vec![test_monitor("m1")]);
        assert_eq!(scheduler.state_for("m1"), Some("running"));
    }

    #[test]
    fn down_monitor_ids_tracks_mark_idle_status() {
        let scheduler = Scheduler::new(Config::from_env());
        let mut monitor = test_monitor("m1");
        monitor.resend_interval = 60;
        scheduler.reload_monitors(vec![monitor]);
        assert!(scheduler.down_monitor_ids().is_empty());

        scheduler.mark_idle("m1", MonitorStatus::Down, 3, 0, Utc::now());
        assert_eq!(scheduler.down_monitor_ids(), vec!["m1".to_string()]);

        scheduler.mark_idle("m1", MonitorStatus::Up, 0, 1, Utc::now());
        assert!(scheduler.down_monitor_ids().is_empty());
    }

    #[test]
    fn down_monitor_ids_excludes_monitors_with_no_resend_interval() {
        let scheduler = Scheduler::new(Config::from_env());
        scheduler.reload_monitors(vec![test_monitor("m1")]); // resend_interval defaults to 0
        scheduler.mark_idle("m1", MonitorStatus::Down, 3, 0, Utc::now());
        assert!(scheduler.down_monitor_ids().is_empty());
    }

    #[test]
    fn mark_idle_refreshes_cached_counters_before_adaptive_check() {
        let mut config = Config::from_env();
        config.adaptive_intervals = true;
        let scheduler = Scheduler::new(config);
        let mut monitor = test_monitor("m1");
        monitor.failure_threshold = 3;
        monitor.interval_seconds = 60;
        scheduler.reload_monitors(vec![monitor]);

        // Without threading the classifier's counters through, this would
        // read the stale consecutive_failures=0 cached at reload time and
        // never halve the interval.
        scheduler.mark_idle("m1", MonitorStatus::Down, 3, 0, Utc::now());

        let (queue, _rx) = DispatchQueue::bounded(64);
        let dropped = scheduler.tick(Utc::now() + chrono::Duration::seconds(31), &queue);
        assert_eq!(dropped, 0, "halved ~30s interval should already be due");
    }

    #[test]
    fn resend_nth_round_trips_through_set_and_reset() {
        let scheduler = Scheduler::new(Config::from_env());
        scheduler.reload_monitors(vec![test_monitor("m1")]);
        assert_eq!(scheduler.last_resend_nth("m1"), None);

        scheduler.set_last_resend_nth("m1", 3);
        assert_eq!(scheduler.last_resend_nth("m1"), Some(3));

        scheduler.reset_resend("m1");
        assert_eq!(scheduler.last_resend_nth("m1"), None);
    }
}
