//! Heartbeat supervisor. Passive monitors never get scheduled or probed —
//! instead a client pings `/api/v1/heartbeat/{token}` on its own cadence,
//! and this module sweeps periodically for pings that never arrived.
//! Grounded on spec.md §4.7; no teacher precedent (the teacher has no
//! passive-monitor concept), built in the same "race a periodic tick
//! against shared state" shape as `scheduler.rs`.

use crate::auth::tokens_match;
use crate::metrics::Metrics;
use crate::models::{now_str, CheckResult, Heartbeat, HeartbeatStatus, Monitor, MonitorStatus};
use crate::notifications::Dispatcher;
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::workers::process_check_result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct Supervisor {
    handle: tokio::task::JoinHandle<()>,
}

impl Supervisor {
    pub fn spawn(
        interval_seconds: u32,
        store: Arc<dyn Store>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1) as u64));
            loop {
                ticker.tick().await;
                sweep(&store, &scheduler, &dispatcher, &metrics).await;
            }
        });
        Supervisor { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

/// Checks every heartbeat monitor's last ping against `interval_seconds +
/// grace_seconds`. A monitor that never pinged is judged against its own
/// `created_at` via `last_checked_at` — if neither is set it's treated as
/// freshly created and left alone until its first deadline passes.
async fn sweep(store: &Arc<dyn Store>, scheduler: &Arc<Scheduler>, dispatcher: &Arc<Dispatcher>, metrics: &Arc<Metrics>) {
    let monitors = match store.list_heartbeat_monitors().await {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("❌ Heartbeat supervisor: failed to list heartbeat monitors: {e}");
            return;
        }
    };

    let now = chrono::Utc::now();
    for (monitor, heartbeat) in monitors {
        if heartbeat.status == HeartbeatStatus::Down {
            continue;
        }
        let Some(deadline) = deadline_for(&monitor, &heartbeat) else { continue };
        if now < deadline {
            continue;
        }

        if let Err(e) = store.update_heartbeat(&monitor.id, HeartbeatStatus::Down, &heartbeat.last_ping_at.clone().unwrap_or_else(now_str)).await {
            eprintln!("❌ Heartbeat supervisor: failed to mark {} down: {e}", monitor.id);
            continue;
        }

        let result = CheckResult {
            id: Uuid::new_v4().to_string(),
            monitor_id: monitor.id.clone(),
            checked_at: now_str(),
            status: MonitorStatus::Down,
            response_time_ms: 0,
            status_code: None,
            error_message: Some("no heartbeat ping received within interval + grace period".into()),
            cert_expiry: None,
            dns_records: None,
            content_hash: None,
            raw_body_sample: None,
        };
        let outcome = process_check_result(store, dispatcher, metrics, scheduler, &monitor, result).await;
        eprintln!("💔 Heartbeat supervisor: {} missed its deadline, now {}", monitor.id, outcome.status);
    }
}

fn deadline_for(monitor: &Monitor, heartbeat: &Heartbeat) -> Option<chrono::DateTime<chrono::Utc>> {
    let basis = heartbeat.last_ping_at.as_deref().or(monitor.last_checked_at.as_deref()).unwrap_or(&monitor.created_at);
    let basis = chrono::NaiveDateTime::parse_from_str(basis, "%Y-%m-%dT%H:%M:%SZ").ok()?;
    let basis = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(basis, chrono::Utc);
    Some(basis + chrono::Duration::seconds((monitor.interval_seconds + heartbeat.grace_seconds) as i64))
}

/// Records an inbound ping and, if the monitor was previously `down`,
/// feeds a synthetic `up` result through the same classify/incident/notify
/// pipeline the worker pool uses so a recovery closes its incident.
pub async fn process_ping(
    store: &Arc<dyn Store>,
    scheduler: &Arc<Scheduler>,
    dispatcher: &Arc<Dispatcher>,
    metrics: &Arc<Metrics>,
    monitor: &Monitor,
    heartbeat: &Heartbeat,
    presented_token: &str,
) -> Result<MonitorStatus, &'static str> {
    if !tokens_match(presented_token, &heartbeat.token) {
        return Err("token mismatch");
    }

    let at = now_str();
    if let Err(e) = store.update_heartbeat(&monitor.id, HeartbeatStatus::Up, &at).await {
        eprintln!("❌ Heartbeat supervisor: failed to record ping for {}: {e}", monitor.id);
        return Err("store error");
    }

    let result = CheckResult {
        id: Uuid::new_v4().to_string(),
        monitor_id: monitor.id.clone(),
        checked_at: at,
        status: MonitorStatus::Up,
        response_time_ms: 0,
        status_code: None,
        error_message: None,
        cert_expiry: None,
        dns_records: None,
        content_hash: None,
        raw_body_sample: None,
    };
    Ok(process_check_result(store, dispatcher, metrics, scheduler, monitor, result).await.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonitorType;

    fn base_monitor(created_at: &str) -> Monitor {
        Monitor {
            id: "m1".into(),
            name: "heartbeat".into(),
            monitor_type: MonitorType::Heartbeat,
            target: String::new(),
            interval_seconds: 60,
            timeout_seconds: 10,
            enabled: true,
            settings: serde_json::json!({}),
            assertions: serde_json::json!([]),
            track_changes: false,
            failure_threshold: 1,
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
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn deadline_falls_back_to_created_at_when_never_pinged() {
        let monitor = base_monitor("2026-01-01T00:00:00Z");
        let heartbeat = Heartbeat { monitor_id: "m1".into(), token: "hb_x".into(), grace_seconds: 30, status: HeartbeatStatus::Pending, last_ping_at: None };
        let deadline = deadline_for(&monitor, &heartbeat).unwrap();
        assert_eq!(deadline, chrono::DateTime::parse_from_rfc3339("2026-01-01T00:01:30+00:00").unwrap());
    }

    #[test]
    fn deadline_prefers_last_ping_over_created_at() {
        let monitor = base_monitor("2026-01-01T00:00:00Z");
        let heartbeat = Heartbeat {
            monitor_id: "m1".into(),
            token: "hb_x".into(),
            grace_seconds: 10,
            status: HeartbeatStatus::Up,
            last_ping_at: Some("2026-01-02T00:00:00Z".into()),
        };
        let deadline = deadline_for(&monitor, &heartbeat).unwrap();
        assert_eq!(deadline, chrono::DateTime::parse_from_rfc3339("2026-01-02T00:01:10+00:00").unwrap());
    }
}
