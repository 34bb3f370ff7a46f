//! Result classifier. Grounded on `checker::process_check_result`'s
//! counter-update and transition logic, generalized to the full
//! `{up, down, degraded, pending}` status set with separate
//! `failure_threshold`/`success_threshold` counters (the teacher conflates
//! both into one `confirmation_threshold`).

use crate::models::{CheckResult, Monitor, MonitorStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierEvent {
    IncidentCreated { cause: String },
    IncidentResolved,
    ContentChanged { old_hash: String, new_hash: String },
}

#[derive(Debug, Clone)]
pub struct ClassifierOutcome {
    pub new_status: MonitorStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub event: Option<ClassifierEvent>,
}

/// Pure function: `(previous_monitor_state, CheckResult) -> (new_monitor_state, event?)`.
/// Does not touch the store — callers persist the outcome atomically with
/// the check-result insert.
pub fn classify(monitor: &Monitor, result: &CheckResult) -> ClassifierOutcome {
    let f = monitor.failure_threshold.max(1);
    let s = monitor.success_threshold.max(1);

    let (mut consec_fails, mut consec_successes) = (monitor.consecutive_failures, monitor.consecutive_successes);

    match result.status {
        MonitorStatus::Up => {
            consec_successes += 1;
            consec_fails = 0;
        }
        MonitorStatus::Down => {
            consec_fails += 1;
            consec_successes = 0;
        }
        MonitorStatus::Degraded | MonitorStatus::Pending => {}
    }

    let mut event = None;
    let new_status = match (monitor.status, result.status) {
        (MonitorStatus::Down, MonitorStatus::Up) if consec_successes >= s => {
            event = Some(ClassifierEvent::IncidentResolved);
            MonitorStatus::Up
        }
        (MonitorStatus::Up | MonitorStatus::Pending | MonitorStatus::Degraded, MonitorStatus::Down) if consec_fails >= f => {
            let cause = result.error_message.clone().unwrap_or_else(|| "check failed".to_string());
            event = Some(ClassifierEvent::IncidentCreated { cause });
            MonitorStatus::Down
        }
        (_, MonitorStatus::Degraded) => MonitorStatus::Degraded,
        (current, _) => current,
    };

    ClassifierOutcome { new_status, consecutive_failures: consec_fails, consecutive_successes: consec_successes, event }
}

/// Content-change detection for `track_changes=true` HTTP monitors. Not an
/// incident; emitted independently of the up/down transition above.
pub fn detect_content_change(previous_hash: Option<&str>, result: &CheckResult) -> Option<ClassifierEvent> {
    let new_hash = result.content_hash.as_deref()?;
    let old_hash = previous_hash?;
    if old_hash != new_hash {
        Some(ClassifierEvent::ContentChanged { old_hash: old_hash.to_string(), new_hash: new_hash.to_string() })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_str, MonitorType};

    fn base_monitor() -> Monitor {
        Monitor {
            id: "m1".into(),
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
            success_threshold: 2,
            upside_down: false,
            resend_interval: 0,
            group_id: None,
            proxy_id: None,
            tags: vec![],
            status: MonitorStatus::Up,
            consecutive_failures: 0,
            consecutive_successes: 5,
            last_checked_at: None,
            notification_channel_ids: vec![],
            created_at: now_str(),
            updated_at: now_str(),
        }
    }

    fn down_result(monitor_id: &str) -> CheckResult {
        CheckResult {
            id: "r1".into(),
            monitor_id: monitor_id.into(),
            checked_at: now_str(),
            status: MonitorStatus::Down,
            response_time_ms: 0,
            status_code: None,
            error_message: Some("connection refused".into()),
            cert_expiry: None,
            dns_records: None,
            content_hash: None,
            raw_body_sample: None,
        }
    }

    #[test]
    fn stays_up_below_failure_threshold() {
        let mut monitor = base_monitor();
        monitor.consecutive_failures = 1;
        let outcome = classify(&monitor, &down_result("m1"));
        assert_eq!(outcome.consecutive_failures, 2);
        assert_eq!(outcome.new_status, MonitorStatus::Up);
        assert!(outcome.event.is_none());
    }

    #[test]
    fn opens_incident_at_failure_threshold() {
        let mut monitor = base_monitor();
        monitor.consecutive_failures = 2;
        let outcome = classify(&monitor, &down_result("m1"));
        assert_eq!(outcome.consecutive_failures, 3);
        assert_eq!(outcome.new_status, MonitorStatus::Down);
        assert!(matches!(outcome.event, Some(ClassifierEvent::IncidentCreated { .. })));
    }

    #[test]
    fn resolves_incident_at_success_threshold() {
        let mut monitor = base_monitor();
        monitor.status = MonitorStatus::Down;
        monitor.consecutive_successes = 1;
        let mut up = down_result("m1");
        up.status = MonitorStatus::Up;
        let outcome = classify(&monitor, &up);
        assert_eq!(outcome.consecutive_successes, 2);
        assert_eq!(outcome.new_status, MonitorStatus::Up);
        assert_eq!(outcome.event, Some(ClassifierEvent::IncidentResolved));
    }

    #[test]
    fn single_success_below_threshold_does_not_resolve() {
        let mut monitor = base_monitor();
        monitor.status = MonitorStatus::Down;
        monitor.consecutive_successes = 0;
        let mut up = down_result("m1");
        up.status = MonitorStatus::Up;
        let outcome = classify(&monitor, &up);
        assert_eq!(outcome.consecutive_successes, 1);
        assert_eq!(outcome.new_status, MonitorStatus::Down);
        assert!(outcome.event.is_none());
    }

    #[test]
    fn content_change_detected() {
        let mut result = down_result("m1");
        result.status = MonitorStatus::Up;
        result.content_hash = Some("abc".into());
        let event = detect_content_change(Some("xyz"), &result);
        assert!(matches!(event, Some(ClassifierEvent::ContentChanged { .. })));
        assert!(detect_content_change(Some("abc"), &result).is_none());
    }
}
