//! Worker pool. Consumes `Job`s from the dispatch queue, applies the
//! maintenance gate, runs the probe, persists the result, and feeds the
//! classifier + incident machine + notification dispatcher. Grounded on
//! `checker::run_checker`'s per-check body, split out into a pool of
//! uniform tasks instead of the teacher's single serial loop.

use crate::classifier::{classify, detect_content_change, ClassifierEvent};
use crate::incidents;
use crate::maintenance;
use crate::metrics::Metrics;
use crate::models::{now_str, CheckResult, EventType, Monitor, MonitorStatus};
use crate::notifications::{Dispatcher, NotificationPayload};
use crate::probes::{self, ProbeContext};
use crate::queue::DispatchReceiver;
use crate::scheduler::Scheduler;
use crate::store::Store;
use std::sync::Arc;
use uuid::Uuid;

/// What a check cycle produced, carried from `process_check_result` back
/// into the scheduler so adaptive-interval adjustment sees the same
/// counters the classifier just computed rather than a stale cached copy.
#[derive(Debug, Clone, Copy)]
pub struct CheckOutcome {
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        count: usize,
        receiver: Arc<tokio::sync::Mutex<DispatchReceiver>>,
        store: Arc<dyn Store>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        ctx: Arc<ProbeContext>,
    ) -> Self {
        let mut handles = Vec::with_capacity(count);
        for worker_id in 0..count {
            let receiver = receiver.clone();
            let store = store.clone();
            let scheduler = scheduler.clone();
            let dispatcher = dispatcher.clone();
            let metrics = metrics.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };
                    scheduler.mark_running(&job.monitor.id);
                    let outcome = handle_job(&store, &dispatcher, &metrics, &ctx, &scheduler, &job.monitor).await;
                    scheduler.mark_idle(
                        &job.monitor.id,
                        outcome.status,
                        outcome.consecutive_failures,
                        outcome.consecutive_successes,
                        chrono::Utc::now(),
                    );
                }
                eprintln!("🛑 Worker {worker_id}: shutting down");
            }));
        }
        WorkerPool { handles }
    }

    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn handle_job(
    store: &Arc<dyn Store>,
    dispatcher: &Arc<Dispatcher>,
    metrics: &Arc<Metrics>,
    ctx: &ProbeContext,
    scheduler: &Arc<Scheduler>,
    monitor: &Monitor,
) -> CheckOutcome {
    let at = now_str();
    let windows = store.list_active_maintenance_windows(&at).await.unwrap_or_default();
    if maintenance::is_suppressed(&windows, &monitor.id, &at) {
        let result = CheckResult {
            id: Uuid::new_v4().to_string(),
            monitor_id: monitor.id.clone(),
            checked_at: at,
            status: MonitorStatus::Up,
            response_time_ms: 0,
            status_code: None,
            error_message: Some("maintenance".into()),
            cert_expiry: None,
            dns_records: None,
            content_hash: None,
            raw_body_sample: None,
        };
        if let Err(e) = store.create_check_result(&result).await {
            eprintln!("❌ Worker: failed to persist maintenance check result for {}: {e}", monitor.id);
        }
        return CheckOutcome {
            status: monitor.status,
            consecutive_failures: monitor.consecutive_failures,
            consecutive_successes: monitor.consecutive_successes,
        };
    }

    let result = run_probe_catching_panics(ctx, monitor).await;
    process_check_result(store, dispatcher, metrics, scheduler, monitor, result).await
}

/// Runs the probe with a panic guard: a panic inside a probe is caught,
/// logged, and converted to `status=down`. Spawning the probe as its own
/// task lets us rely on tokio's own panic-catching at the `JoinHandle`
/// boundary instead of hand-rolling `catch_unwind` over a non-`UnwindSafe`
/// future.
async fn run_probe_catching_panics(ctx: &ProbeContext, monitor: &Monitor) -> CheckResult {
    let monitor_clone = monitor.clone();
    let ctx_clone = ctx.clone();
    let handle = tokio::spawn(async move { probes::probe(&ctx_clone, &monitor_clone).await });

    match handle.await {
        Ok(mut result) => {
            if monitor.upside_down {
                invert(&mut result);
            }
            result
        }
        Err(join_err) => {
            eprintln!("❌ Worker: probe panicked for monitor {}: {join_err}", monitor.id);
            CheckResult {
                id: Uuid::new_v4().to_string(),
                monitor_id: monitor.id.clone(),
                checked_at: now_str(),
                status: MonitorStatus::Down,
                response_time_ms: 0,
                status_code: None,
                error_message: Some("internal probe failure".into()),
                cert_expiry: None,
                dns_records: None,
                content_hash: None,
                raw_body_sample: None,
            }
        }
    }
}

/// Swaps up/down in the final result; degraded is left unchanged.
fn invert(result: &mut CheckResult) {
    result.status = match result.status {
        MonitorStatus::Up => MonitorStatus::Down,
        MonitorStatus::Down => MonitorStatus::Up,
        other => other,
    };
}

/// Shared by the worker pool and the heartbeat supervisor: persist the
/// result, run it through the classifier, update incident state, and
/// enqueue notifications. Returns the resulting counters so the caller can
/// feed the scheduler's adaptive-interval logic.
pub async fn process_check_result(
    store: &Arc<dyn Store>,
    dispatcher: &Arc<Dispatcher>,
    metrics: &Arc<Metrics>,
    scheduler: &Arc<Scheduler>,
    monitor: &Monitor,
    result: CheckResult,
) -> CheckOutcome {
    let unchanged = CheckOutcome {
        status: monitor.status,
        consecutive_failures: monitor.consecutive_failures,
        consecutive_successes: monitor.consecutive_successes,
    };

    if monitor.track_changes {
        let previous_hash = scheduler.previous_content_hash(&monitor.id);
        if let Some(ClassifierEvent::ContentChanged { old_hash, new_hash }) = detect_content_change(previous_hash.as_deref(), &result) {
            dispatcher.submit(
                metrics,
                NotificationPayload {
                    event_type: EventType::ContentChanged,
                    monitor: monitor.clone(),
                    incident: None,
                    content_change: Some((old_hash, new_hash)),
                },
            );
        }
        if let Some(hash) = &result.content_hash {
            scheduler.set_content_hash(&monitor.id, hash.clone());
        }
    }

    let outcome = classify(monitor, &result);

    // Single transaction: the result row and the monitor's counters/status
    // land together or not at all, so a failed update never leaves a check
    // result committed against stale counters.
    if let Err(e) = store
        .record_check_transition(&result, outcome.new_status, outcome.consecutive_failures, outcome.consecutive_successes)
        .await
    {
        eprintln!("❌ Worker: failed to persist check transition for {}: {e}", monitor.id);
        return unchanged;
    }

    if let Some(event) = outcome.event {
        handle_classifier_event(store, scheduler, dispatcher, metrics, monitor, event).await;
    }

    CheckOutcome {
        status: outcome.new_status,
        consecutive_failures: outcome.consecutive_failures,
        consecutive_successes: outcome.consecutive_successes,
    }
}

async fn handle_classifier_event(
    store: &Arc<dyn Store>,
    scheduler: &Arc<Scheduler>,
    dispatcher: &Arc<Dispatcher>,
    metrics: &Arc<Metrics>,
    monitor: &Monitor,
    event: ClassifierEvent,
) {
    match event {
        ClassifierEvent::IncidentCreated { cause } => match incidents::open(store.as_ref(), &monitor.id, &cause).await {
            Ok(incident) => {
                // Fresh incident: the resend count tracked on the scheduler
                // belongs to whatever incident was previously open.
                scheduler.reset_resend(&monitor.id);
                dispatcher.submit(
                    metrics,
                    NotificationPayload { event_type: EventType::IncidentCreated, monitor: monitor.clone(), incident: Some(incident), content_change: None },
                );
            }
            Err(e) => eprintln!("❌ Worker: failed to open incident for {}: {e}", monitor.id),
        },
        ClassifierEvent::IncidentResolved => {
            // The classifier only emits this transitioning down -> up, so the
            // incident-uniqueness invariant guarantees one is already open;
            // `open_incident_if_none` here is a get, never a create.
            match store.open_incident_if_none(&monitor.id, "").await {
                Ok((incident, _)) => {
                    if let Err(e) = incidents::resolve_auto(store.as_ref(), &incident).await {
                        eprintln!("❌ Worker: failed to resolve incident for {}: {e}", monitor.id);
                    }
                    scheduler.reset_resend(&monitor.id);
                    dispatcher.submit(
                        metrics,
                        NotificationPayload { event_type: EventType::IncidentResolved, monitor: monitor.clone(), incident: Some(incident), content_change: None },
                    );
                }
                Err(e) => eprintln!("❌ Worker: failed to look up incident to resolve for {}: {e}", monitor.id),
            }
        }
        ClassifierEvent::ContentChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_status(status: MonitorStatus) -> CheckResult {
        CheckResult {
            id: "r1".into(),
            monitor_id: "m1".into(),
            checked_at: now_str(),
            status,
            response_time_ms: 12,
            status_code: Some(200),
            error_message: None,
            cert_expiry: None,
            dns_records: None,
            content_hash: None,
            raw_body_sample: None,
        }
    }

    #[test]
    fn invert_swaps_up_and_down() {
        let mut up = result_with_status(MonitorStatus::Up);
        invert(&mut up);
        assert_eq!(up.status, MonitorStatus::Down);

        let mut down = result_with_status(MonitorStatus::Down);
        invert(&mut down);
        assert_eq!(down.status, MonitorStatus::Up);
    }

    #[test]
    fn invert_leaves_degraded_unchanged() {
        let mut degraded = result_with_status(MonitorStatus::Degraded);
        invert(&mut degraded);
        assert_eq!(degraded.status, MonitorStatus::Degraded);
    }

    #[test]
    fn invert_is_its_own_inverse() {
        let mut result = result_with_status(MonitorStatus::Up);
        invert(&mut result);
        invert(&mut result);
        assert_eq!(result.status, MonitorStatus::Up);
    }
}
