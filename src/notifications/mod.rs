//! Notification dispatcher. Grounded on `notifications::fire_webhooks` plus
//! `checker::process_repeat_notifications`'s repeat/escalation timing and
//! `routes/webhook_deliveries.rs`'s delivery-history row shape
//! (attempt/status/latency), generalized to a bounded channel fanning out
//! to every enabled channel per spec.md §4.6.

mod discord;
mod email;
mod ntfy;
mod slack;
mod telegram;
mod webhook;

use crate::metrics::Metrics;
use crate::models::{
    now_str, ChannelType, DeliveryStatus, EventType, Incident, Monitor, NotificationChannel, NotificationHistoryRow,
};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The event fed into the dispatcher; mirrors spec.md §4.6's
/// `Payload{event_type, incident?, monitor?, change?}`.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub event_type: EventType,
    pub monitor: Monitor,
    pub incident: Option<Incident>,
    pub content_change: Option<(String, String)>,
}

const BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(25)];
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Dispatcher {
    tx: mpsc::Sender<NotificationPayload>,
}

impl Dispatcher {
    /// Spawns the fan-out coroutine and returns a handle to submit payloads.
    /// Channel capacity ~1024 per spec.md §4.6.
    pub fn spawn(store: Arc<dyn Store>, metrics: Arc<Metrics>, http: reqwest::Client, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotificationPayload>(capacity);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                fan_out(&store, &http, payload).await;
            }
        });
        Dispatcher { tx }
    }

    /// Never blocks: a full channel increments `dropped_notifications_total`
    /// and drops the event — monitoring must never stall on delivery.
    pub fn submit(&self, metrics: &Metrics, payload: NotificationPayload) {
        if self.tx.try_send(payload).is_err() {
            metrics.record_dropped_notification();
            eprintln!("⚠️  Dispatcher: notification channel full, dropping event");
        }
    }
}

async fn fan_out(store: &Arc<dyn Store>, http: &reqwest::Client, payload: NotificationPayload) {
    let channels = match store.list_enabled_channels_for_event(payload.event_type).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Dispatcher: failed to list channels: {e}");
            return;
        }
    };

    for channel in channels {
        deliver_with_retry(store, http, &channel, &payload).await;
    }
}

async fn deliver_with_retry(store: &Arc<dyn Store>, http: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(DELIVERY_TIMEOUT, deliver_once(http, channel, payload)).await;
        let latency_ms = started.elapsed().as_millis() as u32;

        let outcome = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err("delivery timed out".to_string()),
        };

        match outcome {
            Ok(()) => {
                record_history(store, channel, payload, DeliveryStatus::Sent, attempt, Some(latency_ms), None).await;
                return;
            }
            Err(err) if (attempt as usize) < BACKOFF.len() => {
                eprintln!("⚠️  Dispatcher: channel {} delivery attempt {attempt} failed: {err}", channel.id);
                tokio::time::sleep(BACKOFF[(attempt - 1) as usize]).await;
            }
            Err(err) => {
                record_history(store, channel, payload, DeliveryStatus::Failed, attempt, None, Some(err)).await;
                return;
            }
        }
    }
}

async fn deliver_once(http: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    match channel.channel_type {
        ChannelType::Webhook => webhook::send(http, channel, payload).await,
        ChannelType::Email => email::send(channel, payload).await,
        ChannelType::Telegram => telegram::send(http, channel, payload).await,
        ChannelType::Discord => discord::send(http, channel, payload).await,
        ChannelType::Slack => slack::send(http, channel, payload).await,
        ChannelType::Ntfy => ntfy::send(http, channel, payload).await,
    }
}

async fn record_history(
    store: &Arc<dyn Store>,
    channel: &NotificationChannel,
    payload: &NotificationPayload,
    status: DeliveryStatus,
    attempt: u32,
    latency_ms: Option<u32>,
    error_message: Option<String>,
) {
    let row = NotificationHistoryRow {
        id: Uuid::new_v4().to_string(),
        channel_id: channel.id.clone(),
        monitor_id: payload.monitor.id.clone(),
        incident_id: payload.incident.as_ref().map(|i| i.id.clone()),
        event_type: payload.event_type,
        status,
        attempt,
        latency_ms,
        error_message,
        sent_at: now_str(),
    };
    if let Err(e) = store.insert_notification_history(&row).await {
        eprintln!("❌ Dispatcher: failed to record notification history: {e}");
    }
}

/// Builds the base JSON body shared by webhook/ntfy-style channels —
/// generalizes the teacher's `WebhookPayload`/`WebhookMonitor`/
/// `WebhookIncident` shape to the richer event set.
pub(crate) fn event_json(payload: &NotificationPayload) -> serde_json::Value {
    serde_json::json!({
        "event": payload.event_type.as_str(),
        "monitor": {
            "id": payload.monitor.id,
            "name": payload.monitor.name,
            "target": payload.monitor.target,
            "status": payload.monitor.status.as_str(),
        },
        "incident": payload.incident.as_ref().map(|i| serde_json::json!({
            "id": i.id,
            "cause": i.cause,
            "started_at": i.started_at,
            "resolved_at": i.resolved_at,
        })),
        "timestamp": now_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::models::{MonitorStatus, MonitorType};
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_db_path() -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("asura_dispatch_test_{n}_{}.db", std::process::id())).to_string_lossy().to_string()
    }

    fn test_monitor() -> Monitor {
        Monitor {
            id: "m1".into(),
            name: "m1".into(),
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
            status: MonitorStatus::Down,
            consecutive_failures: 3,
            consecutive_successes: 0,
            last_checked_at: None,
            notification_channel_ids: vec![],
            created_at: now_str(),
            updated_at: now_str(),
        }
    }

    /// Two channels exist; only one is subscribed to `incident.created`.
    /// Neither has a `settings.url`, so delivery fails immediately without
    /// touching the network — `deliver_with_retry` still burns through all
    /// three backoff attempts before recording `failed`, which the paused
    /// clock collapses to instant.
    #[tokio::test(start_paused = true)]
    async fn fan_out_only_delivers_to_channels_subscribed_to_the_event() {
        let path = temp_db_path();
        let db = Db::new(&path).unwrap();
        db.conn()
            .execute(
                "INSERT INTO notification_channels (id, name, channel_type, enabled, settings, events)
                 VALUES ('c1', 'subscribed', 'webhook', 1, '{}', '[\"incident.created\"]')",
                [],
            )
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO notification_channels (id, name, channel_type, enabled, settings, events)
                 VALUES ('c2', 'unsubscribed', 'webhook', 1, '{}', '[\"incident.resolved\"]')",
                [],
            )
            .unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(db));
        let http = reqwest::Client::new();

        let payload = NotificationPayload {
            event_type: EventType::IncidentCreated,
            monitor: test_monitor(),
            incident: None,
            content_change: None,
        };
        fan_out(&store, &http, payload).await;

        let verify = Db::new(&path).unwrap();
        let conn = verify.conn();
        let rows: Vec<(String, String, i64)> = conn
            .prepare("SELECT channel_id, status, attempt FROM notification_history")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert_eq!(rows.len(), 1, "only the subscribed channel should have attempted delivery");
        assert_eq!(rows[0].0, "c1");
        assert_eq!(rows[0].1, "failed");
        assert_eq!(rows[0].2, 3, "all backoff attempts exhausted before giving up");
    }
}
