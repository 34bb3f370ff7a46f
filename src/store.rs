use crate::models::*;
use rusqlite::{params, OptionalExtension};
use std::fmt;

use crate::db::Db;

/// Error taxonomy for the store boundary. Kept as a plain enum with a
/// `Display` impl, matching the teacher's choice to hand-roll error
/// tuples rather than pull in `thiserror`.
#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Serialization(String),
    Fatal(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::Serialization(msg) => write!(f, "serialization conflict: {msg}"),
            StoreError::Fatal(msg) => write!(f, "store fatal: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::DatabaseBusy => {
                StoreError::Serialization(e.to_string())
            }
            other => StoreError::Fatal(other.to_string()),
        }
    }
}

/// The abstract repository the pipeline and probes depend on — never
/// SQLite directly. One concrete impl (`SqliteStore`) today, but the
/// trait boundary is what lets the pipeline stay storage-agnostic.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn create_check_result(&self, result: &CheckResult) -> Result<(), StoreError>;
    async fn update_monitor_after_check(
        &self,
        monitor_id: &str,
        status: MonitorStatus,
        consecutive_failures: u32,
        consecutive_successes: u32,
        last_checked_at: &str,
    ) -> Result<(), StoreError>;
    /// The result row insert and the monitor counter/status update, committed
    /// as one transaction: a failure partway rolls back both rather than
    /// leaving a check result persisted against stale counters.
    async fn record_check_transition(
        &self,
        result: &CheckResult,
        new_status: MonitorStatus,
        consecutive_failures: u32,
        consecutive_successes: u32,
    ) -> Result<(), StoreError>;
    async fn list_enabled_monitors(&self) -> Result<Vec<Monitor>, StoreError>;
    async fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError>;
    /// Returns the open/acknowledged incident for this monitor, creating one
    /// if none exists. `created` tells the caller whether this is new.
    async fn open_incident_if_none(&self, monitor_id: &str, cause: &str) -> Result<(Incident, bool), StoreError>;
    async fn transition_incident(
        &self,
        id: &str,
        new_status: IncidentStatus,
        actor: Option<&str>,
        at: &str,
    ) -> Result<(), StoreError>;
    async fn append_incident_event(&self, event: &IncidentEvent) -> Result<(), StoreError>;
    async fn list_active_maintenance_windows(&self, at: &str) -> Result<Vec<MaintenanceWindow>, StoreError>;
    async fn list_heartbeat_monitors(&self) -> Result<Vec<(Monitor, Heartbeat)>, StoreError>;
    async fn update_heartbeat(&self, monitor_id: &str, status: HeartbeatStatus, last_ping_at: &str) -> Result<(), StoreError>;
    async fn list_enabled_channels_for_event(&self, event_type: EventType) -> Result<Vec<NotificationChannel>, StoreError>;
    async fn insert_notification_history(&self, row: &NotificationHistoryRow) -> Result<(), StoreError>;
}

/// The one concrete `Store` impl, wrapping `rusqlite` behind a mutex —
/// the same "single connection, single writer" shape as the teacher's
/// `Db`.
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        SqliteStore { db }
    }

    fn row_to_monitor(row: &rusqlite::Row) -> rusqlite::Result<Monitor> {
        let tags_raw: String = row.get("tags")?;
        let settings_raw: String = row.get("settings")?;
        let assertions_raw: String = row.get("assertions")?;
        let monitor_type_raw: String = row.get("monitor_type")?;
        let status_raw: String = row.get("status")?;
        Ok(Monitor {
            id: row.get("id")?,
            name: row.get("name")?,
            monitor_type: MonitorType::parse(&monitor_type_raw).unwrap_or(MonitorType::Http),
            target: row.get("target")?,
            interval_seconds: row.get("interval_seconds")?,
            timeout_seconds: row.get("timeout_seconds")?,
            enabled: row.get::<_, i64>("enabled")? != 0,
            settings: serde_json::from_str(&settings_raw).unwrap_or(serde_json::json!({})),
            assertions: serde_json::from_str(&assertions_raw).unwrap_or(serde_json::json!([])),
            track_changes: row.get::<_, i64>("track_changes")? != 0,
            failure_threshold: row.get("failure_threshold")?,
            success_threshold: row.get("success_threshold")?,
            upside_down: row.get::<_, i64>("upside_down")? != 0,
            resend_interval: row.get("resend_interval")?,
            group_id: row.get("group_id")?,
            proxy_id: row.get("proxy_id")?,
            tags: if tags_raw.is_empty() { vec![] } else { tags_raw.split(',').map(|s| s.to_string()).collect() },
            status: MonitorStatus::parse(&status_raw),
            consecutive_failures: row.get("consecutive_failures")?,
            consecutive_successes: row.get("consecutive_successes")?,
            last_checked_at: row.get("last_checked_at")?,
            notification_channel_ids: vec![],
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn attach_channel_ids(&self, conn: &rusqlite::Connection, monitor: &mut Monitor) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare("SELECT channel_id FROM monitor_channels WHERE monitor_id = ?1")?;
        let ids: Vec<String> = stmt.query_map(params![monitor.id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
        monitor.notification_channel_ids = ids;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn create_check_result(&self, result: &CheckResult) -> Result<(), StoreError> {
        let conn = self.db.conn();
        let dns_records = result.dns_records.as_ref().map(|v| v.to_string());
        conn.execute(
            "INSERT INTO check_results
                (id, monitor_id, checked_at, status, response_time_ms, status_code, error_message,
                 cert_expiry, dns_records, content_hash, raw_body_sample, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM check_results))",
            params![
                result.id,
                result.monitor_id,
                result.checked_at,
                result.status.as_str(),
                result.response_time_ms,
                result.status_code,
                result.error_message,
                result.cert_expiry,
                dns_records,
                result.content_hash,
                result.raw_body_sample,
            ],
        )?;
        Ok(())
    }

    async fn update_monitor_after_check(
        &self,
        monitor_id: &str,
        status: MonitorStatus,
        consecutive_failures: u32,
        consecutive_successes: u32,
        last_checked_at: &str,
    ) -> Result<(), StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE monitors SET status = ?1, consecutive_failures = ?2, consecutive_successes = ?3,
                last_checked_at = ?4, updated_at = ?4 WHERE id = ?5",
            params![status.as_str(), consecutive_failures, consecutive_successes, last_checked_at, monitor_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_check_transition(
        &self,
        result: &CheckResult,
        new_status: MonitorStatus,
        consecutive_failures: u32,
        consecutive_successes: u32,
    ) -> Result<(), StoreError> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        let dns_records = result.dns_records.as_ref().map(|v| v.to_string());
        tx.execute(
            "INSERT INTO check_results
                (id, monitor_id, checked_at, status, response_time_ms, status_code, error_message,
                 cert_expiry, dns_records, content_hash, raw_body_sample, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM check_results))",
            params![
                result.id,
                result.monitor_id,
                result.checked_at,
                result.status.as_str(),
                result.response_time_ms,
                result.status_code,
                result.error_message,
                result.cert_expiry,
                dns_records,
                result.content_hash,
                result.raw_body_sample,
            ],
        )?;
        let changed = tx.execute(
            "UPDATE monitors SET status = ?1, consecutive_failures = ?2, consecutive_successes = ?3,
                last_checked_at = ?4, updated_at = ?4 WHERE id = ?5",
            params![new_status.as_str(), consecutive_failures, consecutive_successes, result.checked_at, result.monitor_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_enabled_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT * FROM monitors WHERE enabled = 1")?;
        let mut monitors: Vec<Monitor> = stmt
            .query_map([], |row| Self::row_to_monitor(row))?
            .filter_map(|r| r.ok())
            .collect();
        for m in monitors.iter_mut() {
            self.attach_channel_ids(&conn, m)?;
        }
        Ok(monitors)
    }

    async fn get_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        let conn = self.db.conn();
        let mut monitor = conn
            .query_row("SELECT * FROM monitors WHERE id = ?1", params![id], |row| Self::row_to_monitor(row))
            .optional()?
            .ok_or(StoreError::NotFound)?;
        self.attach_channel_ids(&conn, &mut monitor)?;
        Ok(monitor)
    }

    async fn open_incident_if_none(&self, monitor_id: &str, cause: &str) -> Result<(Incident, bool), StoreError> {
        let conn = self.db.conn();
        let existing = conn
            .query_row(
                "SELECT id, monitor_id, monitor_name, status, started_at, acknowledged_at, acknowledged_by,
                        resolved_at, resolved_by, cause, severity
                 FROM incidents WHERE monitor_id = ?1 AND status <> 'resolved'",
                params![monitor_id],
                Self::row_to_incident,
            )
            .optional()?;
        if let Some(incident) = existing {
            return Ok((incident, false));
        }

        let monitor_name: String = conn
            .query_row("SELECT name FROM monitors WHERE id = ?1", params![monitor_id], |r| r.get(0))
            .optional()?
            .ok_or(StoreError::NotFound)?;

        let id = uuid::Uuid::new_v4().to_string();
        let started_at = now_str();
        conn.execute(
            "INSERT INTO incidents (id, monitor_id, monitor_name, status, started_at, cause, severity, seq)
             VALUES (?1, ?2, ?3, 'open', ?4, ?5, 'critical', (SELECT COALESCE(MAX(seq), 0) + 1 FROM incidents))",
            params![id, monitor_id, monitor_name, started_at, cause],
        )?;

        let incident = Incident {
            id,
            monitor_id: monitor_id.to_string(),
            monitor_name,
            status: IncidentStatus::Open,
            started_at,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            cause: cause.to_string(),
            severity: "critical".to_string(),
        };
        Ok((incident, true))
    }

    async fn transition_incident(
        &self,
        id: &str,
        new_status: IncidentStatus,
        actor: Option<&str>,
        at: &str,
    ) -> Result<(), StoreError> {
        let conn = self.db.conn();
        let changed = match new_status {
            IncidentStatus::Acknowledged => conn.execute(
                "UPDATE incidents SET status = 'acknowledged', acknowledged_at = ?1, acknowledged_by = ?2 WHERE id = ?3",
                params![at, actor, id],
            )?,
            IncidentStatus::Resolved => conn.execute(
                "UPDATE incidents SET status = 'resolved', resolved_at = ?1, resolved_by = ?2 WHERE id = ?3",
                params![at, actor, id],
            )?,
            IncidentStatus::Open => conn.execute("UPDATE incidents SET status = 'open' WHERE id = ?1", params![id])?,
        };
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_incident_event(&self, event: &IncidentEvent) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO incident_events (id, incident_id, event_type, message, at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![event.id, event.incident_id, event.event_type.as_str(), event.message, event.at],
        )?;
        Ok(())
    }

    async fn list_active_maintenance_windows(&self, at: &str) -> Result<Vec<MaintenanceWindow>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT id, name, start_time, end_time, recurring FROM maintenance_windows")?;
        let windows: Vec<MaintenanceWindow> = stmt
            .query_map([], |row| {
                let id: String = row.get("id")?;
                Ok((id, row.get::<_, String>("name")?, row.get::<_, String>("start_time")?, row.get::<_, String>("end_time")?, row.get::<_, String>("recurring")?))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, _, start, end, recurring)| crate::maintenance::is_time_in_window(start, end, recurring, at))
            .map(|(id, name, start_time, end_time, recurring)| {
                let mut stmt2 = conn.prepare("SELECT monitor_id FROM maintenance_window_monitors WHERE window_id = ?1").unwrap();
                let monitor_ids: Vec<String> = stmt2.query_map(params![id], |r| r.get(0)).unwrap().filter_map(|r| r.ok()).collect();
                MaintenanceWindow { id, name, monitor_ids, start_time, end_time, recurring }
            })
            .collect();
        Ok(windows)
    }

    async fn list_heartbeat_monitors(&self) -> Result<Vec<(Monitor, Heartbeat)>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT m.*, h.token, h.grace_seconds, h.status as hb_status, h.last_ping_at
             FROM monitors m JOIN heartbeats h ON h.monitor_id = m.id
             WHERE m.enabled = 1 AND m.monitor_type = 'heartbeat'",
        )?;
        let rows: Vec<(Monitor, Heartbeat)> = stmt
            .query_map([], |row| {
                let monitor = Self::row_to_monitor(row)?;
                let hb_status_raw: String = row.get("hb_status")?;
                let heartbeat = Heartbeat {
                    monitor_id: monitor.id.clone(),
                    token: row.get("token")?,
                    grace_seconds: row.get("grace_seconds")?,
                    status: HeartbeatStatus::parse(&hb_status_raw),
                    last_ping_at: row.get("last_ping_at")?,
                };
                Ok((monitor, heartbeat))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn update_heartbeat(&self, monitor_id: &str, status: HeartbeatStatus, last_ping_at: &str) -> Result<(), StoreError> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE heartbeats SET status = ?1, last_ping_at = ?2 WHERE monitor_id = ?3",
            params![status.as_str(), last_ping_at, monitor_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_enabled_channels_for_event(&self, event_type: EventType) -> Result<Vec<NotificationChannel>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT id, name, channel_type, enabled, settings, events FROM notification_channels WHERE enabled = 1")?;
        let needle = event_type.as_str();
        let channels: Vec<NotificationChannel> = stmt
            .query_map([], |row| {
                let channel_type_raw: String = row.get("channel_type")?;
                let settings_raw: String = row.get("settings")?;
                let events_raw: String = row.get("events")?;
                Ok(NotificationChannel {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    channel_type: ChannelType::parse(&channel_type_raw).unwrap_or(ChannelType::Webhook),
                    enabled: row.get::<_, i64>("enabled")? != 0,
                    settings: serde_json::from_str(&settings_raw).unwrap_or(serde_json::json!({})),
                    events: serde_json::from_str::<Vec<String>>(&events_raw)
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|s| EventType::parse(s))
                        .collect(),
                })
            })?
            .filter_map(|r| r.ok())
            .filter(|c| c.events.iter().any(|e| e.as_str() == needle))
            .collect();
        Ok(channels)
    }

    async fn insert_notification_history(&self, row: &NotificationHistoryRow) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO notification_history
                (id, channel_id, monitor_id, incident_id, event_type, status, attempt, latency_ms, error_message, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.id,
                row.channel_id,
                row.monitor_id,
                row.incident_id,
                row.event_type.as_str(),
                row.status.as_str(),
                row.attempt,
                row.latency_ms,
                row.error_message,
                row.sent_at,
            ],
        )?;
        Ok(())
    }
}

impl SqliteStore {
    fn row_to_incident(row: &rusqlite::Row) -> rusqlite::Result<Incident> {
        let status_raw: String = row.get("status")?;
        Ok(Incident {
            id: row.get("id")?,
            monitor_id: row.get("monitor_id")?,
            monitor_name: row.get("monitor_name")?,
            status: IncidentStatus::parse(&status_raw),
            started_at: row.get("started_at")?,
            acknowledged_at: row.get("acknowledged_at")?,
            acknowledged_by: row.get("acknowledged_by")?,
            resolved_at: row.get("resolved_at")?,
            resolved_by: row.get("resolved_by")?,
            cause: row.get("cause")?,
            severity: row.get("severity")?,
        })
    }
}
