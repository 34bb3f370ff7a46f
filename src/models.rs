use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of endpoint a monitor probes. Stored as lowercase TEXT in SQLite,
/// the same way the teacher stores `monitor_type` on its `monitors` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    Http,
    Tcp,
    Dns,
    Icmp,
    Tls,
    Websocket,
    Command,
    Heartbeat,
    Docker,
    Domain,
    Grpc,
    Mqtt,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Tcp => "tcp",
            MonitorType::Dns => "dns",
            MonitorType::Icmp => "icmp",
            MonitorType::Tls => "tls",
            MonitorType::Websocket => "websocket",
            MonitorType::Command => "command",
            MonitorType::Heartbeat => "heartbeat",
            MonitorType::Docker => "docker",
            MonitorType::Domain => "domain",
            MonitorType::Grpc => "grpc",
            MonitorType::Mqtt => "mqtt",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "http" => MonitorType::Http,
            "tcp" => MonitorType::Tcp,
            "dns" => MonitorType::Dns,
            "icmp" => MonitorType::Icmp,
            "tls" => MonitorType::Tls,
            "websocket" => MonitorType::Websocket,
            "command" => MonitorType::Command,
            "heartbeat" => MonitorType::Heartbeat,
            "docker" => MonitorType::Docker,
            "domain" => MonitorType::Domain,
            "grpc" => MonitorType::Grpc,
            "mqtt" => MonitorType::Mqtt,
            _ => return None,
        })
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visible monitor state, driven by the classifier (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Up,
    Down,
    Degraded,
    Pending,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Degraded => "degraded",
            MonitorStatus::Pending => "pending",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "degraded" => MonitorStatus::Degraded,
            _ => MonitorStatus::Pending,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declarative description of an endpoint to probe. Mirrors spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    pub monitor_type: MonitorType,
    /// Synthetic for `heartbeat` monitors; non-empty for every other type.
    pub target: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub enabled: bool,
    pub settings: serde_json::Value,
    pub assertions: serde_json::Value,
    pub track_changes: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub upside_down: bool,
    /// Seconds between repeat `incident.created` resends; 0 = never.
    pub resend_interval: u32,
    pub group_id: Option<String>,
    pub proxy_id: Option<String>,
    pub tags: Vec<String>,
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_checked_at: Option<String>,
    pub notification_channel_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Monitor {
    /// Invariant from spec.md §3: every non-heartbeat monitor needs a real target.
    pub fn validate_target(&self) -> Result<(), String> {
        if self.monitor_type != MonitorType::Heartbeat && self.target.trim().is_empty() {
            return Err(format!("monitor type {} requires a non-empty target", self.monitor_type));
        }
        if self.target.len() > 2048 {
            return Err("target must be <= 2048 characters".to_string());
        }
        Ok(())
    }
}

/// Outcome of a single probe execution. Append-only, retained for `retention_days`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub monitor_id: String,
    pub checked_at: String,
    pub status: MonitorStatus,
    pub response_time_ms: u32,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub cert_expiry: Option<String>,
    pub dns_records: Option<serde_json::Value>,
    pub content_hash: Option<String>,
    pub raw_body_sample: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "acknowledged" => IncidentStatus::Acknowledged,
            "resolved" => IncidentStatus::Resolved,
            _ => IncidentStatus::Open,
        }
    }
}

/// A sustained period during which a monitor is considered down or degraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub monitor_id: String,
    /// Denormalized snapshot so the timeline survives a monitor rename/delete.
    pub monitor_name: String,
    pub status: IncidentStatus,
    pub started_at: String,
    pub acknowledged_at: Option<String>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub cause: String,
    pub severity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentEventType {
    Created,
    Acknowledged,
    Resolved,
    Note,
}

impl IncidentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentEventType::Created => "created",
            IncidentEventType::Acknowledged => "acknowledged",
            IncidentEventType::Resolved => "resolved",
            IncidentEventType::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub id: String,
    pub incident_id: String,
    pub event_type: IncidentEventType,
    pub message: String,
    pub at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Pending,
    Up,
    Down,
}

impl HeartbeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatStatus::Pending => "pending",
            HeartbeatStatus::Up => "up",
            HeartbeatStatus::Down => "down",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "up" => HeartbeatStatus::Up,
            "down" => HeartbeatStatus::Down,
            _ => HeartbeatStatus::Pending,
        }
    }
}

/// Passive monitor state: 1:1 with a heartbeat-type Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: String,
    /// Secret URL bearer, 16 bytes hex-encoded.
    pub token: String,
    pub grace_seconds: u32,
    pub status: HeartbeatStatus,
    pub last_ping_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Webhook,
    Email,
    Telegram,
    Discord,
    Slack,
    Ntfy,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook",
            ChannelType::Email => "email",
            ChannelType::Telegram => "telegram",
            ChannelType::Discord => "discord",
            ChannelType::Slack => "slack",
            ChannelType::Ntfy => "ntfy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "webhook" => ChannelType::Webhook,
            "email" => ChannelType::Email,
            "telegram" => ChannelType::Telegram,
            "discord" => ChannelType::Discord,
            "slack" => ChannelType::Slack,
            "ntfy" => ChannelType::Ntfy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IncidentCreated,
    IncidentAcknowledged,
    IncidentResolved,
    ContentChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::IncidentCreated => "incident.created",
            EventType::IncidentAcknowledged => "incident.acknowledged",
            EventType::IncidentResolved => "incident.resolved",
            EventType::ContentChanged => "content.changed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "incident.created" => EventType::IncidentCreated,
            "incident.acknowledged" => EventType::IncidentAcknowledged,
            "incident.resolved" => EventType::IncidentResolved,
            "content.changed" => EventType::ContentChanged,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub enabled: bool,
    pub settings: serde_json::Value,
    pub events: Vec<EventType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    pub name: String,
    pub monitor_ids: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    /// "" | "daily" | "weekly" | "monthly"
    pub recurring: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "http" => ProxyProtocol::Http,
            "socks5" => ProxyProtocol::Socks5,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    pub name: String,
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub auth_user: Option<String>,
    pub auth_pass: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChange {
    pub monitor_id: String,
    pub observed_at: String,
    pub old_hash: String,
    pub new_hash: String,
    pub diff_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// One row of the notification delivery audit trail, grounded on the
/// teacher's `alert_log` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationHistoryRow {
    pub id: String,
    pub channel_id: String,
    pub monitor_id: String,
    pub incident_id: Option<String>,
    pub event_type: EventType,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub latency_ms: Option<u32>,
    pub error_message: Option<String>,
    pub sent_at: String,
}

/// Now formatted the same way the teacher formats every timestamp.
pub fn now_str() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
