//! Probe engines. Shared contract: `probe(ctx, &Monitor) -> CheckResult`.
//! HTTP/TCP/DNS generalize `checker::execute_http_check`/
//! `execute_tcp_check`/`execute_dns_check` almost directly; the remaining
//! nine types are new, each in the same "build once, race against a
//! timeout" shape.

mod assertions;
mod command;
mod context;
mod docker;
mod dns;
mod domain;
mod grpc;
mod http;
mod icmp;
mod mqtt;
mod tcp;
mod tls;
mod websocket;

pub use context::ProbeContext;
use context::is_private_or_reserved;

use crate::models::{now_str, CheckResult, MonitorStatus, MonitorType};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Probe types that make outbound network connections to `monitor.target`
/// and are therefore subject to the private-target guard.
fn is_guarded_type(monitor_type: MonitorType) -> bool {
    matches!(
        monitor_type,
        MonitorType::Http | MonitorType::Tcp | MonitorType::Icmp | MonitorType::Tls | MonitorType::Websocket | MonitorType::Grpc
    )
}

/// Dispatches to the per-type probe implementation. Heartbeat monitors are
/// never invoked by workers (§4.7 drives them directly); dispatch here
/// returns a `pending` no-op defensively rather than panicking.
pub async fn probe(ctx: &ProbeContext, monitor: &crate::models::Monitor) -> CheckResult {
    if is_guarded_type(monitor.monitor_type) && !ctx.allow_private_targets {
        if let Some(result) = guard_private_target(ctx, monitor).await {
            return result;
        }
    }

    match monitor.monitor_type {
        MonitorType::Http => http::probe(ctx, monitor).await,
        MonitorType::Tcp => tcp::probe(ctx, monitor).await,
        MonitorType::Dns => dns::probe(ctx, monitor).await,
        MonitorType::Icmp => icmp::probe(ctx, monitor).await,
        MonitorType::Tls => tls::probe(ctx, monitor).await,
        MonitorType::Websocket => websocket::probe(ctx, monitor).await,
        MonitorType::Command => command::probe(ctx, monitor).await,
        MonitorType::Docker => docker::probe(ctx, monitor).await,
        MonitorType::Domain => domain::probe(ctx, monitor).await,
        MonitorType::Grpc => grpc::probe(ctx, monitor).await,
        MonitorType::Mqtt => mqtt::probe(ctx, monitor).await,
        MonitorType::Heartbeat => pending_result(monitor),
    }
}

fn pending_result(monitor: &crate::models::Monitor) -> CheckResult {
    new_result(monitor, MonitorStatus::Pending, 0, None, Some("heartbeat monitors are driven by the supervisor, not the worker pool".into()))
}

async fn guard_private_target(ctx: &ProbeContext, monitor: &crate::models::Monitor) -> Option<CheckResult> {
    let host = target_host(&monitor.target)?;
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        if is_private_or_reserved(ip) {
            return Some(rejected_result(monitor));
        }
        return None;
    }

    let _permit = ctx.dns_semaphore.acquire().await.ok()?;
    let Ok(name) = hickory_resolver::Name::from_ascii(&host) else { return None };
    if let Ok(lookup) = ctx.resolver.lookup_ip(name).await {
        if lookup.iter().any(is_private_or_reserved) {
            return Some(rejected_result(monitor));
        }
    }
    None
}

fn rejected_result(monitor: &crate::models::Monitor) -> CheckResult {
    new_result(monitor, MonitorStatus::Down, 0, None, Some("target not permitted".into()))
}

/// Extracts the bare host from a `scheme://host:port/...`-or-plain target.
fn target_host(target: &str) -> Option<String> {
    let without_scheme = target.split("://").last().unwrap_or(target);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    let host = host_port.split(':').next().unwrap_or(host_port);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub(crate) fn new_result(
    monitor: &crate::models::Monitor,
    status: MonitorStatus,
    response_time_ms: u32,
    status_code: Option<u16>,
    error_message: Option<String>,
) -> CheckResult {
    CheckResult {
        id: Uuid::new_v4().to_string(),
        monitor_id: monitor.id.clone(),
        checked_at: now_str(),
        status,
        response_time_ms,
        status_code,
        error_message,
        cert_expiry: None,
        dns_records: None,
        content_hash: None,
        raw_body_sample: None,
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_from_various_target_shapes() {
        assert_eq!(target_host("https://example.com:443/path"), Some("example.com".into()));
        assert_eq!(target_host("tcp://10.0.0.1:5432"), Some("10.0.0.1".into()));
        assert_eq!(target_host("example.com"), Some("example.com".into()));
    }
}
