use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use rustls_pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

const DEFAULT_WARNING_DAYS: i64 = 14;

/// New relative to the teacher. Reuses the `rustls`/`tokio-rustls` stack
/// reqwest already pulls in transitively, promoted to a direct dependency
/// here since the probe needs raw handshake/certificate access reqwest
/// doesn't expose.
pub async fn probe(_ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let warning_days = monitor.settings["warning_days"].as_i64().unwrap_or(DEFAULT_WARNING_DAYS);
    let (host, port) = match split_host_port(&monitor.target) {
        Some(hp) => hp,
        None => return new_result(monitor, MonitorStatus::Down, 0, None, Some("target must be host:port".into())),
    };

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let Ok(server_name) = ServerName::try_from(host.clone()) else {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some("invalid server name".into()));
    };

    let start = std::time::Instant::now();
    let connect = async {
        let tcp = TcpStream::connect((host.as_str(), port)).await?;
        connector.connect(server_name, tcp).await
    };

    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), connect).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let stream = match outcome {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("TLS handshake failed: {e}"))),
        Err(_) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("TLS handshake timed out".into())),
    };

    let (_, session) = stream.get_ref();
    let Some(certs) = session.peer_certificates() else {
        return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("server presented no certificate".into()));
    };
    let Some(leaf) = certs.first() else {
        return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("empty certificate chain".into()));
    };

    let (not_after, issuer) = match x509_parser::parse_x509_certificate(leaf.as_ref()) {
        Ok((_, cert)) => (cert.validity().not_after.timestamp(), cert.issuer().to_string()),
        Err(e) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("failed to parse certificate: {e}"))),
    };

    let expiry = chrono::DateTime::from_timestamp(not_after, 0).unwrap_or_else(chrono::Utc::now);
    let days_remaining = (expiry - chrono::Utc::now()).num_days();

    let mut result = if days_remaining < 0 {
        new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("certificate has expired".into()))
    } else if days_remaining < warning_days {
        new_result(monitor, MonitorStatus::Degraded, elapsed_ms, None, Some(format!("certificate expires in {days_remaining} days (issuer {issuer})")))
    } else {
        new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None)
    };
    result.cert_expiry = Some(expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    result
}

fn split_host_port(target: &str) -> Option<(String, u16)> {
    let without_scheme = target.split("://").last().unwrap_or(target);
    let mut parts = without_scheme.rsplitn(2, ':');
    let port: u16 = parts.next()?.parse().ok()?;
    let host = parts.next()?.to_string();
    Some((host, port))
}
