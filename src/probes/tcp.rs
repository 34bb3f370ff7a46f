use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use std::time::Duration;
use tokio::net::TcpStream;

/// Direct generalization of `checker::execute_tcp_check`.
pub async fn probe(_ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let addr = monitor.target.strip_prefix("tcp://").unwrap_or(&monitor.target);
    let start = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), TcpStream::connect(addr)).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match outcome {
        Ok(Ok(_stream)) => new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None),
        Ok(Err(e)) => {
            let msg = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                "connection refused".to_string()
            } else {
                format!("TCP connect failed: {e}")
            };
            new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(msg))
        }
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("TCP connect timed out".into())),
    }
}
