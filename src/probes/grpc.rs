use super::new_result;
use crate::models::{Monitor, MonitorStatus};
use crate::pb::grpc_health_v1::health_client::HealthClient;
use crate::pb::grpc_health_v1::{health_check_response::ServingStatus, HealthCheckRequest};
use std::time::Duration;
use tonic::transport::Endpoint;

/// New relative to the teacher (no gRPC probe exists in its corpus). Speaks
/// the standard `grpc.health.v1.Health` service via `tonic`, the
/// ecosystem-standard gRPC stack; `service` in settings addresses a
/// specific sub-service the way `grpc_health_probe` does.
pub async fn probe(_ctx: &super::ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let service = monitor.settings["service"].as_str().unwrap_or("").to_string();
    let target = normalize_target(&monitor.target);

    let start = std::time::Instant::now();
    let connect = async {
        let endpoint = Endpoint::from_shared(target.clone()).map_err(|e| format!("invalid target: {e}"))?;
        let endpoint = endpoint.timeout(Duration::from_secs(monitor.timeout_seconds as u64));
        let channel = endpoint.connect().await.map_err(|e| format!("connection failed: {e}"))?;
        let mut client = HealthClient::new(channel);
        let response = client
            .check(HealthCheckRequest { service })
            .await
            .map_err(|status| format!("health check RPC failed: {status}"))?;
        Ok::<_, String>(response.into_inner().status)
    };

    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), connect).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(e)),
        Err(_) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("health check timed out".into())),
    };

    match ServingStatus::try_from(status) {
        Ok(ServingStatus::Serving) => new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None),
        Ok(other) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("service reported {other:?}"))),
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("unrecognized serving status".into())),
    }
}

fn normalize_target(target: &str) -> String {
    if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{target}")
    }
}
