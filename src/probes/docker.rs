use super::new_result;
use crate::models::{Monitor, MonitorStatus};
use hyper::body::HttpBody;
use hyperlocal::{UnixClientExt, Uri as UnixUri};
use std::time::Duration;

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// New relative to the teacher (no container-runtime probe exists in its
/// corpus). Queries the Docker Engine API's container-inspect endpoint over
/// the local Unix socket via `hyperlocal`, the ecosystem's standard
/// hyper-over-UDS connector, and checks `State.Running`.
pub async fn probe(_ctx: &super::ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let container = monitor.target.trim();
    if container.is_empty() {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some("target must name a container id or name".into()));
    }

    let uri: hyper::Uri = UnixUri::new(DOCKER_SOCKET, &format!("/containers/{container}/json")).into();
    let client = hyper::Client::unix();

    let start = std::time::Instant::now();
    let request = client.get(uri);
    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), request).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("docker socket request failed: {e}"))),
        Err(_) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("docker socket request timed out".into())),
    };

    let status_code = response.status().as_u16();
    if status_code == 404 {
        return new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("no such container: {container}")));
    }
    if !response.status().is_success() {
        return new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("docker API returned {status_code}")));
    }

    let mut body = response.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("failed to read response body: {e}"))),
        }
    }

    let parsed: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("malformed inspect response: {e}"))),
    };

    let running = parsed["State"]["Running"].as_bool().unwrap_or(false);
    if running {
        new_result(monitor, MonitorStatus::Up, elapsed_ms, Some(status_code), None)
    } else {
        let reason = parsed["State"]["Status"].as_str().unwrap_or("not running").to_string();
        new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("container state: {reason}")))
    }
}
