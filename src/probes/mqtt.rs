use super::new_result;
use crate::models::{Monitor, MonitorStatus};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use std::time::Duration;
use uuid::Uuid;

/// New relative to the teacher (no MQTT probe exists in its corpus). Opens
/// a throwaway client id, issues CONNECT, and waits for the broker's
/// CONNACK via `rumqttc`, the ecosystem-standard async MQTT client.
pub async fn probe(_ctx: &super::ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let (host, port) = match split_host_port(&monitor.target) {
        Some(hp) => hp,
        None => return new_result(monitor, MonitorStatus::Down, 0, None, Some("target must be host:port".into())),
    };

    let client_id = format!("asura-probe-{}", Uuid::new_v4());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(monitor.timeout_seconds.max(5) as u64));

    if let Some(username) = monitor.settings["username"].as_str() {
        let password = monitor.settings["password"].as_str().unwrap_or("");
        options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 1);

    let start = std::time::Instant::now();
    let wait_for_connack = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack.code),
                Ok(_) => continue,
                Err(e) => return Err(format!("connection failed: {e}")),
            }
        }
    };

    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), wait_for_connack).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;
    client.disconnect().await.ok();

    match outcome {
        Ok(Ok(rumqttc::ConnectReturnCode::Success)) => new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None),
        Ok(Ok(code)) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("broker rejected connection: {code:?}"))),
        Ok(Err(e)) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(e)),
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("CONNACK not received before timeout".into())),
    }
}

fn split_host_port(target: &str) -> Option<(String, u16)> {
    let without_scheme = target.split("://").last().unwrap_or(target);
    let mut parts = without_scheme.rsplitn(2, ':');
    let port: u16 = parts.next()?.parse().ok()?;
    let host = parts.next()?.to_string();
    Some((host, port))
}
