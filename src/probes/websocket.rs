use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// New relative to the teacher. Performs the WebSocket upgrade and,
/// optionally, a single ping/pong round-trip (`settings.verify_pong`).
pub async fn probe(_ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let verify_pong = monitor.settings["verify_pong"].as_bool().unwrap_or(false);

    let start = std::time::Instant::now();
    let connect = tokio_tungstenite::connect_async(&monitor.target);
    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), connect).await;

    let mut socket = match outcome {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => return new_result(monitor, MonitorStatus::Down, start.elapsed().as_millis() as u32, None, Some(format!("upgrade failed: {e}"))),
        Err(_) => return new_result(monitor, MonitorStatus::Down, start.elapsed().as_millis() as u32, None, Some("upgrade timed out".into())),
    };

    if !verify_pong {
        let elapsed_ms = start.elapsed().as_millis() as u32;
        let _ = socket.close(None).await;
        return new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None);
    }

    let ping_result = async {
        socket.send(Message::Ping(vec![].into())).await.map_err(|e| e.to_string())?;
        while let Some(msg) = socket.next().await {
            match msg {
                Ok(Message::Pong(_)) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(e.to_string()),
            }
        }
        Err("connection closed before pong".to_string())
    };

    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), ping_result).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;
    let _ = socket.close(None).await;

    match outcome {
        Ok(Ok(())) => new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None),
        Ok(Err(e)) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(e)),
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("ping/pong round-trip timed out".into())),
    }
}
