use super::NotificationPayload;
use crate::models::NotificationChannel;

/// Discord delivery via an incoming-webhook URL with a single embed.
pub async fn send(client: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let url = channel.settings["webhook_url"].as_str().ok_or("discord channel missing settings.webhook_url")?;

    let (title, color) = match payload.event_type {
        crate::models::EventType::IncidentCreated => (format!("🔴 {} is down", payload.monitor.name), 0xE74C3C),
        crate::models::EventType::IncidentResolved => (format!("🟢 {} recovered", payload.monitor.name), 0x2ECC71),
        crate::models::EventType::IncidentAcknowledged => (format!("🟡 {} acknowledged", payload.monitor.name), 0xF1C40F),
        crate::models::EventType::ContentChanged => (format!("📝 {} content changed", payload.monitor.name), 0x3498DB),
    };

    let description = payload
        .incident
        .as_ref()
        .map(|i| i.cause.clone())
        .unwrap_or_else(|| payload.monitor.target.clone());

    let body = serde_json::json!({
        "embeds": [{
            "title": title,
            "description": description,
            "color": color,
        }]
    });

    let response = client.post(url).json(&body).send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("discord webhook responded with {}", response.status()))
    }
}
