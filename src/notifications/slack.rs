use super::NotificationPayload;
use crate::models::NotificationChannel;

/// Slack delivery via an incoming-webhook URL, plain `text` body.
pub async fn send(client: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let url = channel.settings["webhook_url"].as_str().ok_or("slack channel missing settings.webhook_url")?;

    let text = match payload.event_type {
        crate::models::EventType::IncidentCreated => format!(":red_circle: *{}* is down", payload.monitor.name),
        crate::models::EventType::IncidentResolved => format!(":large_green_circle: *{}* recovered", payload.monitor.name),
        crate::models::EventType::IncidentAcknowledged => format!(":large_yellow_circle: *{}* acknowledged", payload.monitor.name),
        crate::models::EventType::ContentChanged => format!(":memo: *{}* content changed", payload.monitor.name),
    };

    let body = serde_json::json!({ "text": text });
    let response = client.post(url).json(&body).send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("slack webhook responded with {}", response.status()))
    }
}
