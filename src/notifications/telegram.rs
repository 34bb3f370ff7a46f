use super::NotificationPayload;
use crate::models::NotificationChannel;

/// Telegram Bot API `sendMessage`. `settings.bot_token` and `settings.chat_id`
/// are required.
pub async fn send(client: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let bot_token = channel.settings["bot_token"].as_str().ok_or("telegram channel missing settings.bot_token")?;
    let chat_id = channel.settings["chat_id"].as_str().ok_or("telegram channel missing settings.chat_id")?;

    let text = match payload.event_type {
        crate::models::EventType::IncidentCreated => format!("🔴 {} is down", payload.monitor.name),
        crate::models::EventType::IncidentResolved => format!("🟢 {} recovered", payload.monitor.name),
        crate::models::EventType::IncidentAcknowledged => format!("🟡 {} acknowledged", payload.monitor.name),
        crate::models::EventType::ContentChanged => format!("📝 {} content changed", payload.monitor.name),
    };

    let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("telegram API responded with {}", response.status()))
    }
}
