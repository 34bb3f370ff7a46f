use super::NotificationPayload;
use crate::models::NotificationChannel;

/// ntfy.sh-style plain-body POST to `settings.topic_url`.
pub async fn send(client: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let topic_url = channel.settings["topic_url"].as_str().ok_or("ntfy channel missing settings.topic_url")?;

    let body = match payload.event_type {
        crate::models::EventType::IncidentCreated => format!("{} is down", payload.monitor.name),
        crate::models::EventType::IncidentResolved => format!("{} recovered", payload.monitor.name),
        crate::models::EventType::IncidentAcknowledged => format!("{} acknowledged", payload.monitor.name),
        crate::models::EventType::ContentChanged => format!("{} content changed", payload.monitor.name),
    };

    let mut request = client.post(topic_url).body(body);
    if let Some(title) = channel.settings["title_prefix"].as_str() {
        request = request.header("Title", format!("{title}: {}", payload.monitor.name));
    }

    let response = request.send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("ntfy responded with {}", response.status()))
    }
}
