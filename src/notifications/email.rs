use super::NotificationPayload;
use crate::models::NotificationChannel;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP delivery via `lettre`. `settings` carries `smtp_host`, `smtp_port`,
/// `smtp_user`, `smtp_pass`, `from`, `to`.
pub async fn send(channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let smtp_host = channel.settings["smtp_host"].as_str().ok_or("email channel missing settings.smtp_host")?;
    let from = channel.settings["from"].as_str().ok_or("email channel missing settings.from")?;
    let to = channel.settings["to"].as_str().ok_or("email channel missing settings.to")?;

    let subject = match payload.event_type {
        crate::models::EventType::IncidentCreated => format!("[Asura] {} is DOWN", payload.monitor.name),
        crate::models::EventType::IncidentResolved => format!("[Asura] {} has recovered", payload.monitor.name),
        crate::models::EventType::IncidentAcknowledged => format!("[Asura] {} acknowledged", payload.monitor.name),
        crate::models::EventType::ContentChanged => format!("[Asura] {} content changed", payload.monitor.name),
    };

    let body = payload
        .incident
        .as_ref()
        .map(|i| format!("{}\n\nstarted at: {}", i.cause, i.started_at))
        .unwrap_or_else(|| payload.monitor.target.clone());

    let email = Message::builder()
        .from(from.parse().map_err(|e| format!("invalid from address: {e}"))?)
        .to(to.parse().map_err(|e| format!("invalid to address: {e}"))?)
        .header(ContentType::TEXT_PLAIN)
        .subject(subject)
        .body(body)
        .map_err(|e| e.to_string())?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host).map_err(|e| e.to_string())?;
    if let (Some(user), Some(pass)) = (channel.settings["smtp_user"].as_str(), channel.settings["smtp_pass"].as_str()) {
        builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
    }
    let mailer = builder.build();

    mailer.send(email).await.map_err(|e| e.to_string())?;
    Ok(())
}
