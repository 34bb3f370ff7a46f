use super::{event_json, NotificationPayload};
use crate::models::NotificationChannel;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Delivers a JSON POST, signing the body with `HMAC-SHA256(secret, body)`
/// in `X-Asura-Signature` when `settings.secret` is configured.
pub async fn send(client: &reqwest::Client, channel: &NotificationChannel, payload: &NotificationPayload) -> Result<(), String> {
    let url = channel.settings["url"].as_str().ok_or("webhook channel missing settings.url")?;
    let body = event_json(payload).to_string();

    let mut request = client.post(url).header("Content-Type", "application/json");
    if let Some(secret) = channel.settings["secret"].as_str() {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        request = request.header("X-Asura-Signature", signature);
    }

    let response = request.body(body).send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("webhook responded with {}", response.status()))
    }
}
