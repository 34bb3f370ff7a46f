use super::{assertions::{evaluate, AssertionContext}, new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::time::Duration;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Generalizes `checker::execute_http_check`: same "build request, send,
/// time it" shape, but success is now assertion-driven (§4.3) instead of a
/// single expected-status comparison, and an optional SHA-256 content hash
/// is produced for `track_changes` monitors.
pub async fn probe(ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let method = monitor.settings["method"].as_str().unwrap_or("GET").to_uppercase();
    let warning_ms = monitor.settings["response_time_warning_ms"].as_u64().map(|v| v as u32);

    let mut request = match method.as_str() {
        "HEAD" => ctx.http.head(&monitor.target),
        "POST" => ctx.http.post(&monitor.target),
        _ => ctx.http.get(&monitor.target),
    };
    request = request.timeout(Duration::from_secs(monitor.timeout_seconds as u64));

    if let Some(headers) = monitor.settings["headers"].as_object() {
        for (name, value) in headers {
            if let Some(v) = value.as_str() {
                request = request.header(name.as_str(), v);
            }
        }
    }

    let start = std::time::Instant::now();
    let response = request.send().await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let response = match response {
        Ok(r) => r,
        Err(e) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("request failed: {e}"))),
    };

    let status_code = response.status().as_u16();
    let headers = response.headers().clone();

    // Body is read as a stream so the hash covers the full response even
    // when it exceeds MAX_BODY_BYTES; only the first MAX_BODY_BYTES are
    // buffered for assertion evaluation and the stored sample, excess is
    // discarded as it arrives instead of accumulating in memory.
    let mut hasher = Sha256::new();
    let mut buffered = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(format!("failed to read body: {e}"))),
        };
        if monitor.track_changes {
            hasher.update(&chunk);
        }
        if buffered.len() < MAX_BODY_BYTES {
            let remaining = MAX_BODY_BYTES - buffered.len();
            buffered.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }
    }

    let body_text = String::from_utf8_lossy(&buffered).to_string();
    let content_hash = if monitor.track_changes { Some(hex::encode(hasher.finalize())) } else { None };

    let assertion_ctx = AssertionContext { status_code, body: &body_text, headers: &headers, response_time_ms: elapsed_ms };

    let mut result = match evaluate(&monitor.assertions, &assertion_ctx) {
        Ok(()) => {
            let status = match warning_ms {
                Some(threshold) if elapsed_ms > threshold => MonitorStatus::Degraded,
                _ => MonitorStatus::Up,
            };
            new_result(monitor, status, elapsed_ms, Some(status_code), None)
        }
        Err(msg) => new_result(monitor, MonitorStatus::Down, elapsed_ms, Some(status_code), Some(msg)),
    };

    result.content_hash = content_hash;
    result.raw_body_sample = Some(body_text.chars().take(512).collect());
    result
}
