use super::new_result;
use crate::models::{Monitor, MonitorStatus};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// New relative to the teacher (no domain-expiry probe exists in its
/// corpus). Speaks raw WHOIS (RFC 3912) over a plain TCP socket — the
/// protocol is a single newline-terminated query followed by a plaintext
/// response, so no client crate earns its keep here.
pub async fn probe(_ctx: &super::ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let domain = monitor.target.trim().to_lowercase();
    if domain.is_empty() {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some("target must be a domain name".into()));
    }

    let warning_days = monitor.settings["warning_days"].as_i64().unwrap_or(30);
    let server = monitor.settings["whois_server"].as_str().unwrap_or("whois.iana.org").to_string();

    let start = std::time::Instant::now();
    let lookup = whois_query(&server, &domain, monitor.timeout_seconds);
    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), lookup).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(e)),
        Err(_) => return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("WHOIS query timed out".into())),
    };

    // IANA's WHOIS is a referral registry; follow a `refer:` line once if present.
    if server == "whois.iana.org" {
        if let Some(referred) = extract_field(&response, "refer") {
            if referred != server {
                let lookup = whois_query(&referred, &domain, monitor.timeout_seconds);
                if let Ok(Ok(response)) = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), lookup).await {
                    return evaluate(monitor, &response, warning_days, elapsed_ms);
                }
            }
        }
    }

    evaluate(monitor, &response, warning_days, elapsed_ms)
}

fn evaluate(monitor: &Monitor, response: &str, warning_days: i64, elapsed_ms: u32) -> crate::models::CheckResult {
    let lowered = response.to_lowercase();
    if lowered.contains("no match") || lowered.contains("not found") || lowered.contains("no entries found") {
        return new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("domain is not registered".into()));
    }

    let expiry_field = ["registry expiry date", "expiration date", "expiry date", "paid-till"]
        .iter()
        .find_map(|field| extract_field(response, field));

    let Some(expiry_raw) = expiry_field else {
        return new_result(monitor, MonitorStatus::Degraded, elapsed_ms, None, Some("expiry date not found in WHOIS response".into()));
    };

    let Some(expiry) = parse_whois_date(&expiry_raw) else {
        return new_result(monitor, MonitorStatus::Degraded, elapsed_ms, None, Some(format!("could not parse expiry date: {expiry_raw}")));
    };

    let days_remaining = (expiry - chrono::Utc::now()).num_days();
    let mut result = if days_remaining < 0 {
        new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("domain registration has expired".into()))
    } else if days_remaining < warning_days {
        new_result(monitor, MonitorStatus::Degraded, elapsed_ms, None, Some(format!("domain expires in {days_remaining} days")))
    } else {
        new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None)
    };
    result.cert_expiry = Some(expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    result
}

async fn whois_query(server: &str, domain: &str, _timeout_seconds: u32) -> Result<String, String> {
    let mut stream = TcpStream::connect((server, WHOIS_PORT)).await.map_err(|e| format!("could not reach {server}: {e}"))?;
    stream.write_all(format!("{domain}\r\n").as_bytes()).await.map_err(|e| format!("write failed: {e}"))?;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.map_err(|e| format!("read failed: {e}"))?;
        if n == 0 || buf.len() >= MAX_RESPONSE_BYTES {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

fn extract_field<'a>(response: &'a str, field: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().to_lowercase() == field {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn parse_whois_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_expiry_field_case_insensitively() {
        let body = "Domain Name: EXAMPLE.COM\nRegistry Expiry Date: 2030-01-15T00:00:00Z\n";
        assert_eq!(extract_field(body, "registry expiry date"), Some("2030-01-15T00:00:00Z".to_string()));
    }

    #[test]
    fn parses_rfc3339_and_plain_date() {
        assert!(parse_whois_date("2030-01-15T00:00:00Z").is_some());
        assert!(parse_whois_date("2030-01-15").is_some());
        assert!(parse_whois_date("not a date").is_none());
    }
}
