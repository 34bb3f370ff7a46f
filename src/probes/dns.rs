use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::Name;
use std::time::Duration;

/// Direct generalization of `checker::execute_dns_check`/`dns_lookup`.
pub async fn probe(ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let hostname = monitor.target.strip_prefix("dns://").unwrap_or(&monitor.target);
    let record_type = monitor.settings["record_type"].as_str().unwrap_or("A").to_uppercase();
    let expected = monitor.settings["expected"].as_str().map(|s| s.to_lowercase());

    let start = std::time::Instant::now();
    let _permit = match ctx.dns_semaphore.acquire().await {
        Ok(p) => p,
        Err(_) => return new_result(monitor, MonitorStatus::Down, 0, None, Some("DNS semaphore closed".into())),
    };
    let outcome = tokio::time::timeout(Duration::from_secs(monitor.timeout_seconds as u64), lookup(&ctx.resolver, hostname, &record_type)).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match outcome {
        Ok(Ok(values)) if values.is_empty() => {
            new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("no {record_type} records found for {hostname}")))
        }
        Ok(Ok(values)) => {
            let matched = match &expected {
                Some(e) => values.iter().any(|v| v.to_lowercase().trim_end_matches('.') == e.trim_end_matches('.')),
                None => true,
            };
            let mut result = if matched {
                new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None)
            } else {
                new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("expected record {expected:?} not found in {values:?}")))
            };
            result.dns_records = Some(serde_json::json!(values));
            result
        }
        Ok(Err(e)) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(e)),
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("DNS query timed out".into())),
    }
}

async fn lookup(resolver: &hickory_resolver::TokioAsyncResolver, hostname: &str, record_type: &str) -> Result<Vec<String>, String> {
    let name = Name::from_ascii(hostname).map_err(|e| format!("invalid hostname: {e}"))?;
    match record_type {
        "A" => Ok(resolver.ipv4_lookup(name).await.map_err(|e| e.to_string())?.iter().map(|ip| ip.to_string()).collect()),
        "AAAA" => Ok(resolver.ipv6_lookup(name).await.map_err(|e| e.to_string())?.iter().map(|ip| ip.to_string()).collect()),
        "MX" => Ok(resolver
            .mx_lookup(name)
            .await
            .map_err(|e| e.to_string())?
            .iter()
            .map(|mx| format!("{} {}", mx.preference(), mx.exchange()))
            .collect()),
        "TXT" => Ok(resolver.txt_lookup(name).await.map_err(|e| e.to_string())?.iter().map(|txt| txt.to_string()).collect()),
        "NS" => Ok(resolver.ns_lookup(name).await.map_err(|e| e.to_string())?.iter().map(|ns| ns.to_string()).collect()),
        "CNAME" | "PTR" | "SRV" | "CAA" => {
            let rtype = match record_type {
                "CNAME" => RecordType::CNAME,
                "PTR" => RecordType::PTR,
                "SRV" => RecordType::SRV,
                _ => RecordType::CAA,
            };
            let lookup = resolver.lookup(name, rtype).await.map_err(|e| e.to_string())?;
            Ok(lookup.iter().map(|r| format!("{r:?}")).collect())
        }
        other => Err(format!("unsupported record type {other}")),
    }
}
