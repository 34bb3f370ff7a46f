use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};

/// New relative to the teacher (no ICMP probe exists in its corpus). Uses
/// `surge-ping`, the ecosystem's standard async ICMP client, built in the
/// same "resolve then race a single attempt against the timeout" shape as
/// the TCP/DNS probes.
pub async fn probe(ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    let host = monitor.target.trim();
    let ip: IpAddr = match host.parse() {
        Ok(ip) => ip,
        Err(_) => match resolve_one(ctx, host).await {
            Ok(ip) => ip,
            Err(e) => return new_result(monitor, MonitorStatus::Down, 0, None, Some(e)),
        },
    };

    let client = match Client::new(&Config::default()) {
        Ok(c) => c,
        Err(e) => return new_result(monitor, MonitorStatus::Down, 0, None, Some(format!("failed to open ICMP socket: {e}"))),
    };

    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(Duration::from_secs(monitor.timeout_seconds as u64));

    let start = std::time::Instant::now();
    let outcome = pinger.ping(PingSequence(0), &[0u8; 8]).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match outcome {
        Ok(_) => new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None),
        Err(e) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("echo request failed: {e}"))),
    }
}

async fn resolve_one(ctx: &ProbeContext, host: &str) -> Result<IpAddr, String> {
    let _permit = ctx.dns_semaphore.acquire().await.map_err(|_| "DNS semaphore closed".to_string())?;
    let name = hickory_resolver::Name::from_ascii(host).map_err(|e| format!("invalid hostname: {e}"))?;
    let lookup = ctx.resolver.lookup_ip(name).await.map_err(|e| format!("DNS lookup failed: {e}"))?;
    lookup.iter().next().ok_or_else(|| "no addresses resolved".to_string())
}
