use super::{new_result, ProbeContext};
use crate::models::{Monitor, MonitorStatus};
use std::time::Duration;
use tokio::process::Command;

const MAX_EXCERPT_BYTES: usize = 2048;

/// Runs an allowlisted external executable. Uses `tokio::process::Command`
/// directly (no new dependency — it's the async flavor of what `tokio`,
/// already in the stack, provides). If the allowlist is empty, command
/// probes are disabled entirely per spec.md §4.3.
pub async fn probe(ctx: &ProbeContext, monitor: &Monitor) -> crate::models::CheckResult {
    if ctx.command_allowlist.is_empty() {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some("command probes are disabled: COMMAND_ALLOWLIST is empty".into()));
    }

    let executable = monitor.target.trim();
    let program = executable.split_whitespace().next().unwrap_or("");
    if !ctx.command_allowlist.iter().any(|allowed| allowed == program) {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some(format!("{program} is not in COMMAND_ALLOWLIST")));
    }

    let mut parts = executable.split_whitespace();
    let Some(program) = parts.next() else {
        return new_result(monitor, MonitorStatus::Down, 0, None, Some("empty command".into()));
    };
    let args: Vec<&str> = parts.collect();

    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(ctx.command_timeout_seconds.min(monitor.timeout_seconds) as u64);
    let outcome = tokio::time::timeout(timeout, Command::new(program).args(&args).output()).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match outcome {
        Ok(Ok(output)) if output.status.success() => {
            let mut result = new_result(monitor, MonitorStatus::Up, elapsed_ms, None, None);
            result.raw_body_sample = Some(excerpt(&output.stdout));
            result
        }
        Ok(Ok(output)) => {
            let code = output.status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
            let mut result = new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("exited with code {code}")));
            result.raw_body_sample = Some(excerpt(&output.stderr));
            result
        }
        Ok(Err(e)) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some(format!("failed to spawn command: {e}"))),
        Err(_) => new_result(monitor, MonitorStatus::Down, elapsed_ms, None, Some("command timed out".into())),
    }
}

fn excerpt(bytes: &[u8]) -> String {
    let truncated = &bytes[..bytes.len().min(MAX_EXCERPT_BYTES)];
    String::from_utf8_lossy(truncated).to_string()
}
