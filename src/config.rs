/// Service-wide configuration, read from the environment the same way the
/// teacher reads `HEARTBEAT_RETENTION_DAYS` / `PROBE_STALE_MINUTES` /
/// `MONITOR_RATE_LIMIT` in `checker.rs` and `main.rs` — one `env_var`
/// lookup with a parse-and-default fallback per field, centralized here
/// instead of scattered across call sites.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub workers: usize,
    pub default_timeout_seconds: u32,
    pub default_interval_seconds: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub max_concurrent_dns: usize,
    pub command_timeout_seconds: u32,
    pub command_allowlist: Vec<String>,
    pub heartbeat_check_interval_seconds: u32,
    pub allow_private_targets: bool,
    pub adaptive_intervals: bool,
    /// Retained from the teacher's `HEARTBEAT_RETENTION_DAYS`; applies to
    /// CheckResult retention here (spec.md §3 `retention_days`).
    pub retention_days: u32,
}

fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let command_allowlist = std::env::var("COMMAND_ALLOWLIST")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        Config {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "asura.db".into()),
            workers: env_var("WORKERS", 10),
            default_timeout_seconds: env_var("DEFAULT_TIMEOUT", 10),
            default_interval_seconds: env_var("DEFAULT_INTERVAL", 300),
            failure_threshold: env_var("FAILURE_THRESHOLD", 3),
            success_threshold: env_var("SUCCESS_THRESHOLD", 1),
            max_concurrent_dns: env_var("MAX_CONCURRENT_DNS", 16),
            command_timeout_seconds: env_var("COMMAND_TIMEOUT", 10),
            command_allowlist,
            heartbeat_check_interval_seconds: env_var("HEARTBEAT_CHECK_INTERVAL", 30),
            allow_private_targets: env_var("ALLOW_PRIVATE_TARGETS", false),
            adaptive_intervals: env_var("ADAPTIVE_INTERVALS", false),
            retention_days: env_var("RETENTION_DAYS", 90),
        }
    }

    /// Queue capacity per spec.md §4.2: `workers * 4`, floor 64.
    pub fn queue_capacity(&self) -> usize {
        (self.workers * 4).max(64)
    }

    /// Dispatcher channel capacity per spec.md §4.6.
    pub fn dispatch_channel_capacity(&self) -> usize {
        1024
    }
}
