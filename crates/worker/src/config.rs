use std::time::Duration;

/// Worker process settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Operations run at the same time.
    pub concurrency: usize,
    /// How often the dispatcher looks for runnable operations.
    pub poll_interval: Duration,
    pub cron_tick_interval: Duration,
    pub health_check_interval: Duration,
    pub archive_purge_interval: Duration,
    /// Certificate renewal sweep and expiry alerts.
    pub certificate_sweep_interval: Duration,
    /// Grace period for in-flight operations on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            cron_tick_interval: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(300),
            archive_purge_interval: Duration::from_secs(3600),
            certificate_sweep_interval: Duration::from_secs(86_400),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `WORKER_CONCURRENCY`            | `4`     |
    /// | `WORKER_POLL_INTERVAL_MS`       | `1000`  |
    /// | `CRON_TICK_SECS`                | `60`    |
    /// | `HEALTH_CHECK_INTERVAL_SECS`    | `300`   |
    /// | `ARCHIVE_PURGE_INTERVAL_SECS`   | `3600`  |
    /// | `SSL_SWEEP_INTERVAL_SECS`       | `86400` |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .map(|v| {
                    v.parse::<u64>()
                        .unwrap_or_else(|_| panic!("{key} must be a valid u64"))
                })
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| defaults.concurrency.to_string())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");
        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");

        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("WORKER_POLL_INTERVAL_MS must be a valid u64");

        Self {
            concurrency,
            poll_interval: Duration::from_millis(poll_interval_ms),
            cron_tick_interval: secs("CRON_TICK_SECS", defaults.cron_tick_interval),
            health_check_interval: secs("HEALTH_CHECK_INTERVAL_SECS", defaults.health_check_interval),
            archive_purge_interval: secs("ARCHIVE_PURGE_INTERVAL_SECS", defaults.archive_purge_interval),
            certificate_sweep_interval: secs("SSL_SWEEP_INTERVAL_SECS", defaults.certificate_sweep_interval),
            shutdown_timeout: secs("SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_schedule() {
        let config = WorkerConfig::default();
        assert_eq!(config.cron_tick_interval, Duration::from_secs(60));
        assert_eq!(config.health_check_interval, Duration::from_secs(5 * 60));
        assert_eq!(config.archive_purge_interval, Duration::from_secs(60 * 60));
        assert_eq!(config.certificate_sweep_interval, Duration::from_secs(24 * 60 * 60));
    }
}
