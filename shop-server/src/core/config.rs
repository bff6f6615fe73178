use std::path::PathBuf;
use std::time::Duration;

/// Service configuration - every setting of the order engine
///
/// # Environment variables
///
/// Every setting can be overridden from the environment:
///
/// | Variable | Default | Description |
/// |----------|--------|------|
/// | WORK_DIR | ./data | Working directory (orders.redb, logs) |
/// | LOG_LEVEL | info | Log level |
/// | LOG_JSON | false | JSON formatted logs |
/// | SHOP_NAME | Shop | Payment subject |
/// | ORDER_AUTO_CANCEL_MINUTES | 120 | Unpaid order auto-cancel (minutes) |
/// | ORDER_AUTO_COMPLETE_MINUTES | 10080 | Auto-confirm receipt after shipping (minutes) |
/// | ORDER_AUTO_REVIEW_MINUTES | 10080 | Auto-review after receipt (minutes) |
/// | STOCK_LOCK_TIMEOUT_MS | 3000 | Wait per stock lock attempt (ms) |
/// | STOCK_LOCK_MAX_ATTEMPTS | 3 | Stock lock attempts |
/// | JOB_POLL_INTERVAL_SECS | 30 | Job scan interval (seconds) |
/// | JOB_MAX_ATTEMPTS | 5 | Job retry limit |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/shop ORDER_AUTO_CANCEL_MINUTES=30 cargo test
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding the database and logs
    pub work_dir: String,
    pub log_level: String,
    pub log_json: bool,
    /// Shop name (payment order subject)
    pub shop_name: String,

    // === Order time limits ===
    pub auto_cancel_minutes: i64,
    pub auto_complete_minutes: i64,
    pub auto_review_minutes: i64,

    // === Concurrency ===
    pub stock_lock_timeout_ms: u64,
    pub stock_lock_max_attempts: u32,

    // === Deferred jobs ===
    pub job_poll_interval_secs: u64,
    pub job_max_attempts: u32,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load settings from the environment
    ///
    /// Unset or unparsable variables fall back to their defaults
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON", false),
            shop_name: std::env::var("SHOP_NAME").unwrap_or_else(|_| "Shop".into()),
            auto_cancel_minutes: env_parse("ORDER_AUTO_CANCEL_MINUTES", 120),
            auto_complete_minutes: env_parse("ORDER_AUTO_COMPLETE_MINUTES", 10080),
            auto_review_minutes: env_parse("ORDER_AUTO_REVIEW_MINUTES", 10080),
            stock_lock_timeout_ms: env_parse("STOCK_LOCK_TIMEOUT_MS", 3000),
            stock_lock_max_attempts: env_parse("STOCK_LOCK_MAX_ATTEMPTS", 3),
            job_poll_interval_secs: env_parse("JOB_POLL_INTERVAL_SECS", 30),
            job_max_attempts: env_parse("JOB_MAX_ATTEMPTS", 5),
        }
    }

    /// Use the given working directory, everything else from the environment
    ///
    /// Mostly used by tests
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// Path of the order database
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("orders.redb")
    }

    /// Log directory
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn stock_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.stock_lock_timeout_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_secs(self.job_poll_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
