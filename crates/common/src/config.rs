use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (in-flight dispatch claims)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Path to the Firebase service-account JSON file
    pub fcm_credentials_path: String,

    /// Overrides the `project_id` found in the service-account file
    pub fcm_project_id: Option<String>,

    /// Maximum concurrent per-token FCM sends (default: 16)
    pub fcm_concurrency: usize,

    /// HTTP timeout for FCM and OAuth requests in seconds (default: 15)
    pub fcm_timeout_secs: u64,

    /// Age in days after which notification records are swept (default: 7)
    pub retention_days: i64,

    /// Hours between retention sweeps (default: 24)
    pub sweep_interval_hours: u64,

    /// TTL of the Redis in-flight claim taken before a dispatch (default: 300)
    pub dispatch_claim_ttl_secs: u64,

    /// Maximum unprocessed records replayed per backlog pass (default: 500)
    pub backlog_limit: i64,

    /// Seconds between periodic backlog replays; must exceed the claim TTL (default: 600)
    pub replay_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            fcm_credentials_path: std::env::var("FCM_CREDENTIALS_PATH").map_err(|_| {
                anyhow::anyhow!("FCM_CREDENTIALS_PATH environment variable is required")
            })?,
            fcm_project_id: std::env::var("FCM_PROJECT_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            fcm_concurrency: std::env::var("FCM_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_CONCURRENCY must be a valid usize"))?,
            fcm_timeout_secs: std::env::var("FCM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_TIMEOUT_SECS must be a valid u64"))?,
            retention_days: std::env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETENTION_DAYS must be a valid i64"))?,
            sweep_interval_hours: std::env::var("SWEEP_INTERVAL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SWEEP_INTERVAL_HOURS must be a valid u64"))?,
            dispatch_claim_ttl_secs: std::env::var("DISPATCH_CLAIM_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_CLAIM_TTL_SECS must be a valid u64"))?,
            backlog_limit: std::env::var("BACKLOG_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BACKLOG_LIMIT must be a valid i64"))?,
            replay_interval_secs: std::env::var("REPLAY_INTERVAL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REPLAY_INTERVAL_SECS must be a valid u64"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the service.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            anyhow::bail!(
                "RETENTION_DAYS must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.retention_days
            );
        }
        if self.sweep_interval_hours == 0 {
            anyhow::bail!("SWEEP_INTERVAL_HOURS must be at least 1");
        }
        if self.sweep_interval_hours.checked_mul(SECS_PER_HOUR).is_none() {
            anyhow::bail!(
                "SWEEP_INTERVAL_HOURS is too large: {}",
                self.sweep_interval_hours
            );
        }
        if self.backlog_limit < 1 {
            anyhow::bail!("BACKLOG_LIMIT must be at least 1");
        }
        if self.replay_interval_secs <= self.dispatch_claim_ttl_secs {
            anyhow::bail!(
                "REPLAY_INTERVAL_SECS ({}) must exceed DISPATCH_CLAIM_TTL_SECS ({})",
                self.replay_interval_secs,
                self.dispatch_claim_ttl_secs
            );
        }
        Ok(())
    }

    /// Period between retention sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours.saturating_mul(SECS_PER_HOUR))
    }

    /// Period between backlog replays.
    pub fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs)
    }
}

/// Upper bound on the retention window (about 100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

const SECS_PER_HOUR: u64 = 60 * 60;
