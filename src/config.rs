use crate::domain::retention::RetentionPolicy;
use crate::domain::sampling::SamplingPolicy;
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Delete every stored message before serving (administrative wipe)
    #[arg(long, env = "GEOFEED_PURGE_ON_START", default_value_t = false)]
    pub purge_on_start: bool,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub feed: FeedConfig,

    #[command(flatten)]
    pub retention: RetentionConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,

    #[command(flatten)]
    pub seed: SeedConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long = "server-host", env = "GEOFEED_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long = "server-port", env = "GEOFEED_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (health checks)
    #[arg(long = "server-mgmt-port", env = "GEOFEED_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long = "server-shutdown-timeout-secs", env = "GEOFEED_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Expose administrative endpoints (purge) on the public router
    #[arg(long = "server-admin-enabled", env = "GEOFEED_ADMIN_ENABLED", default_value_t = false)]
    pub admin_enabled: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// Which store implementation to use
    #[arg(long = "store-backend", env = "GEOFEED_STORE_BACKEND", value_enum, default_value_t = StoreBackend::Postgres)]
    pub backend: StoreBackend,

    /// Database connection URL (required for the postgres backend)
    #[arg(long = "database-url", env = "GEOFEED_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "GEOFEED_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle pooled connections
    #[arg(long = "db-min-connections", env = "GEOFEED_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// Seconds to wait when acquiring a pooled connection
    #[arg(long = "db-acquire-timeout-secs", env = "GEOFEED_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Connection attempts at startup before giving up
    #[arg(long = "db-connect-attempts", env = "GEOFEED_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,

    /// Timeout for the readiness probe's store ping, in milliseconds
    #[arg(long = "db-ping-timeout-ms", env = "GEOFEED_DB_PING_TIMEOUT_MS", default_value_t = 2000)]
    pub ping_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct FeedConfig {
    /// Age in seconds below which a message counts as fresh
    #[arg(long = "feed-fresh-window-secs", env = "GEOFEED_FRESH_WINDOW_SECS", default_value_t = 3600)]
    pub fresh_window_secs: u64,

    /// Share of each sample reserved for fresh messages, in percent
    #[arg(long = "feed-fresh-percent", env = "GEOFEED_FRESH_PERCENT", default_value_t = 20)]
    pub fresh_percent: u8,

    /// Largest sample a client may request
    #[arg(long = "feed-max-sample-size", env = "GEOFEED_MAX_SAMPLE_SIZE", default_value_t = 200)]
    pub max_sample_size: usize,
}

#[derive(Clone, Debug, Args)]
pub struct RetentionConfig {
    /// How often to run the retention sweep
    #[arg(long = "retention-sweep-interval-secs", env = "GEOFEED_SWEEP_INTERVAL_SECS", default_value_t = 15)]
    pub sweep_interval_secs: u64,

    /// Grace period, quota unit and maximum voting window, in seconds
    #[arg(long = "retention-quota-period-secs", env = "GEOFEED_QUOTA_PERIOD_SECS", default_value_t = 3600)]
    pub quota_period_secs: u64,

    /// Votes a message must earn per quota period of age
    #[arg(long = "retention-votes-per-period", env = "GEOFEED_VOTES_PER_PERIOD", default_value_t = 5.0)]
    pub votes_per_period: f64,

    /// Number of messages read per scan page
    #[arg(long = "retention-scan-batch-size", env = "GEOFEED_SCAN_BATCH_SIZE", default_value_t = 500)]
    pub scan_batch_size: usize,

    /// Re-evaluations of a message whose votes changed mid-sweep
    #[arg(long = "retention-conflict-retries", env = "GEOFEED_CONFLICT_RETRIES", default_value_t = 3)]
    pub conflict_retries: usize,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client address
    #[arg(long = "rate-limit-per-second", env = "GEOFEED_RATE_LIMIT_PER_SECOND", default_value_t = 20)]
    pub per_second: u32,

    /// Burst allowance per client address
    #[arg(long = "rate-limit-burst", env = "GEOFEED_RATE_LIMIT_BURST", default_value_t = 40)]
    pub burst: u32,
}

/// Bulk-loads demo content at startup.
#[derive(Clone, Debug, Args)]
pub struct SeedConfig {
    /// Text file to seed the store from, one message per non-empty line
    #[arg(long = "seed-file", env = "GEOFEED_SEED_FILE")]
    pub file: Option<PathBuf>,

    /// Longitude seeded messages are scattered around
    #[arg(long = "seed-center-lng", env = "GEOFEED_SEED_CENTER_LNG", default_value_t = 0.0, allow_negative_numbers = true)]
    pub center_lng: f64,

    /// Latitude seeded messages are scattered around
    #[arg(long = "seed-center-lat", env = "GEOFEED_SEED_CENTER_LAT", default_value_t = 0.0, allow_negative_numbers = true)]
    pub center_lat: f64,

    /// Maximum offset from the center, in degrees, on each axis
    #[arg(long = "seed-spread-deg", env = "GEOFEED_SEED_SPREAD_DEG", default_value_t = 0.05)]
    pub spread_deg: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long = "log-format", env = "GEOFEED_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces, metrics and logs are exported when set
    #[arg(long = "otlp-endpoint", env = "GEOFEED_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

impl FeedConfig {
    #[must_use]
    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            fresh_window: seconds(self.fresh_window_secs),
            fresh_fraction: f64::from(self.fresh_percent.min(100)) / 100.0,
        }
    }
}

impl RetentionConfig {
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy { period: seconds(self.quota_period_secs.max(1)), votes_per_period: self.votes_per_period }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            mgmt_port: 9090,
            shutdown_timeout_secs: 5,
            admin_enabled: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            database_url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            connect_attempts: 5,
            ping_timeout_ms: 2000,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { fresh_window_secs: 3600, fresh_percent: 20, max_sample_size: 200 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 15,
            quota_period_secs: 3600,
            votes_per_period: 5.0,
            scan_batch_size: 500,
            conflict_retries: 3,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_second: 20, burst: 40 }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { file: None, center_lng: 0.0, center_lat: 0.0, spread_deg: 0.05 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_format: LogFormat::Text, otlp_endpoint: None }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            purge_on_start: false,
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            feed: FeedConfig::default(),
            retention: RetentionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}
