use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub broadcast: BroadcastConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "PARLEY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long, env = "PARLEY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for liveness and readiness probes
    #[arg(long, env = "PARLEY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks after a shutdown signal
    #[arg(long, env = "PARLEY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(id = "database_url", long = "database-url", env = "PARLEY_DATABASE_URL")]
    pub url: String,

    #[arg(long, env = "PARLEY_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    #[arg(long, env = "PARLEY_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    #[arg(long, env = "PARLEY_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    #[arg(long, env = "PARLEY_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "PARLEY_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key used to verify HS256 bearer tokens
    #[arg(long, env = "PARLEY_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client IP
    #[arg(long = "rate-limit-per-second", env = "PARLEY_RATE_LIMIT_PER_SECOND", default_value_t = 10)]
    pub per_second: u32,

    /// Burst allowance per client IP
    #[arg(long = "rate-limit-burst", env = "PARLEY_RATE_LIMIT_BURST", default_value_t = 30)]
    pub burst: u32,

    /// Proxy addresses whose X-Forwarded-For header is trusted
    #[arg(long = "trusted-proxies", env = "PARLEY_TRUSTED_PROXIES", value_delimiter = ',')]
    pub trusted_proxies: Vec<std::net::IpAddr>,
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis URL for cross-node event fan-out. Events stay in-process when unset.
    #[arg(id = "pubsub_url", long = "pubsub-url", env = "PARLEY_PUBSUB_URL")]
    pub url: Option<String>,

    /// Minimum reconnect backoff for the pubsub listener
    #[arg(long, env = "PARLEY_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum reconnect backoff for the pubsub listener
    #[arg(long, env = "PARLEY_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Number of messages returned per page
    #[arg(long, env = "PARLEY_PAGE_SIZE", default_value_t = 10)]
    pub page_size: i64,

    /// Maximum message body length in characters
    #[arg(long, env = "PARLEY_MAX_BODY_CHARS", default_value_t = 4000)]
    pub max_body_chars: usize,

    /// Maximum emoji length in characters
    #[arg(long, env = "PARLEY_MAX_EMOJI_CHARS", default_value_t = 32)]
    pub max_emoji_chars: usize,

    /// Maximum number of attachments on a single message
    #[arg(long, env = "PARLEY_MAX_ATTACHMENTS", default_value_t = 10)]
    pub max_attachments: usize,
}

#[derive(Clone, Debug, Args)]
pub struct BroadcastConfig {
    /// Capacity of each local event channel
    #[arg(long, env = "PARLEY_CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,

    /// How often channels without receivers are reclaimed
    #[arg(long, env = "PARLEY_CHANNEL_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the outbound frame buffer per socket
    #[arg(long, env = "PARLEY_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Maximum number of channels a single socket may subscribe to
    #[arg(long, env = "PARLEY_WS_MAX_SUBSCRIPTIONS", default_value_t = 256)]
    pub max_subscriptions: usize,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for each readiness check
    #[arg(long, env = "PARLEY_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub timeout_ms: u64,
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
    #[arg(long, env = "PARLEY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP gRPC endpoint for traces and metrics. Export is disabled when unset.
    #[arg(long, env = "PARLEY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_args() {
        let config = Config::try_parse_from([
            "parley-server",
            "--database-url",
            "postgres://localhost/parley",
            "--jwt-secret",
            "secret",
        ])
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.messaging.page_size, 10);
        assert_eq!(config.messaging.max_emoji_chars, 32);
        assert!(config.pubsub.url.is_none());
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
    }

    #[test]
    fn test_log_format_json() {
        let config = Config::try_parse_from([
            "parley-server",
            "--database-url",
            "postgres://localhost/parley",
            "--jwt-secret",
            "secret",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_trusted_proxies_are_comma_separated() {
        let config = Config::try_parse_from([
            "parley-server",
            "--database-url",
            "postgres://localhost/parley",
            "--jwt-secret",
            "secret",
            "--trusted-proxies",
            "10.0.0.1,::1",
        ])
        .unwrap();

        assert_eq!(config.rate_limit.trusted_proxies.len(), 2);
        assert!(config.rate_limit.trusted_proxies[1].is_loopback());
    }

    #[test]
    fn test_database_and_pubsub_urls_stay_separate() {
        let config = Config::try_parse_from([
            "parley-server",
            "--database-url",
            "postgres://localhost/parley",
            "--pubsub-url",
            "redis://localhost:6379",
            "--jwt-secret",
            "secret",
        ])
        .unwrap();

        assert_eq!(config.database.url, "postgres://localhost/parley");
        assert_eq!(config.pubsub.url.as_deref(), Some("redis://localhost:6379"));
    }
}
