use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub booking: BookingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

/// Rate limiting is skipped when no url is set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self { brokers: None, topic: default_topic() }
    }
}

fn default_topic() -> String { "ride.notifications".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Treat token subjects as user ids instead of looking them up in `users`.
    #[serde(default)]
    pub subject_is_user_id: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub max_conflict_retries: u32,
    pub conflict_backoff_ms: u64,
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub otp: OtpConfig,
}

impl BookingConfig {
    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OtpConfig {
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Never set outside test environments.
    pub test_code: Option<String>,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self { code_length: default_code_length(), test_code: None }
    }
}

fn default_code_length() -> usize { 4 }

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_minute: 120 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // POOLRIDE__BOOKING__LOCK_TIMEOUT_MS=500 sets booking.lock_timeout_ms
            .add_source(config::Environment::with_prefix("POOLRIDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TOML: &str = include_str!("../../config/default.toml");

    fn parse(toml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_shipped_defaults_deserialize() {
        let config = parse(DEFAULT_TOML).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.booking.otp.code_length, 4);
        assert!(config.booking.otp.test_code.is_none());
        assert_eq!(config.kafka.topic, "ride.notifications");
        assert!(config.booking.max_conflict_retries >= 1);
    }

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/poolride"
            [auth]
            jwt_secret = "secret"
            [booking]
            max_conflict_retries = 5
            conflict_backoff_ms = 10
            lock_timeout_ms = 750
            "#,
        )
        .unwrap();

        assert!(config.redis.url.is_none());
        assert!(config.kafka.brokers.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.rate_limit.requests_per_minute, 120);
        assert_eq!(config.booking.lock_timeout(), Duration::from_millis(750));
        assert_eq!(config.booking.otp.code_length, 4);
        assert!(!config.auth.subject_is_user_id);
    }

    #[test]
    fn test_missing_required_section_fails() {
        assert!(parse("[server]\nport = 1").is_err());
    }
}
