use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::moderation::{ModerationSettings, PipelineOptions};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub moderation: ModerationConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(value) => LogFormat::parse(&value)?,
            Err(_) => LogFormat::Compact,
        };

        let confidence_threshold: u8 = parse_var("MODERATION_CONFIDENCE_THRESHOLD", 80)?;
        if confidence_threshold > 100 {
            return Err(ConfigError::OutOfRange {
                var: "MODERATION_CONFIDENCE_THRESHOLD",
                value: confidence_threshold.to_string(),
            });
        }

        let similarity_threshold: f64 = parse_var("MODERATION_SIMILARITY_THRESHOLD", 95.0)?;
        if !(0.0..=100.0).contains(&similarity_threshold) {
            return Err(ConfigError::OutOfRange {
                var: "MODERATION_SIMILARITY_THRESHOLD",
                value: similarity_threshold.to_string(),
            });
        }

        let moderation = ModerationConfig {
            confidence_threshold,
            auto_approve_free: parse_flag("MODERATION_AUTO_APPROVE_FREE", true)?,
            auto_approve_paid: parse_flag("MODERATION_AUTO_APPROVE_PAID", true)?,
            automation_enabled: parse_flag("MODERATION_AUTOMATION_ENABLED", true)?,
            lookback_hours: parse_var("MODERATION_LOOKBACK_HOURS", 24)?,
            similarity_threshold,
            oracle_timeout_ms: parse_var("MODERATION_ORACLE_TIMEOUT_MS", 5_000)?,
        };

        let sync = SyncConfig {
            poll_interval_ms: parse_var("SYNC_POLL_INTERVAL_MS", 1_000)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            moderation,
            sync,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var, value }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Moderation dials; the settings part stays editable at runtime through the admin API.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub confidence_threshold: u8,
    pub auto_approve_free: bool,
    pub auto_approve_paid: bool,
    pub automation_enabled: bool,
    pub lookback_hours: u32,
    pub similarity_threshold: f64,
    pub oracle_timeout_ms: u64,
}

impl ModerationConfig {
    pub fn settings(&self) -> ModerationSettings {
        ModerationSettings {
            confidence_threshold: self.confidence_threshold,
            auto_approve_free: self.auto_approve_free,
            auto_approve_paid: self.auto_approve_paid,
            automation_enabled: self.automation_enabled,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            settings: self.settings(),
            similarity_threshold: self.similarity_threshold,
            lookback: chrono::Duration::hours(i64::from(self.lookback_hours)),
            oracle_timeout: Duration::from_millis(self.oracle_timeout_ms),
        }
    }
}

/// Status synchronizer cadence.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidNumber { var: &'static str, value: String },
    InvalidFlag { var: &'static str, value: String },
    OutOfRange { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json' (found '{value}')")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be numeric (found '{value}')")
            }
            ConfigError::InvalidFlag { var, value } => {
                write!(f, "{var} must be true or false (found '{value}')")
            }
            ConfigError::OutOfRange { var, value } => {
                write!(f, "{var} must be between 0 and 100 (found {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "MODERATION_CONFIDENCE_THRESHOLD",
            "MODERATION_AUTO_APPROVE_FREE",
            "MODERATION_AUTO_APPROVE_PAID",
            "MODERATION_AUTOMATION_ENABLED",
            "MODERATION_LOOKBACK_HOURS",
            "MODERATION_SIMILARITY_THRESHOLD",
            "MODERATION_ORACLE_TIMEOUT_MS",
            "SYNC_POLL_INTERVAL_MS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.moderation.settings(), ModerationSettings::default());
        assert_eq!(config.moderation.lookback_hours, 24);
        assert_eq!(config.moderation.similarity_threshold, 95.0);
        assert_eq!(
            config.moderation.pipeline_options().oracle_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_moderation_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MODERATION_CONFIDENCE_THRESHOLD", "90");
        env::set_var("MODERATION_AUTO_APPROVE_FREE", "off");
        env::set_var("APP_LOG_FORMAT", "json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.moderation.confidence_threshold, 90);
        assert!(!config.moderation.auto_approve_free);
        assert!(config.moderation.auto_approve_paid);
        assert_eq!(config.telemetry.format, LogFormat::Json);
        reset_env();
    }

    #[test]
    fn rejects_invalid_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MODERATION_CONFIDENCE_THRESHOLD", "150");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::OutOfRange { .. })
        ));

        reset_env();
        env::set_var("MODERATION_AUTOMATION_ENABLED", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag { .. })
        ));

        reset_env();
        env::set_var("SYNC_POLL_INTERVAL_MS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber { .. })
        ));
        reset_env();
    }
}
