//! Configuration module for statement-service.

use chrono_tz::Tz;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StatementServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub cooldown: CooldownConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Bank provider HTTP API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub statement_timeout: Duration,
    pub client_info_timeout: Duration,
    /// Pause between pages of one statement fetch.
    pub page_pause: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.monobank.ua".to_string(),
            statement_timeout: Duration::from_secs(20),
            client_info_timeout: Duration::from_secs(10),
            page_pause: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownBackend {
    Memory,
    Redis,
}

impl FromStr for CooldownBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "COOLDOWN_BACKEND must be 'memory' or 'redis', got '{}'",
                other
            ))),
        }
    }
}

/// Per-credential cool-down between successful statement fetches.
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub backend: CooldownBackend,
    pub window_secs: u64,
    pub redis_url: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Zone used to interpret periods and print timestamps.
    pub timezone: Tz,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl StatementServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let provider_defaults = ProviderConfig::default();

        let backend = match env::var("COOLDOWN_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => CooldownBackend::Memory,
        };
        let redis_url = env::var("REDIS_URL").ok().map(Secret::new);
        if backend == CooldownBackend::Redis && redis_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REDIS_URL is required when COOLDOWN_BACKEND=redis"
            )));
        }

        let tz_name = env::var("REPORT_TIMEZONE").unwrap_or_else(|_| "Europe/Kyiv".to_string());
        let timezone = tz_name.parse::<Tz>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid REPORT_TIMEZONE '{}': {}", tz_name, e))
        })?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "statement-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2),
            },
            provider: ProviderConfig {
                base_url: env::var("PROVIDER_BASE_URL").unwrap_or(provider_defaults.base_url),
                statement_timeout: Duration::from_secs(env_parse(
                    "PROVIDER_STATEMENT_TIMEOUT_SECS",
                    20,
                )),
                client_info_timeout: Duration::from_secs(env_parse(
                    "PROVIDER_CLIENT_INFO_TIMEOUT_SECS",
                    10,
                )),
                page_pause: Duration::from_millis(env_parse("PROVIDER_PAGE_PAUSE_MS", 1000)),
            },
            cooldown: CooldownConfig {
                backend,
                window_secs: env_parse("COOLDOWN_SECS", 60),
                redis_url,
            },
            report: ReportConfig { timezone },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_backend_parses_case_insensitively() {
        assert_eq!("Redis".parse::<CooldownBackend>().unwrap(), CooldownBackend::Redis);
        assert_eq!(" memory ".parse::<CooldownBackend>().unwrap(), CooldownBackend::Memory);
        assert!("memcached".parse::<CooldownBackend>().is_err());
    }

    #[test]
    fn provider_defaults_match_api_limits() {
        let cfg = ProviderConfig::default();
        assert_eq!(cfg.statement_timeout, Duration::from_secs(20));
        assert_eq!(cfg.client_info_timeout, Duration::from_secs(10));
    }
}
