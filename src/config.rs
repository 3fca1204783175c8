//! `Config::from_env()`: `dotenvy::dotenv().ok()` then
//! `env::var(...).unwrap_or_else(default).parse().unwrap_or(default)`
//! per numeric field (spec §6.3), plus `ConfigError::MissingEnv` for the two
//! adapter credential blocks, which are mandatory ambient infrastructure for
//! this engine (spec §4.A) rather than optional integrations.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::email::SmtpCredentials;
use crate::adapters::push::PushProviderConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub push: PushConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl SmtpConfig {
    pub fn to_credentials(&self) -> SmtpCredentials {
        SmtpCredentials {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            from: self.from.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl PushConfig {
    pub fn to_provider_config(&self) -> PushProviderConfig {
        PushProviderConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

/// Every cadence/attempt/timeout knob named in spec.md §6's config table.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    pub scan_period_seconds: u64,
    pub reminder_period_seconds: u64,
    pub worker_count: usize,
    pub max_attempts: i32,
    pub backoff_base_seconds: i64,
    pub backoff_cap_seconds: i64,
    pub visibility_timeout_seconds: i64,
    pub sos_countdown_seconds: u64,
    pub claim_batch: i64,
}

impl TimingConfig {
    pub fn scan_period(&self) -> Duration {
        Duration::from_secs(self.scan_period_seconds)
    }

    pub fn reminder_period(&self) -> Duration {
        Duration::from_secs(self.reminder_period_seconds)
    }

    pub fn sos_countdown(&self) -> Duration {
        Duration::from_secs(self.sos_countdown_seconds)
    }

    pub fn backoff_base(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.backoff_base_seconds)
    }

    pub fn backoff_cap(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.backoff_cap_seconds)
    }

    pub fn visibility_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.visibility_timeout_seconds)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/engine.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST")
                    .map_err(|_| ConfigError::MissingEnv("SMTP_HOST".to_string()))?,
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("SMTP_PORT".to_string()))?,
                username: env::var("SMTP_USERNAME")
                    .map_err(|_| ConfigError::MissingEnv("SMTP_USERNAME".to_string()))?,
                password: env::var("SMTP_PASSWORD")
                    .map_err(|_| ConfigError::MissingEnv("SMTP_PASSWORD".to_string()))?,
                from: env::var("SMTP_FROM")
                    .map_err(|_| ConfigError::MissingEnv("SMTP_FROM".to_string()))?,
            },
            push: PushConfig {
                endpoint: env::var("PUSH_PROVIDER_ENDPOINT")
                    .map_err(|_| ConfigError::MissingEnv("PUSH_PROVIDER_ENDPOINT".to_string()))?,
                api_key: env::var("PUSH_PROVIDER_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("PUSH_PROVIDER_API_KEY".to_string()))?,
                timeout_seconds: env::var("PUSH_PROVIDER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            timing: TimingConfig {
                scan_period_seconds: env::var("SCAN_PERIOD_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                reminder_period_seconds: env::var("REMINDER_PERIOD_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                worker_count: env::var("WORKER_COUNT")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .unwrap_or(8),
                max_attempts: env::var("MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                backoff_base_seconds: env::var("BACKOFF_BASE_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                backoff_cap_seconds: env::var("BACKOFF_CAP_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
                visibility_timeout_seconds: env::var("VISIBILITY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                sos_countdown_seconds: env::var("SOS_COUNTDOWN_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                claim_batch: env::var("CLAIM_BATCH")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                url: "sqlite://data/engine.db".to_string(),
                max_connections: 10,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                username: String::new(),
                password: String::new(),
                from: "alerts@example.com".to_string(),
            },
            push: PushConfig {
                endpoint: "http://localhost:9090/push".to_string(),
                api_key: String::new(),
                timeout_seconds: 10,
            },
            timing: TimingConfig {
                scan_period_seconds: 60,
                reminder_period_seconds: 300,
                worker_count: 8,
                max_attempts: 5,
                backoff_base_seconds: 30,
                backoff_cap_seconds: 1800,
                visibility_timeout_seconds: 60,
                sos_countdown_seconds: 5,
                claim_batch: 20,
            },
        }
    }
}
