use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub timezone: Option<String>,
    pub max_body_bytes: Option<usize>,
    pub workers: Option<usize>,
    pub token_ttl_hours: Option<i64>,
    /// Comma separated list of origins allowed by CORS.
    pub cors_allowed_origins: Option<String>,
    /// Directory with the compiled front-end, served under `/`.
    pub static_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let mut config: Config = cfg.try_deserialize()?;

        if config.timezone.is_none() {
            config.timezone = Some("UTC".to_string());
        }

        config.validate()?;

        Ok(config)
    }

    /// Timezone used to decide which calendar day a booking belongs to.
    pub fn get_timezone(&self) -> Result<Tz, chrono_tz::ParseError> {
        let tz_str = self.timezone.as_deref().unwrap_or("UTC");
        tz_str.parse::<Tz>()
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.host.is_empty()
            || !self
                .host
                .chars()
                .all(|c| c.is_alphanumeric() || ".:-_".contains(c))
        {
            return Err(config::ConfigError::Message(
                "Invalid host format".to_string(),
            ));
        }

        if self.port < 1024 {
            return Err(config::ConfigError::Message(
                "Port must be 1024 or higher".to_string(),
            ));
        }

        if let Some(tz_str) = &self.timezone {
            if tz_str.parse::<Tz>().is_err() {
                return Err(config::ConfigError::Message(format!(
                    "Invalid timezone: {}",
                    tz_str
                )));
            }
        }

        // 64KB..50MB, bookings and services are small JSON documents
        if let Some(limit) = self.max_body_bytes {
            let min = 64 * 1024;
            let max = 50 * 1024 * 1024;
            if limit < min || limit > max {
                return Err(config::ConfigError::Message(format!(
                    "max_body_bytes must be between {} and {} bytes",
                    min, max
                )));
            }
        }

        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(config::ConfigError::Message(
                    "workers must be greater than zero".to_string(),
                ));
            }
        }

        if let Some(ttl) = self.token_ttl_hours {
            if !(1..=24 * 90).contains(&ttl) {
                return Err(config::ConfigError::Message(
                    "token_ttl_hours must be between 1 and 2160".to_string(),
                ));
            }
        }

        for origin in self.allowed_origins() {
            if Url::parse(&origin).is_err() {
                return Err(config::ConfigError::Message(format!(
                    "Invalid CORS origin: {}",
                    origin
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    pub fn effective_max_body_bytes(&self) -> usize {
        self.max_body_bytes.unwrap_or(1024 * 1024)
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    pub fn effective_token_ttl_hours(&self) -> i64 {
        self.token_ttl_hours.unwrap_or(24 * 7)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub sql_log: Option<bool>,
}

impl DatabaseSettings {
    pub fn default_from_url(url: String) -> Self {
        Self {
            url,
            max_connections: parse_env_var("DATABASE_MAX_CONNECTIONS"),
            min_connections: parse_env_var("DATABASE_MIN_CONNECTIONS"),
            connect_timeout_secs: parse_env_var("DATABASE_CONNECT_TIMEOUT_SECS"),
            acquire_timeout_secs: parse_env_var("DATABASE_ACQUIRE_TIMEOUT_SECS"),
            idle_timeout_secs: parse_env_var("DATABASE_IDLE_TIMEOUT_SECS"),
            sql_log: parse_env_var("DATABASE_SQL_LOG"),
        }
    }
}

fn parse_env_var<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok().and_then(|value| value.parse::<T>().ok())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        timezone: Some("Europe/Berlin".to_string()),
        max_body_bytes: None,
        workers: Some(1),
        token_ttl_hours: None,
        cors_allowed_origins: None,
        static_dir: None,
    }
}
