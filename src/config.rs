use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_url: String,
    pub bus_url: String,
    pub mailgun_api_key: String,
    pub mailgun_domain: String,
    pub mailgun_from: String,
    pub mailgun_api_base: String,
    pub mail_timeout: Duration,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_host: String,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost".to_string()),
            bus_url: env::var("BUS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            mailgun_api_key: env::var("MAILGUN_API_KEY").unwrap_or_default(),
            mailgun_domain: env::var("MAILGUN_DOMAIN").unwrap_or_default(),
            mailgun_from: env::var("MAILGUN_FROM").unwrap_or_default(),
            mailgun_api_base: env::var("MAILGUN_API_BASE")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),
            mail_timeout: Duration::from_secs(
                env::var("MAIL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            ),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "text".to_string())
                .parse()?,
            metrics_enabled: env::var("METRICS_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
            metrics_host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            metrics_port: env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
        })
    }

    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }

    /// Mail is only delivered for real when an API key is configured.
    pub fn mail_dry_run(&self) -> bool {
        self.mailgun_api_key.is_empty()
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid metrics port")]
    InvalidPort,
    #[error("Invalid log format: {0} (expected \"text\" or \"json\")")]
    InvalidLogFormat(String),
}
