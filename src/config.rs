use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Process configuration for the rewards server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable API key authentication
    pub enable_auth: bool,
    /// Accepted API keys, never logged unsanitized
    pub api_keys: Vec<String>,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Enable log sanitization to prevent sensitive data exposure
    pub sanitize_logs: bool,
    /// Enable span events for requests
    pub log_requests: bool,
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const MIN_API_KEY_LEN: usize = 32;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            security: SecurityConfig {
                enable_auth: true,
                api_keys: Vec::new(),
                max_request_size: 64 * 1024,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/eloits".to_string(),
                postgres_enabled: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {} value", key))
        })
        .transpose()
}

impl EngineConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("ELOITS_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "ELOITS_PORT")? {
            config.server.port = port;
        }

        if let Some(enable_auth) = parse_var(&lookup, "ELOITS_ENABLE_AUTH")? {
            config.security.enable_auth = enable_auth;
        }
        if let Some(keys) = lookup("ELOITS_API_KEYS") {
            config.security.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(size) = parse_var(&lookup, "ELOITS_MAX_REQUEST_SIZE")? {
            config.security.max_request_size = size;
        }

        if let Some(url) = lookup("ELOITS_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        if let Some(enabled) = parse_var(&lookup, "ELOITS_POSTGRES_ENABLED")? {
            config.database.postgres_enabled = enabled;
        }

        if let Some(level) = lookup("ELOITS_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }
        if let Some(sanitize) = parse_var(&lookup, "ELOITS_SANITIZE_LOGS")? {
            config.logging.sanitize_logs = sanitize;
        }
        if let Some(log_requests) = parse_var(&lookup, "ELOITS_LOG_REQUESTS")? {
            config.logging.log_requests = log_requests;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }
        if self.security.max_request_size == 0 {
            return Err(anyhow::anyhow!("Maximum request size must be non-zero"));
        }

        if self.security.enable_auth {
            if self.security.api_keys.is_empty() {
                return Err(anyhow::anyhow!(
                    "Authentication is enabled but ELOITS_API_KEYS is empty"
                ));
            }
            if self.security.api_keys.iter().any(|k| k.len() < MIN_API_KEY_LEN) {
                return Err(anyhow::anyhow!(
                    "API keys must be at least {} characters",
                    MIN_API_KEY_LEN
                ));
            }
        } else {
            warn!("API authentication is disabled");
        }

        if self.database.postgres_enabled
            && !(self.database.postgres_url.starts_with("postgres://")
                || self.database.postgres_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "PostgreSQL URL must start with postgres:// or postgresql://"
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {} (expected one of {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    // Connection strings: hide the user-info part
    if let (Some(scheme_end), Some(at)) = (data.find("://"), data.rfind('@')) {
        if at > scheme_end {
            return format!("{}://***{}", &data[..scheme_end], &data[at..]);
        }
    }

    let sensitive_patterns = ["key", "token", "password", "secret", "credential", "auth"];
    let data_lower = data.to_lowercase();
    if sensitive_patterns.iter().any(|p| data_lower.contains(p)) {
        if data.len() > 20 {
            return format!("{}***{}", &data[..6], &data[data.len().saturating_sub(6)..]);
        }
        return format!(
            "{}***{}",
            &data[..data.len().min(2)],
            &data[data.len().saturating_sub(2)..]
        );
    }

    data.to_string()
}
