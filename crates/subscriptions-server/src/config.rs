use std::env;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub db_max_connections: u32,
    pub query_timeout: Duration,
    pub cors_origin: String,
    pub environment: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Plain text for local development, JSON lines everywhere else
        let log_format = match env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") => LogFormat::Text,
            _ if environment == "development" => LogFormat::Text,
            _ => LogFormat::Json,
        };

        Ok(Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/subscriptions.db".to_string()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            query_timeout: Duration::from_millis(
                env::var("QUERY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .context("QUERY_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            environment,
            log_format,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            db_max_connections: 1,
            query_timeout: Duration::from_secs(5),
            cors_origin: "http://localhost:3000".to_string(),
            environment: "test".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
