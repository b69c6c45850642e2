//! Configuration handling for resilient-db.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::ResolutionPolicy;
use crate::models::{DatabaseConfig, DatabaseConfigError};
use clap::{Parser, Subcommand};
use std::time::Duration;

pub const DEFAULT_DB_HOST: &str = "db";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_SSLMODE: &str = "disable";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// Resolution policy defaults
pub const DEFAULT_RESOLVE_ATTEMPTS: u32 = 3;
pub const DEFAULT_RESOLVE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 5_000;

/// 0 disables the health monitor.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 0;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if let Some(min) = self.min_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Command run by the binary once the first connection is established.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Resolve a connection and report the backend version
    Check,
    /// Look up a user by email address
    FindUser {
        #[arg(long)]
        email: String,
    },
    /// Create a user record (the password must already be hashed)
    CreateUser {
        #[arg(long)]
        user_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "USER_PASSWORD_HASH", hide_env_values = true)]
        password_hash: String,
    },
}

/// Configuration for resilient-db.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "resilient-db",
    about = "Resilient shared database connection with retrying resolution and scoped transactions",
    version,
    author
)]
pub struct Config {
    /// Full connection URL. Takes precedence over the DB_* parts.
    #[arg(long, value_name = "URL", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database host
    #[arg(long, default_value = DEFAULT_DB_HOST, env = "DB_HOST")]
    pub db_host: String,

    /// Database port
    #[arg(long, default_value_t = DEFAULT_DB_PORT, env = "DB_PORT")]
    pub db_port: u16,

    /// Database user
    #[arg(long, default_value = "", env = "DB_USER")]
    pub db_user: String,

    /// Database password
    #[arg(long, default_value = "", env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    /// Database name
    #[arg(long, default_value = "", env = "DB_NAME")]
    pub db_name: String,

    /// PostgreSQL sslmode
    #[arg(long, default_value = DEFAULT_DB_SSLMODE, env = "DB_SSLMODE")]
    pub db_sslmode: String,

    /// Maximum pooled connections behind the shared handle
    #[arg(long, env = "DB_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Pool acquire timeout in seconds
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS, env = "DB_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: u64,

    /// Maximum resolution attempts per call
    #[arg(long, default_value_t = DEFAULT_RESOLVE_ATTEMPTS, env = "DB_RESOLVE_ATTEMPTS")]
    pub resolve_attempts: u32,

    /// Fixed delay between resolution attempts in milliseconds
    #[arg(long, default_value_t = DEFAULT_RESOLVE_DELAY_MS, env = "DB_RESOLVE_DELAY_MS")]
    pub resolve_delay_ms: u64,

    /// Default resolution deadline in milliseconds when the caller sets none
    #[arg(long, default_value_t = DEFAULT_RESOLVE_TIMEOUT_MS, env = "DB_RESOLVE_TIMEOUT_MS")]
    pub resolve_timeout_ms: u64,

    /// Health check interval in seconds (0 disables the monitor)
    #[arg(
        long,
        default_value_t = DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
        env = "DB_HEALTH_CHECK_INTERVAL"
    )]
    pub health_check_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database_url: None,
            db_host: DEFAULT_DB_HOST.to_string(),
            db_port: DEFAULT_DB_PORT,
            db_user: String::new(),
            db_password: String::new(),
            db_name: String::new(),
            db_sslmode: DEFAULT_DB_SSLMODE.to_string(),
            max_connections: None,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            resolve_attempts: DEFAULT_RESOLVE_ATTEMPTS,
            resolve_delay_ms: DEFAULT_RESOLVE_DELAY_MS,
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            log_level: "info".to_string(),
            json_logs: false,
            command: None,
        }
    }

    /// Pool options assembled from the individual flags.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            acquire_timeout_secs: Some(self.acquire_timeout),
            ..PoolOptions::default()
        }
    }

    /// Build the establishment target.
    ///
    /// `database_url` wins; otherwise a PostgreSQL URL is assembled from the DB_* parts.
    pub fn database_config(&self) -> Result<DatabaseConfig, DatabaseConfigError> {
        match self.database_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => DatabaseConfig::new(url, self.pool_options()),
            None => DatabaseConfig::from_parts(
                &self.db_host,
                self.db_port,
                &self.db_user,
                &self.db_password,
                &self.db_name,
                &self.db_sslmode,
                self.pool_options(),
            ),
        }
    }

    /// Resolution policy; zero attempts are bumped to one.
    pub fn resolution_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            max_attempts: self.resolve_attempts.max(1),
            retry_delay: Duration::from_millis(self.resolve_delay_ms),
            default_timeout: Duration::from_millis(self.resolve_timeout_ms),
        }
    }

    /// Get the health check interval, if the monitor is enabled.
    pub fn health_check_interval_duration(&self) -> Option<Duration> {
        (self.health_check_interval > 0).then(|| Duration::from_secs(self.health_check_interval))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
