//! Configuration management for the field materials service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with FMR__ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{EngineConfig, StockPolicy};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    /// Stock policy and low balance threshold
    pub stock: StockConfig,

    /// Outbound alert delivery
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret shared with the identity provider that issues access tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StockConfig {
    /// Assignments draw from the warehouse pool instead of technician stock
    pub central_pool_enabled: bool,

    /// `LowBalance` fires when available stock drops below this
    pub low_stock_threshold: Decimal,
}

impl StockConfig {
    pub fn policy(&self) -> StockPolicy {
        if self.central_pool_enabled {
            StockPolicy::CentralPool
        } else {
            StockPolicy::TechnicianStock
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            policy: self.policy(),
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Alert emitter endpoint; delivery is disabled when unset
    pub webhook_url: Option<String>,

    /// HMAC key for the `X-Signature` header
    pub signing_secret: String,

    pub dispatch_interval_secs: u64,

    pub batch_size: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("FMR__ENVIRONMENT")
            .or_else(|_| std::env::var("FMR_ENVIRONMENT"))
            .unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("stock.central_pool_enabled", false)?
            .set_default("stock.low_stock_threshold", "5")?
            .set_default("alerts.signing_secret", "")?
            .set_default("alerts.dispatch_interval_secs", 30)?
            .set_default("alerts.batch_size", 50)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FMR__ prefix)
            .add_source(
                Environment::with_prefix("FMR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
