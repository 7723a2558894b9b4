// src/config.rs

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub api_key: String,
    pub api_secret: String,
    pub paper: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    pub base_url: String,
}

/// Loop cadence, decision and protection parameters. Durations are in seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub symbol: String,
    pub confidence_threshold: Decimal,
    pub shutdown_stop_loss_pct: Decimal,
    pub price_tick: Decimal,
    pub startup_retries: u32,
    pub startup_retry_delay_secs: u64,
    pub cycle_interval_secs: u64,
    pub market_closed_poll_secs: u64,
    pub missing_price_delay_secs: u64,
    pub error_recovery_delay_secs: u64,
    pub call_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl AgentConfig {
    pub fn startup_retry_delay(&self) -> Duration {
        Duration::from_secs(self.startup_retry_delay_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn market_closed_poll(&self) -> Duration {
        Duration::from_secs(self.market_closed_poll_secs)
    }

    pub fn missing_price_delay(&self) -> Duration {
        Duration::from_secs(self.missing_price_delay_secs)
    }

    pub fn error_recovery_delay(&self) -> Duration {
        Duration::from_secs(self.error_recovery_delay_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub oracle: OracleConfig,
    pub agent: AgentConfig,
}

impl AppConfig {
    /// Defaults, then `Settings.*` if present, then `APP__SECTION__KEY` variables.
    /// `ALPACA_API_KEY` / `ALPACA_API_SECRET` win over everything for credentials.
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name("Settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .set_override_option("broker.api_key", env::var("ALPACA_API_KEY").ok())?
            .set_override_option("broker.api_secret", env::var("ALPACA_API_SECRET").ok())?;

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("broker.api_key", "")?
            .set_default("broker.api_secret", "")?
            .set_default("broker.paper", true)?
            .set_default("oracle.base_url", "http://localhost:8000")?
            .set_default("agent.symbol", "AAPL")?
            .set_default("agent.confidence_threshold", "0.015")?
            .set_default("agent.shutdown_stop_loss_pct", "0.03")?
            .set_default("agent.price_tick", "0.01")?
            .set_default("agent.startup_retries", 20)?
            .set_default("agent.startup_retry_delay_secs", 10)?
            .set_default("agent.cycle_interval_secs", 300)?
            .set_default("agent.market_closed_poll_secs", 900)?
            .set_default("agent.missing_price_delay_secs", 60)?
            .set_default("agent.error_recovery_delay_secs", 60)?
            .set_default("agent.call_timeout_secs", 30)?
            .set_default("agent.shutdown_grace_secs", 120)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::defaults()
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("default config deserializes")
    }
}
