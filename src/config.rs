// 7.0 config.rs: all manager settings in one place. event retention, observer gas stipend,
// plan size limit.
// 7.1 the unsubscribe stipend is a fraction of the block gas limit, 1% by default.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    // Maximum number of events to retain in memory
    pub max_events: usize,
    // Log every event through tracing at info level instead of debug
    pub verbose: bool,
    // Ambient block gas limit observers are measured against
    pub block_gas_limit: u64,
    // Share of the block gas limit handed to an unsubscribe notification
    pub unsubscribe_gas_fraction: Decimal,
    // Upper bound on steps in one plan
    pub max_plan_actions: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            block_gas_limit: 30_000_000,
            unsubscribe_gas_fraction: dec!(0.01), // 1%
            max_plan_actions: 256,
        }
    }
}

impl ManagerConfig {
    pub fn development() -> Self {
        Self {
            verbose: true,
            ..Self::default()
        }
    }

    pub fn testnet() -> Self {
        Self {
            max_events: 10_000,
            ..Self::default()
        }
    }

    // smaller plans and a tighter event window for production
    pub fn mainnet() -> Self {
        Self {
            max_events: 50_000,
            max_plan_actions: 64,
            ..Self::default()
        }
    }

    // gas stipend for unsubscribe notifications, rounded down
    pub fn unsubscribe_gas_limit(&self) -> u64 {
        (Decimal::from(self.block_gas_limit) * self.unsubscribe_gas_fraction)
            .floor()
            .to_u64()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::InvalidEvents {
                reason: "Event log must retain at least one event".to_string(),
            });
        }

        if self.block_gas_limit == 0 {
            return Err(ConfigError::InvalidGas {
                reason: "Block gas limit must be positive".to_string(),
            });
        }

        if self.unsubscribe_gas_fraction <= Decimal::ZERO || self.unsubscribe_gas_fraction > Decimal::ONE {
            return Err(ConfigError::InvalidGas {
                reason: "Unsubscribe gas fraction must be in (0, 1]".to_string(),
            });
        }

        if self.unsubscribe_gas_limit() == 0 {
            return Err(ConfigError::InvalidGas {
                reason: "Unsubscribe stipend rounds down to zero".to_string(),
            });
        }

        if self.max_plan_actions == 0 {
            return Err(ConfigError::InvalidPlanLimit {
                reason: "Plans must allow at least one action".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid event settings: {reason}")]
    InvalidEvents { reason: String },

    #[error("Invalid gas settings: {reason}")]
    InvalidGas { reason: String },

    #[error("Invalid plan limit: {reason}")]
    InvalidPlanLimit { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ManagerConfig {
        match self {
            Environment::Development => ManagerConfig::development(),
            Environment::Testnet => ManagerConfig::testnet(),
            Environment::Mainnet => ManagerConfig::mainnet(),
        }
    }
}
