//! Generator configuration and startup validation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::command::Instrument;

/// Which placed orders a cancel may target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Any order placed so far, including ones already cancelled.
    /// Exercises duplicate-cancel handling in the consumer.
    #[default]
    AnyPlaced,
    /// Only orders that have not been cancelled yet.
    LiveOnly,
}

impl fmt::Display for CancelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelPolicy::AnyPlaced => "any-placed",
            CancelPolicy::LiveOnly => "live-only",
        })
    }
}

impl FromStr for CancelPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any-placed" => Ok(CancelPolicy::AnyPlaced),
            "live-only" => Ok(CancelPolicy::LiveOnly),
            other => Err(ConfigError::UnknownCancelPolicy(other.to_string())),
        }
    }
}

/// Rejected configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("thread count must be positive")]
    NoThreads,

    #[error("instrument count must be positive")]
    NoInstruments,

    #[error("order count must be positive")]
    NoOrders,

    #[error("price range is empty: min {min} > max {max}")]
    PriceRange { min: u32, max: u32 },

    #[error("quantity range must start at 1 or above and be non-empty: [{min}, {max}]")]
    QuantityRange { min: u32, max: u32 },

    #[error("unknown cancel policy {0:?} (expected any-placed or live-only)")]
    UnknownCancelPolicy(String),
}

/// Configuration for one generated stream.
///
/// All ranges are inclusive. Same config with the same seed produces the
/// same stream byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Size of the consumer's worker pool
    pub num_threads: u32,
    /// Number of buy/sell/cancel lines to emit
    pub orders: u64,
    /// Size of the symbol universe (`SYM0 ..`)
    pub num_instruments: u32,
    /// RNG seed; drawn from OS entropy when absent
    pub seed: Option<u64>,
    pub price_min: u32,
    pub price_max: u32,
    pub qty_min: u32,
    pub qty_max: u32,
    pub cancel_policy: CancelPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_threads: 40,
            orders: 100_000,
            num_instruments: 5,
            seed: None,
            price_min: 100,
            price_max: 10_000,
            qty_min: 1,
            qty_max: 100,
            cancel_policy: CancelPolicy::AnyPlaced,
        }
    }
}

impl GeneratorConfig {
    /// Config with the given sizes and default ranges.
    pub fn new(num_threads: u32, orders: u64, num_instruments: u32) -> Self {
        Self {
            num_threads,
            orders,
            num_instruments,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_price_range(mut self, min: u32, max: u32) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    pub fn with_quantity_range(mut self, min: u32, max: u32) -> Self {
        self.qty_min = min;
        self.qty_max = max;
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// Check every field before any output is produced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.num_instruments == 0 {
            return Err(ConfigError::NoInstruments);
        }
        if self.orders == 0 {
            return Err(ConfigError::NoOrders);
        }
        if self.price_min > self.price_max {
            return Err(ConfigError::PriceRange { min: self.price_min, max: self.price_max });
        }
        if self.qty_min == 0 || self.qty_min > self.qty_max {
            return Err(ConfigError::QuantityRange { min: self.qty_min, max: self.qty_max });
        }
        Ok(())
    }

    /// The configured symbol set, `SYM0 ..= SYM{n-1}`.
    pub fn instruments(&self) -> impl Iterator<Item = Instrument> {
        (0..self.num_instruments).map(Instrument)
    }
}
