//! Engine configuration.
//!
//! Loaded from environment variables with fallback to defaults.
//!
//! | Variable                        | Default               |
//! |---------------------------------|-----------------------|
//! | `PAWN_MAX_LTV_BPS`              | `10000` (100%)        |
//! | `PAWN_ALLOW_CROSS_BRANCH`       | `false`               |
//! | `PAWN_PAYMENT_INTERVAL_DAYS`    | `30`                  |
//! | `PAWN_RENEWAL_INTEREST_POLICY`  | `remaining_principal` |
//! | `PAWN_LOAN_PREFIX`              | `LN`                  |
//! | `PAWN_PAYMENT_PREFIX`           | `PAY`                 |

use serde::{Deserialize, Serialize};
use std::env;

use pawn_core::money::Rate;
use pawn_core::{RenewalInterestPolicy, DEFAULT_PAYMENT_INTERVAL_DAYS};

/// Loan-to-value ratios above this are rejected as misconfiguration.
const MAX_LTV_BPS: u32 = 20_000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Principal may not exceed `appraised_value × max_loan_to_value`.
    pub max_loan_to_value: Rate,

    /// Whether an item may be pledged from a branch other than its own.
    pub allow_cross_branch: bool,

    /// Days between periodic payments for minimum-payment and installment plans.
    pub payment_interval_days: u32,

    /// How interest is recomputed on renewal.
    pub renewal_interest_policy: RenewalInterestPolicy,

    /// Prefix of loan numbers (`LN-20260131-0001`).
    pub loan_prefix: String,

    /// Prefix of payment numbers.
    pub payment_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_loan_to_value: Rate::from_bps(Rate::MAX_PERCENT_BPS),
            allow_cross_branch: false,
            payment_interval_days: DEFAULT_PAYMENT_INTERVAL_DAYS,
            renewal_interest_policy: RenewalInterestPolicy::default(),
            loan_prefix: "LN".to_string(),
            payment_prefix: "PAY".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            max_loan_to_value: match lookup("PAWN_MAX_LTV_BPS") {
                Some(raw) => Rate::from_bps(parse("PAWN_MAX_LTV_BPS", &raw)?),
                None => defaults.max_loan_to_value,
            },

            allow_cross_branch: match lookup("PAWN_ALLOW_CROSS_BRANCH") {
                Some(raw) => parse_bool("PAWN_ALLOW_CROSS_BRANCH", &raw)?,
                None => defaults.allow_cross_branch,
            },

            payment_interval_days: match lookup("PAWN_PAYMENT_INTERVAL_DAYS") {
                Some(raw) => parse("PAWN_PAYMENT_INTERVAL_DAYS", &raw)?,
                None => defaults.payment_interval_days,
            },

            renewal_interest_policy: match lookup("PAWN_RENEWAL_INTEREST_POLICY") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "PAWN_RENEWAL_INTEREST_POLICY",
                    value: raw,
                })?,
                None => defaults.renewal_interest_policy,
            },

            loan_prefix: lookup("PAWN_LOAN_PREFIX").unwrap_or(defaults.loan_prefix),

            payment_prefix: lookup("PAWN_PAYMENT_PREFIX").unwrap_or(defaults.payment_prefix),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ltv = self.max_loan_to_value.bps();
        if ltv == 0 || ltv > MAX_LTV_BPS {
            return Err(ConfigError::InvalidValue {
                key: "PAWN_MAX_LTV_BPS",
                value: ltv.to_string(),
            });
        }

        if self.payment_interval_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PAWN_PAYMENT_INTERVAL_DAYS",
                value: "0".to_string(),
            });
        }

        for (key, prefix) in [
            ("PAWN_LOAN_PREFIX", &self.loan_prefix),
            ("PAWN_PAYMENT_PREFIX", &self.payment_prefix),
        ] {
            let valid = !prefix.is_empty()
                && prefix.len() <= 8
                && prefix.chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: prefix.clone(),
                });
            }
        }

        if self.loan_prefix == self.payment_prefix {
            return Err(ConfigError::SharedPrefix(self.loan_prefix.clone()));
        }

        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Loan and payment numbers cannot share the prefix '{0}'")]
    SharedPrefix(String),
}
