use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::errors::{LedgerError, Result};

/// env switch that lets test environments book loans starting in the past
pub const ENV_ALLOW_PAST_BILLING_DATE: &str = "ALLOW_CREATE_LOAN_PAST_DATE";
pub const ENV_DELINQUENCY_THRESHOLD: &str = "LOAN_DELINQUENCY_THRESHOLD";
pub const ENV_MAX_ACTIVE_LOANS: &str = "LOAN_MAX_ACTIVE_LOANS";

/// lending policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// accept billing start dates before today
    pub allow_past_billing_date: bool,
    /// a user is delinquent once any active loan has more due installments than this
    pub delinquency_threshold: u32,
    /// cap on concurrently active loans per user, disabled when `None`
    pub max_active_loans: Option<u32>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl LedgerConfig {
    /// production policy
    pub fn standard() -> Self {
        Self {
            allow_past_billing_date: false,
            delinquency_threshold: 2,
            max_active_loans: None,
        }
    }

    /// standard policy with back-dated billing allowed, for seeding and tests
    pub fn testing() -> Self {
        Self {
            allow_past_billing_date: true,
            ..Self::standard()
        }
    }

    pub fn with_delinquency_threshold(mut self, threshold: u32) -> Self {
        self.delinquency_threshold = threshold;
        self
    }

    pub fn with_max_active_loans(mut self, max: u32) -> Self {
        self.max_active_loans = Some(max);
        self
    }

    /// standard policy overlaid with whatever the environment sets
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::standard();

        if let Some(raw) = lookup(ENV_ALLOW_PAST_BILLING_DATE) {
            config.allow_past_billing_date = parse_bool(ENV_ALLOW_PAST_BILLING_DATE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DELINQUENCY_THRESHOLD) {
            config.delinquency_threshold = parse_value(ENV_DELINQUENCY_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_ACTIVE_LOANS) {
            config.max_active_loans = Some(parse_value(ENV_MAX_ACTIVE_LOANS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Ok(true),
        "0" | "f" | "false" | "no" => Ok(false),
        other => Err(LedgerError::Validation {
            message: format!("{} must be a boolean, got '{}'", key, other),
        }),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| LedgerError::Validation {
        message: format!("{} has an invalid value '{}'", key, raw),
    })
}
