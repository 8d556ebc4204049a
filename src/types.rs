use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LedgerError, Result};

/// store-assigned identifiers
pub type UserId = i64;
pub type LoanId = i64;
pub type PaymentId = i64;
pub type TransactionId = i64;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// outstanding balance remains
    Active,
    /// fully settled
    Paid,
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Active,
    Paid,
}

/// settlement transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// awaiting funds
    Active,
    Paid,
}

/// how interest is charged over the tenure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestType {
    /// interest on the original principal for the whole tenure
    FlatAnnual,
    /// interest on the remaining principal each period
    ReducingAnnual,
}

impl fmt::Display for InterestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterestType::FlatAnnual => write!(f, "Flat Annual"),
            InterestType::ReducingAnnual => write!(f, "Reducing Annual"),
        }
    }
}

/// longest tenure a loan may be booked for, in periods
pub const MAX_TENURE: u32 = 1_040;

/// installment cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenureType {
    Weekly,
    Monthly,
}

impl TenureType {
    /// length of one installment period
    pub fn period(&self) -> Result<Duration> {
        match self {
            TenureType::Weekly => Ok(Duration::days(7)),
            TenureType::Monthly => Err(LedgerError::NotImplemented {
                feature: "monthly tenure".to_string(),
            }),
        }
    }

    /// number of periods in one year
    pub fn periods_per_year(&self) -> Result<Decimal> {
        match self {
            TenureType::Weekly => Ok(Decimal::from(52)),
            TenureType::Monthly => Err(LedgerError::NotImplemented {
                feature: "monthly tenure".to_string(),
            }),
        }
    }

    /// tenure expressed in years
    pub fn years(&self, tenure: u32) -> Result<Decimal> {
        Ok(Decimal::from(tenure) / self.periods_per_year()?)
    }
}

impl fmt::Display for TenureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenureType::Weekly => write!(f, "Weeks"),
            TenureType::Monthly => write!(f, "Months"),
        }
    }
}
