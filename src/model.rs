use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{
    InterestType, LoanId, LoanStatus, PaymentId, PaymentStatus, TenureType, TransactionId,
    TransactionStatus, UserId, MAX_TENURE,
};

/// borrower record, owned by the user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// installment loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    /// principal
    pub amount: Money,
    pub interest: Rate,
    pub interest_type: InterestType,
    pub tenure: u32,
    pub tenure_type: TenureType,
    pub outstanding: Money,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub billing_start_date: DateTime<Utc>,
    /// bumped on every balance update
    pub version: u64,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

impl fmt::Display for Loan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loan ID: {}", self.id)?;
        writeln!(f, "User ID: {}", self.user_id)?;
        writeln!(f, "Amount: {}", self.amount.round_currency())?;
        writeln!(f, "Outstanding: {}", self.outstanding.round_currency())?;
        writeln!(f, "Interest: {}", self.interest)?;
        writeln!(f, "Interest Type: {}", self.interest_type)?;
        writeln!(f, "Tenure: {} {}", self.tenure, self.tenure_type)?;
        writeln!(f, "Status: {:?}", self.status)?;
        writeln!(f, "Created At: {}", self.created_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Billing Start Date: {}", self.billing_start_date.format("%Y-%m-%d"))
    }
}

/// one scheduled installment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub transaction_id: Option<TransactionId>,
    pub payment_no: u32,
    pub due_date: DateTime<Utc>,
    /// principal share
    pub amount: Money,
    /// interest share
    pub interest: Money,
    pub total_amount: Money,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// settlement of one or more installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference: Uuid,
    pub loan_id: LoanId,
    pub total_amount: Money,
    pub penalty: Money,
    pub status: TransactionStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// request to open a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLoanPayload {
    pub user_id: UserId,
    pub amount: Money,
    pub interest: Rate,
    pub interest_type: InterestType,
    pub tenure: u32,
    pub tenure_type: TenureType,
    pub billing_start_date: DateTime<Utc>,
}

impl CreateLoanPayload {
    /// weekly flat-annual loan, the only product currently priced
    pub fn weekly_flat(
        user_id: UserId,
        amount: Money,
        interest: Rate,
        tenure: u32,
        billing_start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            amount,
            interest,
            interest_type: InterestType::FlatAnnual,
            tenure,
            tenure_type: TenureType::Weekly,
            billing_start_date,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LedgerError::Validation {
                message: format!("loan amount must be positive, got {}", self.amount),
            });
        }
        if self.tenure == 0 {
            return Err(LedgerError::Validation {
                message: "tenure must be at least one period".to_string(),
            });
        }
        if self.tenure > MAX_TENURE {
            return Err(LedgerError::Validation {
                message: format!(
                    "tenure {} exceeds the maximum of {} periods",
                    self.tenure, MAX_TENURE
                ),
            });
        }
        if self.interest.is_negative() {
            return Err(LedgerError::Validation {
                message: format!("interest rate cannot be negative, got {}", self.interest),
            });
        }
        Ok(())
    }
}

/// loan row before the store assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub user_id: UserId,
    pub amount: Money,
    pub interest: Rate,
    pub interest_type: InterestType,
    pub tenure: u32,
    pub tenure_type: TenureType,
    pub outstanding: Money,
    pub created_at: DateTime<Utc>,
    pub billing_start_date: DateTime<Utc>,
}

/// one installment to insert for a freshly created loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePaymentPayload {
    pub loan_id: LoanId,
    pub due_date: DateTime<Utc>,
    pub payment_no: u32,
    pub amount: Money,
    pub interest: Money,
    pub total_amount: Money,
}

impl CreatePaymentPayload {
    pub fn validate(&self) -> Result<()> {
        if self.loan_id <= 0 {
            return Err(LedgerError::InvalidPayment {
                message: format!("invalid loan id {}", self.loan_id),
            });
        }
        if self.payment_no == 0 {
            return Err(LedgerError::InvalidPayment {
                message: "payment number must start at 1".to_string(),
            });
        }
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidPayment {
                message: format!(
                    "installment {} principal must be positive, got {}",
                    self.payment_no, self.amount
                ),
            });
        }
        if self.interest.is_negative() {
            return Err(LedgerError::InvalidPayment {
                message: format!(
                    "installment {} interest cannot be negative",
                    self.payment_no
                ),
            });
        }
        if self.total_amount != self.amount + self.interest {
            return Err(LedgerError::InvalidPayment {
                message: format!(
                    "installment {} total {} does not equal principal plus interest",
                    self.payment_no, self.total_amount
                ),
            });
        }
        Ok(())
    }
}

/// settlement row before the store assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub reference: Uuid,
    pub loan_id: LoanId,
    pub total_amount: Money,
    pub penalty: Money,
    pub status: TransactionStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// request to settle whatever is currently due on a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransactionPayload {
    pub loan_id: LoanId,
    pub amount: Money,
}

/// what a borrower must pay right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInquiry {
    pub loan_id: LoanId,
    pub amount_due: Money,
    /// latest due date among the bills
    pub due_date: DateTime<Utc>,
    pub loan: Loan,
    pub bills: Vec<Payment>,
}

impl TransactionInquiry {
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
