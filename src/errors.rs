use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::store::StoreError;
use crate::types::{LoanId, PaymentId, TransactionId, UserId};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("billing start date {billing_start_date} is before today ({today})")]
    InvalidBillingDate {
        billing_start_date: NaiveDate,
        today: NaiveDate,
    },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("invalid installment payload: {message}")]
    InvalidPayment {
        message: String,
    },

    #[error("user not found: {user_id}")]
    UserNotFound {
        user_id: UserId,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("payment not found: {payment_id}")]
    PaymentNotFound {
        payment_id: PaymentId,
    },

    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        transaction_id: TransactionId,
    },

    #[error("user {user_id} is not eligible for a new loan: {reason}")]
    UserNotEligible {
        user_id: UserId,
        reason: String,
    },

    #[error("amount mismatch on loan {loan_id}: due {amount_due}, provided {provided}")]
    AmountMismatch {
        loan_id: LoanId,
        amount_due: Money,
        provided: Money,
    },

    #[error("concurrent modification{}: {message}", scope(.loan_id, &None))]
    Conflict {
        loan_id: Option<LoanId>,
        message: String,
    },

    #[error("not implemented: {feature}")]
    NotImplemented {
        feature: String,
    },

    #[error("store error{}: {source}", scope(.loan_id, .user_id))]
    Store {
        loan_id: Option<LoanId>,
        user_id: Option<UserId>,
        #[source]
        source: StoreError,
    },
}

fn scope(loan_id: &Option<LoanId>, user_id: &Option<UserId>) -> String {
    match (loan_id, user_id) {
        (Some(loan_id), Some(user_id)) => format!(" on loan {} of user {}", loan_id, user_id),
        (Some(loan_id), None) => format!(" on loan {}", loan_id),
        (None, Some(user_id)) => format!(" for user {}", user_id),
        (None, None) => String::new(),
    }
}

/// coarse classification a caller can map onto its own status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Ineligible,
    AmountMismatch,
    Conflict,
    NotImplemented,
    Unavailable,
    Store,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidBillingDate { .. }
            | LedgerError::Validation { .. }
            | LedgerError::InvalidPayment { .. } => ErrorKind::Validation,
            LedgerError::UserNotFound { .. }
            | LedgerError::LoanNotFound { .. }
            | LedgerError::PaymentNotFound { .. }
            | LedgerError::TransactionNotFound { .. } => ErrorKind::NotFound,
            LedgerError::UserNotEligible { .. } => ErrorKind::Ineligible,
            LedgerError::AmountMismatch { .. } => ErrorKind::AmountMismatch,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::NotImplemented { .. } => ErrorKind::NotImplemented,
            LedgerError::Store {
                source: StoreError::Unavailable { .. },
                ..
            } => ErrorKind::Unavailable,
            LedgerError::Store { .. } => ErrorKind::Store,
        }
    }

    /// tag store and conflict errors with the loan they were raised for
    pub fn with_loan(self, id: LoanId) -> Self {
        match self {
            LedgerError::Store {
                loan_id: None,
                user_id,
                source,
            } => LedgerError::Store {
                loan_id: Some(id),
                user_id,
                source,
            },
            LedgerError::Conflict {
                loan_id: None,
                message,
            } => LedgerError::Conflict {
                loan_id: Some(id),
                message,
            },
            other => other,
        }
    }

    /// tag store errors with the user they were raised for
    pub fn with_user(self, id: UserId) -> Self {
        match self {
            LedgerError::Store {
                loan_id,
                user_id: None,
                source,
            } => LedgerError::Store {
                loan_id,
                user_id: Some(id),
                source,
            },
            other => other,
        }
    }

    /// whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Unavailable)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { message } => LedgerError::Conflict {
                loan_id: None,
                message,
            },
            other => LedgerError::Store {
                loan_id: None,
                user_id: None,
                source: other,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
