//! Persistence seam for loans, installments and settlement transactions.
//!
//! Reads go straight to a [`LedgerStore`]. Every multi-row mutation goes
//! through a [`UnitOfWork`] that either commits as a whole or leaves no trace.
//! Dropping a unit of work without committing rolls it back.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::decimal::Money;
use crate::model::{CreatePaymentPayload, Loan, NewLoan, NewTransaction, Payment, Transaction};
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus, TransactionId, UserId};

pub use memory::{MemoryStore, StoreOp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// a row changed underneath an optimistic update
    #[error("write conflict: {message}")]
    Conflict {
        message: String,
    },

    /// the backend did not answer in time or is down
    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
    },

    /// a write would break a table invariant
    #[error("constraint violation: {message}")]
    Constraint {
        message: String,
    },

    #[error("store failure: {message}")]
    Backend {
        message: String,
    },
}

/// installment query filter
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    /// inclusive upper bound on due date
    pub due_before: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.map_or(true, |s| payment.status == s)
            && self.due_before.map_or(true, |d| payment.due_date <= d)
    }
}

/// read side of the ledger tables plus the unit-of-work factory
pub trait LedgerStore: Send + Sync {
    /// open an atomic unit of work
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError>;

    fn loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError>;

    fn loans(&self) -> Result<Vec<Loan>, StoreError>;

    fn loans_by_user(
        &self,
        user_id: UserId,
        status: Option<LoanStatus>,
    ) -> Result<Vec<Loan>, StoreError>;

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    fn payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, StoreError>;

    /// installments of one loan, ordered by payment number
    fn payments_by_loan(
        &self,
        loan_id: LoanId,
        filter: PaymentFilter,
    ) -> Result<Vec<Payment>, StoreError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;
}

/// staged writes that become visible together on commit
pub trait UnitOfWork {
    /// insert a loan at version 0 and return it with its assigned id
    fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan, StoreError>;

    fn insert_payments(
        &mut self,
        payments: &[CreatePaymentPayload],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Payment>, StoreError>;

    fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// mark an active installment paid and link it to a transaction
    fn pay_payment(
        &mut self,
        payment_id: PaymentId,
        transaction_id: TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// set outstanding and status if the loan is still at `expected_version`
    fn update_loan_balance(
        &mut self,
        loan_id: LoanId,
        expected_version: u64,
        outstanding: Money,
        status: LoanStatus,
    ) -> Result<Loan, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>);
}
