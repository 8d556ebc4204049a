use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::model::{
    CreateTransactionPayload, Loan, NewTransaction, Payment, Transaction, TransactionInquiry,
};
use crate::payments::{self, DueInquiry};
use crate::store::{LedgerStore, UnitOfWork};
use crate::types::{LoanId, LoanStatus, TransactionId, TransactionStatus};

/// settles due installments against a loan
pub struct SettlementProcessor {
    store: Arc<dyn LedgerStore>,
    due: Arc<DueInquiry>,
    time: Arc<SafeTimeProvider>,
}

impl SettlementProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        due: Arc<DueInquiry>,
        time: Arc<SafeTimeProvider>,
    ) -> Self {
        Self { store, due, time }
    }

    fn active_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let loan = self
            .store
            .loan(loan_id)
            .map_err(|err| LedgerError::from(err).with_loan(loan_id))?;
        Ok(loan.filter(Loan::is_active))
    }

    /// what must be paid now, `None` when nothing is due yet
    pub fn inquire(&self, loan_id: LoanId) -> Result<Option<TransactionInquiry>> {
        let loan = self
            .active_loan(loan_id)?
            .ok_or(LedgerError::LoanNotFound { loan_id })?;
        self.build_inquiry(loan)
    }

    fn build_inquiry(&self, loan: Loan) -> Result<Option<TransactionInquiry>> {
        let bills = self.due.due_payments(&loan)?;
        let due_date = match payments::latest_due_date(&bills) {
            Some(due_date) => due_date,
            None => return Ok(None),
        };

        Ok(Some(TransactionInquiry {
            loan_id: loan.id,
            amount_due: payments::total_due(&bills),
            due_date,
            loan,
            bills,
        }))
    }

    /// pay every due installment in one transaction
    ///
    /// The amount has to match the due total exactly. Returns `None` when the
    /// loan is closed or missing, or when nothing is due yet.
    pub fn settle(&self, payload: CreateTransactionPayload) -> Result<Option<Transaction>> {
        let loan = match self.active_loan(payload.loan_id)? {
            Some(loan) => loan,
            None => {
                debug!(loan_id = payload.loan_id, "no active loan to settle");
                return Ok(None);
            }
        };

        let inquiry = match self.build_inquiry(loan)? {
            Some(inquiry) => inquiry,
            None => {
                debug!(loan_id = payload.loan_id, "nothing due to settle");
                return Ok(None);
            }
        };

        if payload.amount != inquiry.amount_due {
            warn!(
                loan_id = inquiry.loan_id,
                amount_due = %inquiry.amount_due,
                provided = %payload.amount,
                "settlement amount mismatch"
            );
            return Err(LedgerError::AmountMismatch {
                loan_id: inquiry.loan_id,
                amount_due: inquiry.amount_due,
                provided: payload.amount,
            });
        }

        let outstanding = inquiry.loan.outstanding - inquiry.amount_due;
        if outstanding.is_negative() {
            return Err(LedgerError::Validation {
                message: format!(
                    "settling {} would leave loan {} with negative outstanding {}",
                    inquiry.amount_due, inquiry.loan_id, outstanding
                ),
            });
        }

        let loan_id = inquiry.loan_id;
        let mut uow = self
            .store
            .begin()
            .map_err(|err| LedgerError::from(err).with_loan(loan_id))?;
        let applied = self.apply(
            uow.as_mut(),
            &inquiry.loan,
            &inquiry.bills,
            inquiry.amount_due,
            outstanding,
        );
        let transaction = match applied {
            Ok(transaction) => transaction,
            Err(err) => {
                let err = err.with_loan(loan_id);
                warn!(loan_id, error = %err, "settlement rolled back");
                uow.rollback();
                return Err(err);
            }
        };
        if let Err(err) = uow.commit() {
            let err = LedgerError::from(err).with_loan(loan_id);
            warn!(loan_id, error = %err, "settlement rolled back at commit");
            return Err(err);
        }

        info!(
            loan_id,
            transaction_id = transaction.id,
            reference = %transaction.reference,
            amount = %transaction.total_amount,
            installments = inquiry.bills.len(),
            outstanding = %outstanding,
            "settlement committed"
        );
        Ok(Some(transaction))
    }

    fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        loan: &Loan,
        bills: &[Payment],
        amount: Money,
        outstanding: Money,
    ) -> Result<Transaction> {
        let now = self.time.now();
        let transaction = uow.insert_transaction(NewTransaction {
            reference: Uuid::new_v4(),
            loan_id: loan.id,
            total_amount: amount,
            // late fees are not charged yet
            penalty: Money::ZERO,
            status: TransactionStatus::Paid,
            paid_at: Some(now),
            created_at: now,
        })?;

        for bill in bills {
            uow.pay_payment(bill.id, transaction.id, now)?;
        }

        let status = if outstanding.is_zero() {
            LoanStatus::Paid
        } else {
            LoanStatus::Active
        };
        uow.update_loan_balance(loan.id, loan.version, outstanding, status)?;

        Ok(transaction)
    }

    pub fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.store
            .transaction(id)?
            .ok_or(LedgerError::TransactionNotFound { transaction_id: id })
    }
}
