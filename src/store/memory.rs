//! In-process ledger store.
//!
//! A unit of work stages its writes against a private copy of the tables so
//! invariant violations surface at the call that caused them. Commit replays
//! the staged writes onto the live tables under one write lock, re-checking
//! versions and payment states, and swaps the result in only if every write
//! still applies.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::debug;

use crate::decimal::Money;
use crate::model::{CreatePaymentPayload, Loan, NewLoan, NewTransaction, Payment, Transaction};
use crate::store::{LedgerStore, PaymentFilter, StoreError, UnitOfWork};
use crate::types::{
    LoanId, LoanStatus, PaymentId, PaymentStatus, TransactionId, UserId,
};

/// store operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Begin,
    Read,
    InsertLoan,
    InsertPayments,
    InsertTransaction,
    PayPayment,
    UpdateLoanBalance,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    loans: BTreeMap<LoanId, Loan>,
    payments: BTreeMap<PaymentId, Payment>,
    transactions: BTreeMap<TransactionId, Transaction>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertLoan(Loan),
    InsertPayments(Vec<Payment>),
    InsertTransaction(Transaction),
    PayPayment {
        payment_id: PaymentId,
        transaction_id: TransactionId,
        paid_at: DateTime<Utc>,
    },
    UpdateLoanBalance {
        loan_id: LoanId,
        expected_version: u64,
        outstanding: Money,
        status: LoanStatus,
    },
}

impl Tables {
    fn apply(&mut self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::InsertLoan(loan) => {
                self.loans.insert(loan.id, loan.clone());
            }
            Write::InsertPayments(payments) => {
                for payment in payments {
                    if !self.loans.contains_key(&payment.loan_id) {
                        return Err(StoreError::Constraint {
                            message: format!(
                                "installment {} references unknown loan {}",
                                payment.payment_no, payment.loan_id
                            ),
                        });
                    }
                    let duplicate = self.payments.values().any(|existing| {
                        existing.loan_id == payment.loan_id
                            && existing.payment_no == payment.payment_no
                    });
                    if duplicate {
                        return Err(StoreError::Constraint {
                            message: format!(
                                "loan {} already has installment {}",
                                payment.loan_id, payment.payment_no
                            ),
                        });
                    }
                    self.payments.insert(payment.id, payment.clone());
                }
            }
            Write::InsertTransaction(transaction) => {
                if !self.loans.contains_key(&transaction.loan_id) {
                    return Err(StoreError::Constraint {
                        message: format!(
                            "transaction references unknown loan {}",
                            transaction.loan_id
                        ),
                    });
                }
                self.transactions.insert(transaction.id, transaction.clone());
            }
            Write::PayPayment {
                payment_id,
                transaction_id,
                paid_at,
            } => {
                if !self.transactions.contains_key(transaction_id) {
                    return Err(StoreError::Constraint {
                        message: format!("unknown transaction {}", transaction_id),
                    });
                }
                let payment = self.payments.get_mut(payment_id).ok_or_else(|| {
                    StoreError::Constraint {
                        message: format!("unknown installment {}", payment_id),
                    }
                })?;
                if payment.status == PaymentStatus::Paid {
                    return Err(StoreError::Conflict {
                        message: format!(
                            "installment {} already paid by transaction {:?}",
                            payment_id, payment.transaction_id
                        ),
                    });
                }
                payment.status = PaymentStatus::Paid;
                payment.paid_at = Some(*paid_at);
                payment.transaction_id = Some(*transaction_id);
            }
            Write::UpdateLoanBalance {
                loan_id,
                expected_version,
                outstanding,
                status,
            } => {
                if outstanding.is_negative() {
                    return Err(StoreError::Constraint {
                        message: format!(
                            "loan {} outstanding would become {}",
                            loan_id, outstanding
                        ),
                    });
                }
                if outstanding.is_zero() != (*status == LoanStatus::Paid) {
                    return Err(StoreError::Constraint {
                        message: format!(
                            "loan {} status {:?} inconsistent with outstanding {}",
                            loan_id, status, outstanding
                        ),
                    });
                }
                let loan = self.loans.get_mut(loan_id).ok_or_else(|| StoreError::Constraint {
                    message: format!("unknown loan {}", loan_id),
                })?;
                if loan.version != *expected_version {
                    return Err(StoreError::Conflict {
                        message: format!(
                            "loan {} is at version {}, expected {}",
                            loan_id, loan.version, expected_version
                        ),
                    });
                }
                loan.outstanding = *outstanding;
                loan.status = *status;
                loan.version += 1;
            }
        }
        Ok(())
    }
}

/// thread-safe in-memory implementation of [`LedgerStore`]
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_loan_id: AtomicI64,
    next_payment_id: AtomicI64,
    next_transaction_id: AtomicI64,
    faults: Mutex<Vec<(StoreOp, StoreError)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_loan_id: AtomicI64::new(1),
            next_payment_id: AtomicI64::new(1),
            next_transaction_id: AtomicI64::new(1),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// make the next `op` fail with a backend error
    pub fn fail_next(&self, op: StoreOp) {
        self.inject_fault(
            op,
            StoreError::Backend {
                message: format!("injected failure on {:?}", op),
            },
        );
    }

    /// make the next `op` fail with `error`
    pub fn inject_fault(&self, op: StoreOp, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push((op, error));
        }
    }

    /// every settlement transaction, ordered by id
    pub fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self.read()?.transactions.values().cloned().collect())
    }

    fn check_fault(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        match faults.iter().position(|(pending, _)| *pending == op) {
            Some(index) => Err(faults.remove(index).1),
            None => Ok(()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| poisoned())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend {
        message: "store lock poisoned".to_string(),
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError> {
        self.check_fault(StoreOp::Begin)?;
        let working = self.read()?.clone();
        Ok(Box::new(MemoryUnitOfWork {
            store: self,
            working,
            writes: Vec::new(),
            aborted: false,
        }))
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self.read()?.loans.get(&id).cloned())
    }

    fn loans(&self) -> Result<Vec<Loan>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self.read()?.loans.values().cloned().collect())
    }

    fn loans_by_user(
        &self,
        user_id: UserId,
        status: Option<LoanStatus>,
    ) -> Result<Vec<Loan>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self
            .read()?
            .loans
            .values()
            .filter(|loan| loan.user_id == user_id)
            .filter(|loan| status.map_or(true, |s| loan.status == s))
            .cloned()
            .collect())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self.read()?.payments.get(&id).cloned())
    }

    fn payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self
            .read()?
            .payments
            .values()
            .filter(|payment| status.map_or(true, |s| payment.status == s))
            .cloned()
            .collect())
    }

    fn payments_by_loan(
        &self,
        loan_id: LoanId,
        filter: PaymentFilter,
    ) -> Result<Vec<Payment>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        let mut payments: Vec<Payment> = self
            .read()?
            .payments
            .values()
            .filter(|payment| payment.loan_id == loan_id && filter.matches(payment))
            .cloned()
            .collect();
        payments.sort_by_key(|payment| payment.payment_no);
        Ok(payments)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        self.check_fault(StoreOp::Read)?;
        Ok(self.read()?.transactions.get(&id).cloned())
    }
}

struct MemoryUnitOfWork<'a> {
    store: &'a MemoryStore,
    working: Tables,
    writes: Vec<Write>,
    aborted: bool,
}

impl MemoryUnitOfWork<'_> {
    fn stage(&mut self, op: StoreOp, write: Write) -> Result<(), StoreError> {
        if self.aborted {
            return Err(StoreError::Backend {
                message: "unit of work already failed".to_string(),
            });
        }
        let result = self
            .store
            .check_fault(op)
            .and_then(|_| self.working.apply(&write));
        match result {
            Ok(()) => {
                self.writes.push(write);
                Ok(())
            }
            Err(err) => {
                self.aborted = true;
                Err(err)
            }
        }
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan, StoreError> {
        let loan = Loan {
            id: self.store.next_loan_id.fetch_add(1, Ordering::SeqCst),
            user_id: loan.user_id,
            amount: loan.amount,
            interest: loan.interest,
            interest_type: loan.interest_type,
            tenure: loan.tenure,
            tenure_type: loan.tenure_type,
            outstanding: loan.outstanding,
            status: LoanStatus::Active,
            created_at: loan.created_at,
            billing_start_date: loan.billing_start_date,
            version: 0,
        };
        self.stage(StoreOp::InsertLoan, Write::InsertLoan(loan.clone()))?;
        Ok(loan)
    }

    fn insert_payments(
        &mut self,
        payments: &[CreatePaymentPayload],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<Payment> = payments
            .iter()
            .map(|payload| Payment {
                id: self.store.next_payment_id.fetch_add(1, Ordering::SeqCst),
                loan_id: payload.loan_id,
                transaction_id: None,
                payment_no: payload.payment_no,
                due_date: payload.due_date,
                amount: payload.amount,
                interest: payload.interest,
                total_amount: payload.total_amount,
                status: PaymentStatus::Active,
                paid_at: None,
                created_at,
            })
            .collect();
        self.stage(StoreOp::InsertPayments, Write::InsertPayments(rows.clone()))?;
        Ok(rows)
    }

    fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let transaction = Transaction {
            id: self.store.next_transaction_id.fetch_add(1, Ordering::SeqCst),
            reference: transaction.reference,
            loan_id: transaction.loan_id,
            total_amount: transaction.total_amount,
            penalty: transaction.penalty,
            status: transaction.status,
            paid_at: transaction.paid_at,
            created_at: transaction.created_at,
        };
        self.stage(
            StoreOp::InsertTransaction,
            Write::InsertTransaction(transaction.clone()),
        )?;
        Ok(transaction)
    }

    fn pay_payment(
        &mut self,
        payment_id: PaymentId,
        transaction_id: TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.stage(
            StoreOp::PayPayment,
            Write::PayPayment {
                payment_id,
                transaction_id,
                paid_at,
            },
        )
    }

    fn update_loan_balance(
        &mut self,
        loan_id: LoanId,
        expected_version: u64,
        outstanding: Money,
        status: LoanStatus,
    ) -> Result<Loan, StoreError> {
        self.stage(
            StoreOp::UpdateLoanBalance,
            Write::UpdateLoanBalance {
                loan_id,
                expected_version,
                outstanding,
                status,
            },
        )?;
        self.working
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| StoreError::Constraint {
                message: format!("unknown loan {}", loan_id),
            })
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.aborted {
            return Err(StoreError::Backend {
                message: "cannot commit a failed unit of work".to_string(),
            });
        }
        self.store.check_fault(StoreOp::Commit)?;

        let mut live = self.store.tables.write().map_err(|_| poisoned())?;
        let mut next = live.clone();
        for write in &self.writes {
            next.apply(write)?;
        }
        *live = next;

        debug!(writes = self.writes.len(), "unit of work committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!(discarded = self.writes.len(), "unit of work rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::types::{InterestType, TenureType, TransactionStatus};
    use chrono::Duration;
    use uuid::Uuid;

    fn new_loan(user_id: UserId, outstanding: Money) -> NewLoan {
        let now = Utc::now();
        NewLoan {
            user_id,
            amount: outstanding,
            interest: Rate::ZERO,
            interest_type: InterestType::FlatAnnual,
            tenure: 2,
            tenure_type: TenureType::Weekly,
            outstanding,
            created_at: now,
            billing_start_date: now,
        }
    }

    fn installments(loan_id: LoanId, start: DateTime<Utc>) -> Vec<CreatePaymentPayload> {
        (1..=2)
            .map(|no| CreatePaymentPayload {
                loan_id,
                due_date: start + Duration::days(7 * no as i64),
                payment_no: no,
                amount: Money::from_major(50),
                interest: Money::ZERO,
                total_amount: Money::from_major(50),
            })
            .collect()
    }

    fn new_transaction(loan_id: LoanId, amount: Money) -> NewTransaction {
        let now = Utc::now();
        NewTransaction {
            reference: Uuid::new_v4(),
            loan_id,
            total_amount: amount,
            penalty: Money::ZERO,
            status: TransactionStatus::Paid,
            paid_at: Some(now),
            created_at: now,
        }
    }

    fn seeded(store: &MemoryStore) -> (Loan, Vec<Payment>) {
        let mut uow = store.begin().unwrap();
        let loan = uow.insert_loan(new_loan(1, Money::from_major(100))).unwrap();
        let payments = uow
            .insert_payments(&installments(loan.id, loan.billing_start_date), Utc::now())
            .unwrap();
        uow.commit().unwrap();
        (loan, payments)
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let mut uow = store.begin().unwrap();
        let loan = uow.insert_loan(new_loan(1, Money::from_major(100))).unwrap();

        assert!(store.loan(loan.id).unwrap().is_none());

        uow.commit().unwrap();
        assert_eq!(store.loan(loan.id).unwrap().unwrap().version, 0);
    }

    #[test]
    fn test_dropped_unit_of_work_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut uow = store.begin().unwrap();
            uow.insert_loan(new_loan(1, Money::from_major(100))).unwrap();
        }
        assert!(store.loans().unwrap().is_empty());
    }

    #[test]
    fn test_payments_by_loan_filters_and_orders() {
        let store = MemoryStore::new();
        let (loan, payments) = seeded(&store);

        let all = store.payments_by_loan(loan.id, PaymentFilter::default()).unwrap();
        assert_eq!(all.iter().map(|p| p.payment_no).collect::<Vec<_>>(), vec![1, 2]);

        let first_only = store
            .payments_by_loan(
                loan.id,
                PaymentFilter {
                    status: Some(PaymentStatus::Active),
                    due_before: Some(payments[0].due_date),
                },
            )
            .unwrap();
        assert_eq!(first_only.len(), 1);
        assert_eq!(first_only[0].payment_no, 1);
    }

    #[test]
    fn test_duplicate_installment_number_rejected() {
        let store = MemoryStore::new();
        let (loan, _) = seeded(&store);

        let mut uow = store.begin().unwrap();
        let err = uow
            .insert_payments(&installments(loan.id, loan.billing_start_date), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
        assert!(uow.commit().is_err());
    }

    #[test]
    fn test_stale_version_conflicts_at_commit() {
        let store = MemoryStore::new();
        let (loan, payments) = seeded(&store);

        // two writers read version 0
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();

        let trx = first
            .insert_transaction(new_transaction(loan.id, Money::from_major(50)))
            .unwrap();
        first.pay_payment(payments[0].id, trx.id, Utc::now()).unwrap();
        first
            .update_loan_balance(loan.id, 0, Money::from_major(50), LoanStatus::Active)
            .unwrap();

        let trx = second
            .insert_transaction(new_transaction(loan.id, Money::from_major(50)))
            .unwrap();
        second.pay_payment(payments[0].id, trx.id, Utc::now()).unwrap();
        second
            .update_loan_balance(loan.id, 0, Money::from_major(50), LoanStatus::Active)
            .unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.loan(loan.id).unwrap().unwrap();
        assert_eq!(stored.outstanding, Money::from_major(50));
        assert_eq!(stored.version, 1);
        assert_eq!(store.transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_paying_paid_installment_conflicts() {
        let store = MemoryStore::new();
        let (loan, payments) = seeded(&store);

        let mut uow = store.begin().unwrap();
        let trx = uow.insert_transaction(new_transaction(loan.id, Money::from_major(50))).unwrap();
        uow.pay_payment(payments[0].id, trx.id, Utc::now()).unwrap();
        let err = uow.pay_payment(payments[0].id, trx.id, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_balance_status_invariant_enforced() {
        let store = MemoryStore::new();
        let (loan, _) = seeded(&store);

        let mut uow = store.begin().unwrap();
        let err = uow
            .update_loan_balance(loan.id, 0, Money::ZERO, LoanStatus::Active)
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));

        let mut uow = store.begin().unwrap();
        let err = uow
            .update_loan_balance(loan.id, 0, Money::from_major(-1), LoanStatus::Active)
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
    }

    #[test]
    fn test_injected_faults_fire_once() {
        let store = MemoryStore::new();
        store.inject_fault(
            StoreOp::Read,
            StoreError::Unavailable {
                message: "timeout".to_string(),
            },
        );

        assert!(matches!(store.loans(), Err(StoreError::Unavailable { .. })));
        assert!(store.loans().is_ok());
    }
}
