//! Entry point for callers of the lending engine.
//!
//! [`Ledger`] wires the services over one store, one user directory and one
//! clock, and exposes loan origination, due inquiry, settlement and the
//! delinquency checks behind a single handle.

use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::delinquency::{DelinquencyEvaluator, EligibilityChecker};
use crate::errors::Result;
use crate::loan::LoanManager;
use crate::model::{
    CreateLoanPayload, CreateTransactionPayload, Loan, Payment, Transaction, TransactionInquiry,
};
use crate::payments::DueInquiry;
use crate::settlement::SettlementProcessor;
use crate::store::LedgerStore;
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus, TransactionId, UserId};
use crate::users::UserDirectory;
use crate::views::LoanView;

pub struct Ledger {
    config: LedgerConfig,
    loans: LoanManager,
    settlement: SettlementProcessor,
    delinquency: Arc<DelinquencyEvaluator>,
    eligibility: Arc<EligibilityChecker>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        time: Arc<SafeTimeProvider>,
        config: LedgerConfig,
    ) -> Self {
        let due = Arc::new(DueInquiry::new(store.clone(), time.clone()));
        let delinquency = Arc::new(DelinquencyEvaluator::new(store.clone(), due.clone(), &config));
        let eligibility = Arc::new(EligibilityChecker::new(
            store.clone(),
            delinquency.clone(),
            &config,
        ));
        let loans = LoanManager::new(
            store.clone(),
            users,
            eligibility.clone(),
            time.clone(),
            &config,
        );
        let settlement = SettlementProcessor::new(store, due, time);

        Self {
            config,
            loans,
            settlement,
            delinquency,
            eligibility,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn create_loan(&self, payload: CreateLoanPayload) -> Result<Loan> {
        self.loans.create_loan(payload)
    }

    pub fn get_loan(&self, id: LoanId) -> Result<Loan> {
        self.loans.get_loan(id)
    }

    pub fn list_loans(&self) -> Result<Vec<Loan>> {
        self.loans.list_loans()
    }

    pub fn list_loans_by_user(
        &self,
        user_id: UserId,
        status: Option<LoanStatus>,
    ) -> Result<Vec<Loan>> {
        self.loans.list_loans_by_user(user_id, status)
    }

    /// statement of a loan and its schedule
    pub fn loan_view(&self, id: LoanId) -> Result<LoanView> {
        let loan = self.loans.get_loan(id)?;
        let payments = self.loans.loan_payments(id)?;
        Ok(LoanView::from_loan(&loan, &payments))
    }

    pub fn inquire(&self, loan_id: LoanId) -> Result<Option<TransactionInquiry>> {
        self.settlement.inquire(loan_id)
    }

    pub fn settle(&self, payload: CreateTransactionPayload) -> Result<Option<Transaction>> {
        self.settlement.settle(payload)
    }

    pub fn is_delinquent(&self, user_id: UserId) -> Result<bool> {
        self.delinquency.is_delinquent(user_id)
    }

    pub fn check_eligibility(&self, user_id: UserId) -> Result<()> {
        self.eligibility.check_eligibility(user_id)
    }

    pub fn loan_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        self.loans.loan_payments(loan_id)
    }

    pub fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        self.loans.get_payment(id)
    }

    pub fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>> {
        self.loans.list_payments(status)
    }

    pub fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.settlement.get_transaction(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::errors::{ErrorKind, LedgerError};
    use crate::store::MemoryStore;
    use crate::users::MemoryUserDirectory;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use std::thread;

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 30, 0).unwrap()
    }

    struct Harness {
        ledger: Ledger,
        users: Arc<MemoryUserDirectory>,
        time: Arc<SafeTimeProvider>,
    }

    fn harness(config: LedgerConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(today())));
        let ledger = Ledger::new(store, users.clone(), time.clone(), config);
        Harness { ledger, users, time }
    }

    #[test]
    fn test_single_week_loan_scenario() {
        let h = harness(LedgerConfig::standard());
        let user = h.users.register("rina@example.com", "Rina", today()).unwrap();

        let loan = h
            .ledger
            .create_loan(CreateLoanPayload::weekly_flat(
                user.id,
                Money::from_major(1_000_000),
                Rate::from_percentage(10),
                1,
                today(),
            ))
            .unwrap();
        assert_eq!(loan.outstanding, Money::from(dec!(1001923.08)));

        let inquiry = h.ledger.inquire(loan.id).unwrap().unwrap();
        assert_eq!(inquiry.amount_due, loan.outstanding);
        assert_eq!(inquiry.due_date, today() + Duration::days(7));

        let transaction = h
            .ledger
            .settle(CreateTransactionPayload {
                loan_id: loan.id,
                amount: Money::from(dec!(1001923.08)),
            })
            .unwrap()
            .unwrap();
        assert_eq!(transaction.total_amount, loan.outstanding);

        let closed = h.ledger.get_loan(loan.id).unwrap();
        assert_eq!(closed.status, LoanStatus::Paid);
        assert_eq!(closed.outstanding, Money::ZERO);
        assert!(h.ledger.list_payments(Some(PaymentStatus::Active)).unwrap().is_empty());
        assert_eq!(h.ledger.get_transaction(transaction.id).unwrap(), transaction);
    }

    #[test]
    fn test_weekly_repayment_lifecycle() {
        let h = harness(LedgerConfig::standard());
        let user = h.users.register("rina@example.com", "Rina", today()).unwrap();
        let loan = h
            .ledger
            .create_loan(CreateLoanPayload::weekly_flat(
                user.id,
                Money::from_major(5_000_000),
                Rate::from_percentage(10),
                50,
                today(),
            ))
            .unwrap();

        let control = h.time.test_control().unwrap();
        let mut settled = Money::ZERO;
        for week in 1..=50 {
            let inquiry = h.ledger.inquire(loan.id).unwrap().unwrap();
            assert_eq!(inquiry.bills.len(), 1, "week {}", week);
            assert_eq!(inquiry.bills[0].payment_no, week);

            h.ledger
                .settle(CreateTransactionPayload {
                    loan_id: loan.id,
                    amount: inquiry.amount_due,
                })
                .unwrap()
                .unwrap();
            settled += inquiry.amount_due;
            assert!(!h.ledger.is_delinquent(user.id).unwrap());

            control.advance(Duration::days(7));
        }

        assert_eq!(settled, loan.outstanding);
        let view = h.ledger.loan_view(loan.id).unwrap();
        assert_eq!(view.status, LoanStatus::Paid);
        assert_eq!(view.installments.paid_count, 50);
        assert_eq!(view.financial.principal_paid, loan.amount);
        assert_eq!(view.metadata.version, 50);
    }

    #[test]
    fn test_missed_weeks_block_new_loans() {
        let h = harness(LedgerConfig::standard());
        let user = h.users.register("rina@example.com", "Rina", today()).unwrap();
        let payload = CreateLoanPayload::weekly_flat(
            user.id,
            Money::from_major(1_000),
            Rate::from_percentage(10),
            10,
            today(),
        );
        let loan = h.ledger.create_loan(payload.clone()).unwrap();

        h.time.test_control().unwrap().advance(Duration::days(14));
        assert!(h.ledger.is_delinquent(user.id).unwrap());

        let mut later = payload;
        later.billing_start_date = h.time.now();
        let err = h.ledger.create_loan(later.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ineligible);

        // catching up restores eligibility
        let inquiry = h.ledger.inquire(loan.id).unwrap().unwrap();
        assert_eq!(inquiry.bills.len(), 3);
        h.ledger
            .settle(CreateTransactionPayload {
                loan_id: loan.id,
                amount: inquiry.amount_due,
            })
            .unwrap()
            .unwrap();

        assert!(!h.ledger.is_delinquent(user.id).unwrap());
        assert!(h.ledger.check_eligibility(user.id).is_ok());
        assert!(h.ledger.create_loan(later).is_ok());
        let active = h.ledger.list_loans_by_user(user.id, Some(LoanStatus::Active)).unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_concurrent_settlements_pay_once() {
        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let ledger_at = |now: DateTime<Utc>| {
            let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(now)));
            Ledger::new(store.clone(), users.clone(), time, LedgerConfig::standard())
        };

        let user = users.register("rina@example.com", "Rina", today()).unwrap();
        let loan = ledger_at(today())
            .create_loan(CreateLoanPayload::weekly_flat(
                user.id,
                Money::from_major(1_000),
                Rate::from_percentage(10),
                3,
                today(),
            ))
            .unwrap();
        let amount = ledger_at(today()).inquire(loan.id).unwrap().unwrap().amount_due;

        // each worker holds its own handle over the shared store
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let users = users.clone();
                thread::spawn(move || {
                    let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(today())));
                    let ledger = Ledger::new(store, users, time, LedgerConfig::standard());
                    ledger.settle(CreateTransactionPayload {
                        loan_id: loan.id,
                        amount,
                    })
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(Some(_)) => committed += 1,
                // losers either conflict or find the next installment not yet due
                Ok(None) => {}
                Err(err) => assert!(
                    matches!(err, LedgerError::Conflict { .. }),
                    "unexpected error {}",
                    err
                ),
            }
        }

        assert_eq!(committed, 1);
        let stored = ledger_at(today()).get_loan(loan.id).unwrap();
        assert_eq!(stored.outstanding, loan.outstanding - amount);
        assert_eq!(stored.version, 1);
        assert_eq!(store.transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_lookups_surface_not_found() {
        let h = harness(LedgerConfig::standard());
        assert_eq!(h.ledger.get_loan(1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(h.ledger.loan_view(1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(h.ledger.get_payment(1).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(h.ledger.get_transaction(1).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(h.ledger.list_loans().unwrap().is_empty());
        assert!(!h.ledger.is_delinquent(1).unwrap());
        assert_eq!(h.ledger.config().delinquency_threshold, 2);
    }
}
