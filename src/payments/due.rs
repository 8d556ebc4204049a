use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::model::{Loan, Payment};
use crate::store::{LedgerStore, PaymentFilter};
use crate::types::PaymentStatus;

/// finds the installments a borrower has to pay now
pub struct DueInquiry {
    store: Arc<dyn LedgerStore>,
    time: Arc<SafeTimeProvider>,
}

impl DueInquiry {
    pub fn new(store: Arc<dyn LedgerStore>, time: Arc<SafeTimeProvider>) -> Self {
        Self { store, time }
    }

    /// look-ahead bound: now plus one tenure period
    pub fn horizon(&self, loan: &Loan) -> Result<DateTime<Utc>> {
        Ok(self.time.now() + loan.tenure_type.period()?)
    }

    /// unpaid installments due on or before the horizon, by payment number
    pub fn due_payments(&self, loan: &Loan) -> Result<Vec<Payment>> {
        let horizon = self.horizon(loan)?;
        let payments = self.store.payments_by_loan(
            loan.id,
            PaymentFilter {
                status: Some(PaymentStatus::Active),
                due_before: Some(horizon),
            },
        )?;

        debug!(
            loan_id = loan.id,
            horizon = %horizon,
            due = payments.len(),
            "computed due installments"
        );
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::errors::LedgerError;
    use crate::model::NewLoan;
    use crate::payments::AmortizationSchedule;
    use crate::store::MemoryStore;
    use crate::types::{InterestType, TenureType};
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    fn seed_loan(store: &MemoryStore, tenure: u32, tenure_type: TenureType) -> Loan {
        let schedule = AmortizationSchedule::generate(
            Money::from_major(1_000),
            Rate::from_percentage(10),
            InterestType::FlatAnnual,
            tenure,
            TenureType::Weekly,
            start(),
        )
        .unwrap();

        let mut uow = store.begin().unwrap();
        let loan = uow
            .insert_loan(NewLoan {
                user_id: 1,
                amount: schedule.principal,
                interest: schedule.interest_rate,
                interest_type: InterestType::FlatAnnual,
                tenure,
                tenure_type,
                outstanding: schedule.total_outstanding,
                created_at: start(),
                billing_start_date: start(),
            })
            .unwrap();
        uow.insert_payments(&schedule.payment_payloads(loan.id), start()).unwrap();
        uow.commit().unwrap();
        loan
    }

    #[test]
    fn test_due_window_grows_with_time() {
        let store = Arc::new(MemoryStore::new());
        let loan = seed_loan(&store, 4, TenureType::Weekly);

        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(start())));
        let control = time.test_control().unwrap();
        let inquiry = DueInquiry::new(store.clone(), time.clone());

        // first installment falls due exactly at the horizon
        let due = inquiry.due_payments(&loan).unwrap();
        assert_eq!(due.iter().map(|p| p.payment_no).collect::<Vec<_>>(), vec![1]);

        control.advance(Duration::days(14));
        let due = inquiry.due_payments(&loan).unwrap();
        assert_eq!(due.iter().map(|p| p.payment_no).collect::<Vec<_>>(), vec![1, 2, 3]);

        control.advance(Duration::days(365));
        assert_eq!(inquiry.due_payments(&loan).unwrap().len(), 4);
    }

    #[test]
    fn test_nothing_due_before_window() {
        let store = Arc::new(MemoryStore::new());
        let loan = seed_loan(&store, 4, TenureType::Weekly);

        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(
            start() - Duration::days(1),
        )));
        let inquiry = DueInquiry::new(store, time);

        assert!(inquiry.due_payments(&loan).unwrap().is_empty());
    }

    #[test]
    fn test_monthly_window_not_implemented() {
        let store = Arc::new(MemoryStore::new());
        let loan = seed_loan(&store, 4, TenureType::Monthly);
        let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(start())));
        let inquiry = DueInquiry::new(store, time);

        assert!(matches!(
            inquiry.due_payments(&loan),
            Err(LedgerError::NotImplemented { .. })
        ));
    }
}
