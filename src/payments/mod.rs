pub mod amortization;
pub mod due;

use chrono::{DateTime, Utc};

use crate::decimal::Money;
use crate::model::Payment;

pub use amortization::{AmortizationCalculator, AmortizationSchedule, ScheduledInstallment};
pub use due::DueInquiry;

/// sum of installment totals
pub fn total_due(payments: &[Payment]) -> Money {
    payments.iter().map(|p| p.total_amount).sum()
}

/// latest due date among installments
pub fn latest_due_date(payments: &[Payment]) -> Option<DateTime<Utc>> {
    payments.iter().map(|p| p.due_date).max()
}
