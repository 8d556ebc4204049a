//! serializable statements of a loan and its schedule
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::model::{Loan, Payment};
use crate::types::{LoanId, LoanStatus, UserId};

/// serializable view of a loan's position
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub user_id: UserId,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub billing_start_date: DateTime<Utc>,
    pub financial: FinancialView,
    pub installments: InstallmentView,
    pub metadata: MetadataView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FinancialView {
    pub principal: Money,
    pub interest_rate: Rate,
    pub total_interest: Money,
    pub total_obligation: Money,
    pub outstanding: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallmentView {
    pub count: u32,
    pub paid_count: u32,
    pub next_due_date: Option<DateTime<Utc>>,
    pub next_due_amount: Option<Money>,
    pub last_paid_at: Option<DateTime<Utc>>,
    pub final_due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataView {
    pub interest_type: String,
    pub tenure: u32,
    pub tenure_type: String,
    pub version: u64,
}

impl LoanView {
    /// `payments` is the loan's full schedule
    pub fn from_loan(loan: &Loan, payments: &[Payment]) -> Self {
        let (paid, unpaid): (Vec<&Payment>, Vec<&Payment>) =
            payments.iter().partition(|p| p.is_paid());
        let next = unpaid.iter().min_by_key(|p| p.payment_no);

        let total_interest: Money = payments.iter().map(|p| p.interest).sum();

        LoanView {
            id: loan.id,
            user_id: loan.user_id,
            status: loan.status,
            created_at: loan.created_at,
            billing_start_date: loan.billing_start_date,
            financial: FinancialView {
                principal: loan.amount,
                interest_rate: loan.interest,
                total_interest,
                total_obligation: loan.amount + total_interest,
                outstanding: loan.outstanding,
                principal_paid: paid.iter().map(|p| p.amount).sum(),
                interest_paid: paid.iter().map(|p| p.interest).sum(),
            },
            installments: InstallmentView {
                count: payments.len() as u32,
                paid_count: paid.len() as u32,
                next_due_date: next.map(|p| p.due_date),
                next_due_amount: next.map(|p| p.total_amount),
                last_paid_at: paid.iter().filter_map(|p| p.paid_at).max(),
                final_due_date: crate::payments::latest_due_date(payments),
            },
            metadata: MetadataView {
                interest_type: loan.interest_type.to_string(),
                tenure: loan.tenure,
                tenure_type: loan.tenure_type.to_string(),
                version: loan.version,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::AmortizationSchedule;
    use crate::types::{InterestType, PaymentStatus, TenureType};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn loan_with_schedule() -> (Loan, Vec<Payment>) {
        let start = Utc.with_ymd_and_hms(2025, 2, 3, 0, 0, 0).unwrap();
        let schedule = AmortizationSchedule::generate(
            Money::from_major(1_000),
            Rate::from_percentage(10),
            InterestType::FlatAnnual,
            3,
            TenureType::Weekly,
            start,
        )
        .unwrap();

        let loan = Loan {
            id: 7,
            user_id: 3,
            amount: schedule.principal,
            interest: schedule.interest_rate,
            interest_type: InterestType::FlatAnnual,
            tenure: 3,
            tenure_type: TenureType::Weekly,
            outstanding: schedule.total_outstanding,
            status: LoanStatus::Active,
            created_at: start,
            billing_start_date: start,
            version: 0,
        };
        let payments = schedule
            .payment_payloads(loan.id)
            .into_iter()
            .enumerate()
            .map(|(index, p)| Payment {
                id: index as i64 + 1,
                loan_id: p.loan_id,
                transaction_id: None,
                payment_no: p.payment_no,
                due_date: p.due_date,
                amount: p.amount,
                interest: p.interest,
                total_amount: p.total_amount,
                status: PaymentStatus::Active,
                paid_at: None,
                created_at: start,
            })
            .collect();
        (loan, payments)
    }

    #[test]
    fn test_fresh_loan_view() {
        let (loan, payments) = loan_with_schedule();
        let view = LoanView::from_loan(&loan, &payments);

        assert_eq!(view.financial.total_interest, Money::from(dec!(5.77)));
        assert_eq!(view.financial.total_obligation, loan.outstanding);
        assert_eq!(view.financial.principal_paid, Money::ZERO);
        assert_eq!(view.installments.count, 3);
        assert_eq!(view.installments.paid_count, 0);
        assert_eq!(
            view.installments.next_due_date,
            Some(loan.billing_start_date + Duration::days(7))
        );
        assert_eq!(
            view.installments.final_due_date,
            Some(loan.billing_start_date + Duration::days(21))
        );
        assert_eq!(view.metadata.interest_type, "Flat Annual");
        assert_eq!(view.metadata.tenure_type, "Weeks");
    }

    #[test]
    fn test_partially_paid_view() {
        let (mut loan, mut payments) = loan_with_schedule();
        let paid_at = loan.billing_start_date + Duration::days(6);
        payments[0].status = PaymentStatus::Paid;
        payments[0].transaction_id = Some(1);
        payments[0].paid_at = Some(paid_at);
        loan.outstanding -= payments[0].total_amount;

        let view = LoanView::from_loan(&loan, &payments);
        assert_eq!(view.financial.principal_paid, Money::from(dec!(333.33)));
        assert_eq!(view.financial.interest_paid, Money::from(dec!(1.92)));
        assert_eq!(view.installments.paid_count, 1);
        assert_eq!(view.installments.next_due_amount, Some(payments[1].total_amount));
        assert_eq!(view.installments.last_paid_at, Some(paid_at));

        let json = view.to_json_pretty().unwrap();
        assert!(json.contains("\"paid_count\": 1"));
    }
}
