use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::model::CreatePaymentPayload;
use crate::types::{InterestType, LoanId, TenureType, MAX_TENURE};

/// one installment in an amortization schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledInstallment {
    pub payment_no: u32,
    pub due_date: DateTime<Utc>,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub total_amount: Money,
    /// outstanding left once this and every earlier installment is paid
    pub remaining_outstanding: Money,
}

/// amortization schedule
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub interest_type: InterestType,
    pub tenure: u32,
    pub tenure_type: TenureType,
    pub billing_start_date: DateTime<Utc>,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
    pub total_outstanding: Money,
}

impl AmortizationSchedule {
    /// generate installment schedule
    pub fn generate(
        principal: Money,
        interest_rate: Rate,
        interest_type: InterestType,
        tenure: u32,
        tenure_type: TenureType,
        billing_start_date: DateTime<Utc>,
    ) -> Result<Self> {
        if !principal.is_positive() {
            return Err(LedgerError::Validation {
                message: format!("principal must be positive, got {}", principal),
            });
        }
        if tenure == 0 {
            return Err(LedgerError::Validation {
                message: "tenure must be at least one period".to_string(),
            });
        }
        if tenure > MAX_TENURE {
            return Err(LedgerError::Validation {
                message: format!("tenure {} exceeds the maximum of {} periods", tenure, MAX_TENURE),
            });
        }

        let calculator = AmortizationCalculator::new(interest_type);
        let total_interest =
            calculator.total_interest(principal, interest_rate, tenure, tenure_type)?;
        let total_outstanding = principal.checked_add(total_interest).ok_or_else(|| {
            LedgerError::Validation {
                message: format!(
                    "principal {} plus interest {} is out of range",
                    principal, total_interest
                ),
            }
        })?;
        let installments = calculator.calculate_schedule(
            principal,
            total_interest,
            tenure,
            tenure_type,
            billing_start_date,
        )?;

        Ok(Self {
            principal,
            interest_rate,
            interest_type,
            tenure,
            tenure_type,
            billing_start_date,
            installments,
            total_interest,
            total_outstanding,
        })
    }

    /// get installment by its 1-based number
    pub fn get_installment(&self, payment_no: u32) -> Option<&ScheduledInstallment> {
        payment_no
            .checked_sub(1)
            .and_then(|index| self.installments.get(index as usize))
    }

    /// installment rows for the store, tagged with the loan they belong to
    pub fn payment_payloads(&self, loan_id: LoanId) -> Vec<CreatePaymentPayload> {
        self.installments
            .iter()
            .map(|installment| CreatePaymentPayload {
                loan_id,
                due_date: installment.due_date,
                payment_no: installment.payment_no,
                amount: installment.principal_portion,
                interest: installment.interest_portion,
                total_amount: installment.total_amount,
            })
            .collect()
    }
}

/// amortization calculator
pub struct AmortizationCalculator {
    interest_type: InterestType,
}

impl AmortizationCalculator {
    pub fn new(interest_type: InterestType) -> Self {
        Self { interest_type }
    }

    /// interest charged over the whole tenure, rounded to currency precision
    pub fn total_interest(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure: u32,
        tenure_type: TenureType,
    ) -> Result<Money> {
        match self.interest_type {
            InterestType::FlatAnnual => {
                let years = tenure_type.years(tenure)?;
                let interest = principal
                    .as_decimal()
                    .checked_mul(annual_rate.as_decimal())
                    .and_then(|per_year| per_year.checked_mul(years))
                    .ok_or_else(|| LedgerError::Validation {
                        message: format!(
                            "interest on {} at {} over {} periods is out of range",
                            principal, annual_rate, tenure
                        ),
                    })?;
                Ok(Money::from_decimal(interest).round_currency())
            }
            InterestType::ReducingAnnual => Err(LedgerError::NotImplemented {
                feature: "reducing annual interest".to_string(),
            }),
        }
    }

    /// calculate full installment schedule
    pub fn calculate_schedule(
        &self,
        principal: Money,
        total_interest: Money,
        tenure: u32,
        tenure_type: TenureType,
        billing_start_date: DateTime<Utc>,
    ) -> Result<Vec<ScheduledInstallment>> {
        match self.interest_type {
            InterestType::FlatAnnual => {
                calculate_flat(principal, total_interest, tenure, tenure_type, billing_start_date)
            }
            InterestType::ReducingAnnual => Err(LedgerError::NotImplemented {
                feature: "reducing annual interest".to_string(),
            }),
        }
    }
}

/// equal principal and interest shares; the final installment absorbs rounding
fn calculate_flat(
    principal: Money,
    total_interest: Money,
    tenure: u32,
    tenure_type: TenureType,
    billing_start_date: DateTime<Utc>,
) -> Result<Vec<ScheduledInstallment>> {
    let period = tenure_type.period()?;
    let periods = Decimal::from(tenure);
    let regular_principal = (principal / periods).round_currency();
    let regular_interest = (total_interest / periods).round_currency();
    let preceding = Decimal::from(tenure - 1);

    let final_principal = principal - regular_principal * preceding;
    let final_interest = total_interest - regular_interest * preceding;

    if !regular_principal.is_positive() || !final_principal.is_positive() {
        return Err(LedgerError::Validation {
            message: format!(
                "principal {} is too small to split over {} installments",
                principal, tenure
            ),
        });
    }
    if final_interest.is_negative() {
        return Err(LedgerError::Validation {
            message: format!(
                "interest {} cannot be split over {} installments",
                total_interest, tenure
            ),
        });
    }

    let mut remaining = principal
        .checked_add(total_interest)
        .ok_or_else(|| LedgerError::Validation {
            message: format!(
                "principal {} plus interest {} is out of range",
                principal, total_interest
            ),
        })?;
    let mut installments = Vec::with_capacity(tenure.min(MAX_TENURE) as usize);

    for payment_no in 1..=tenure {
        let (principal_portion, interest_portion) = if payment_no == tenure {
            (final_principal, final_interest)
        } else {
            (regular_principal, regular_interest)
        };
        let total_amount = principal_portion + interest_portion;
        remaining -= total_amount;
        let due_date = period
            .checked_mul(payment_no as i32)
            .and_then(|offset| billing_start_date.checked_add_signed(offset))
            .ok_or_else(|| LedgerError::Validation {
                message: format!(
                    "installment {} due date overflows from billing start {}",
                    payment_no, billing_start_date
                ),
            })?;

        installments.push(ScheduledInstallment {
            payment_no,
            due_date,
            principal_portion,
            interest_portion,
            total_amount,
            remaining_outstanding: remaining,
        });
    }

    Ok(installments)
}
