use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::delinquency::EligibilityChecker;
use crate::errors::{LedgerError, Result};
use crate::model::{CreateLoanPayload, Loan, NewLoan, Payment};
use crate::payments::AmortizationSchedule;
use crate::store::{LedgerStore, PaymentFilter, UnitOfWork};
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus, UserId};
use crate::users::UserDirectory;

/// loan origination and the loan read paths
pub struct LoanManager {
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    eligibility: Arc<EligibilityChecker>,
    time: Arc<SafeTimeProvider>,
    allow_past_billing_date: bool,
}

impl LoanManager {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        eligibility: Arc<EligibilityChecker>,
        time: Arc<SafeTimeProvider>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            users,
            eligibility,
            time,
            allow_past_billing_date: config.allow_past_billing_date,
        }
    }

    /// validate, price and persist a loan together with its full schedule
    pub fn create_loan(&self, payload: CreateLoanPayload) -> Result<Loan> {
        payload.validate()?;
        self.validate_billing_start_date(&payload)?;

        let user_id = payload.user_id;
        let user = self
            .users
            .get_user(user_id)
            .map_err(|err| LedgerError::from(err).with_user(user_id))?;
        if user.is_none() {
            return Err(LedgerError::UserNotFound { user_id });
        }

        self.eligibility
            .check_eligibility(user_id)
            .map_err(|err| err.with_user(user_id))?;

        let schedule = AmortizationSchedule::generate(
            payload.amount,
            payload.interest,
            payload.interest_type,
            payload.tenure,
            payload.tenure_type,
            payload.billing_start_date,
        )?;

        let mut uow = self
            .store
            .begin()
            .map_err(|err| LedgerError::from(err).with_user(user_id))?;
        let loan = match self.persist(uow.as_mut(), &payload, &schedule) {
            Ok(loan) => loan,
            Err(err) => {
                let err = err.with_user(user_id);
                warn!(user_id, error = %err, "loan creation rolled back");
                uow.rollback();
                return Err(err);
            }
        };
        if let Err(err) = uow.commit() {
            let err = LedgerError::from(err).with_loan(loan.id).with_user(user_id);
            warn!(user_id, loan_id = loan.id, error = %err, "loan creation rolled back at commit");
            return Err(err);
        }

        info!(
            loan_id = loan.id,
            user_id = loan.user_id,
            amount = %loan.amount,
            outstanding = %loan.outstanding,
            installments = schedule.installments.len(),
            "loan created"
        );
        Ok(loan)
    }

    fn persist(
        &self,
        uow: &mut dyn UnitOfWork,
        payload: &CreateLoanPayload,
        schedule: &AmortizationSchedule,
    ) -> Result<Loan> {
        let now = self.time.now();
        let loan = uow.insert_loan(NewLoan {
            user_id: payload.user_id,
            amount: payload.amount,
            interest: payload.interest,
            interest_type: payload.interest_type,
            tenure: payload.tenure,
            tenure_type: payload.tenure_type,
            outstanding: schedule.total_outstanding,
            created_at: now,
            billing_start_date: payload.billing_start_date,
        })?;

        let payments = schedule.payment_payloads(loan.id);
        if payments.is_empty() {
            return Err(LedgerError::InvalidPayment {
                message: "no installments to create".to_string(),
            });
        }
        for payment in &payments {
            payment.validate()?;
        }
        uow.insert_payments(&payments, now)
            .map_err(|err| LedgerError::from(err).with_loan(loan.id))?;

        Ok(loan)
    }

    fn validate_billing_start_date(&self, payload: &CreateLoanPayload) -> Result<()> {
        if self.allow_past_billing_date {
            return Ok(());
        }
        let today = self.time.now().date_naive();
        let billing_start_date = payload.billing_start_date.date_naive();
        if billing_start_date < today {
            return Err(LedgerError::InvalidBillingDate {
                billing_start_date,
                today,
            });
        }
        Ok(())
    }

    pub fn get_loan(&self, id: LoanId) -> Result<Loan> {
        self.store
            .loan(id)?
            .ok_or(LedgerError::LoanNotFound { loan_id: id })
    }

    /// loan in the given status, `None` if missing or in another status
    pub fn find_loan_with_status(&self, id: LoanId, status: LoanStatus) -> Result<Option<Loan>> {
        Ok(self.store.loan(id)?.filter(|loan| loan.status == status))
    }

    pub fn list_loans(&self) -> Result<Vec<Loan>> {
        Ok(self.store.loans()?)
    }

    pub fn list_loans_by_user(
        &self,
        user_id: UserId,
        status: Option<LoanStatus>,
    ) -> Result<Vec<Loan>> {
        Ok(self.store.loans_by_user(user_id, status)?)
    }

    /// full installment schedule of a loan
    pub fn loan_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        let loan = self.get_loan(loan_id)?;
        Ok(self.store.payments_by_loan(loan.id, PaymentFilter::default())?)
    }

    pub fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .payment(id)?
            .ok_or(LedgerError::PaymentNotFound { payment_id: id })
    }

    pub fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>> {
        Ok(self.store.payments(status)?)
    }
}
