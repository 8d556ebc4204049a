use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::errors::{LedgerError, Result};
use crate::payments::DueInquiry;
use crate::store::LedgerStore;
use crate::types::{LoanStatus, UserId};

/// decides whether a borrower is behind on any active loan
pub struct DelinquencyEvaluator {
    store: Arc<dyn LedgerStore>,
    due: Arc<DueInquiry>,
    threshold: u32,
}

impl DelinquencyEvaluator {
    pub fn new(store: Arc<dyn LedgerStore>, due: Arc<DueInquiry>, config: &LedgerConfig) -> Self {
        Self {
            store,
            due,
            threshold: config.delinquency_threshold,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// true once any active loan has more due installments than the threshold
    pub fn is_delinquent(&self, user_id: UserId) -> Result<bool> {
        let loans = self.store.loans_by_user(user_id, Some(LoanStatus::Active))?;

        for loan in &loans {
            let due = self.due.due_payments(loan)?;
            if due.len() > self.threshold as usize {
                debug!(
                    user_id,
                    loan_id = loan.id,
                    due = due.len(),
                    threshold = self.threshold,
                    "user is delinquent"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// gate in front of loan creation
pub struct EligibilityChecker {
    store: Arc<dyn LedgerStore>,
    delinquency: Arc<DelinquencyEvaluator>,
    max_active_loans: Option<u32>,
}

impl EligibilityChecker {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        delinquency: Arc<DelinquencyEvaluator>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            delinquency,
            max_active_loans: config.max_active_loans,
        }
    }

    pub fn check_eligibility(&self, user_id: UserId) -> Result<()> {
        if let Some(max) = self.max_active_loans {
            let active = self.store.loans_by_user(user_id, Some(LoanStatus::Active))?;
            if active.len() >= max as usize {
                warn!(user_id, active = active.len(), max, "active loan limit reached");
                return Err(LedgerError::UserNotEligible {
                    user_id,
                    reason: format!(
                        "already holds {} active loan(s), limit is {}",
                        active.len(),
                        max
                    ),
                });
            }
        }

        if self.delinquency.is_delinquent(user_id)? {
            warn!(user_id, "rejecting loan for delinquent user");
            return Err(LedgerError::UserNotEligible {
                user_id,
                reason: "user is delinquent".to_string(),
            });
        }

        Ok(())
    }
}
