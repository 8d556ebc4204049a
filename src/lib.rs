pub mod config;
pub mod decimal;
pub mod delinquency;
pub mod errors;
pub mod ledger;
pub mod loan;
pub mod model;
pub mod payments;
pub mod settlement;
pub mod store;
pub mod types;
pub mod users;
pub mod views;

// re-export key types
pub use config::LedgerConfig;
pub use decimal::{Money, Rate};
pub use delinquency::{DelinquencyEvaluator, EligibilityChecker};
pub use errors::{ErrorKind, LedgerError, Result};
pub use ledger::Ledger;
pub use loan::LoanManager;
pub use model::{
    CreateLoanPayload, CreatePaymentPayload, CreateTransactionPayload, Loan, Payment,
    Transaction, TransactionInquiry, User,
};
pub use payments::{
    AmortizationCalculator, AmortizationSchedule, DueInquiry, ScheduledInstallment,
};
pub use settlement::SettlementProcessor;
pub use store::{LedgerStore, MemoryStore, PaymentFilter, StoreError, StoreOp, UnitOfWork};
pub use types::{
    InterestType, LoanId, LoanStatus, PaymentId, PaymentStatus, TenureType, TransactionId,
    TransactionStatus, UserId, MAX_TENURE,
};
pub use users::{MemoryUserDirectory, UserDirectory};
pub use views::LoanView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
